use crypto::CryptoError;
use thiserror::Error;

use crate::audit::AuditError;
use crate::canonical::CanonicalError;
use crate::types::UserId;

/// Failures raised by a [`crate::vault::KeyVault`] backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyVaultError {
    #[error("no key bundle for user {0}")]
    KeyNotFound(UserId),

    #[error("user {0} already has an active key bundle")]
    KeyAlreadyExists(UserId),

    #[error("key bundle for user {0} is revoked")]
    KeyRevoked(UserId),

    #[error("key bundle for user {0} is expired")]
    KeyExpired(UserId),

    #[error("invalid key format: {0}")]
    InvalidKeyFormat(CryptoError),

    /// Infrastructure failure: the vault could not answer in time or at all.
    /// Never a statement about signature validity.
    #[error("key vault unavailable during {operation}: {reason}")]
    Unavailable {
        operation: &'static str,
        reason: String,
    },

    #[error("entropy source failed")]
    Entropy,
}

impl From<CryptoError> for KeyVaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Entropy => KeyVaultError::Entropy,
            other => KeyVaultError::InvalidKeyFormat(other),
        }
    }
}

/// Failures while starting the service stack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartupError {
    #[error("key vault pool: {0}")]
    Vault(#[from] KeyVaultError),

    #[error("audit dispatcher: {0}")]
    Audit(#[from] AuditError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    #[error(transparent)]
    Vault(#[from] KeyVaultError),

    #[error("payload cannot be canonicalized: {0}")]
    Canonicalization(#[from] CanonicalError),
}

/// Reasons a verification could not be *performed*. Cryptographic and
/// lifecycle rejections are reported in `VerificationResult` instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("no key bundle for user {0}")]
    KeyNotFound(UserId),

    #[error("key vault unavailable during {operation}: {reason}")]
    Unavailable {
        operation: &'static str,
        reason: String,
    },
}

impl From<KeyVaultError> for VerificationError {
    fn from(err: KeyVaultError) -> Self {
        match err {
            KeyVaultError::KeyNotFound(user) => VerificationError::KeyNotFound(user),
            KeyVaultError::Unavailable { operation, reason } => {
                VerificationError::Unavailable { operation, reason }
            }
            other => VerificationError::Unavailable {
                operation: "get_public_bundle",
                reason: other.to_string(),
            },
        }
    }
}

pub type Result<T, E = KeyVaultError> = std::result::Result<T, E>;
