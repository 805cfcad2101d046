#[cfg(feature = "std")]
use thiserror::Error;

use crate::algorithm::{AlgorithmId, Family};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Error))]
pub enum CryptoError {
    #[cfg_attr(
        feature = "std",
        error("invalid length: expected {expected} bytes, found {actual}")
    )]
    InvalidLength { expected: usize, actual: usize },

    #[cfg_attr(feature = "std", error("verification failed"))]
    VerificationFailed,

    #[cfg_attr(feature = "std", error("invalid key"))]
    InvalidKey,

    #[cfg_attr(feature = "std", error("invalid key format for {algorithm}"))]
    InvalidKeyFormat { algorithm: AlgorithmId },

    #[cfg_attr(feature = "std", error("invalid signature"))]
    InvalidSignature,

    #[cfg_attr(feature = "std", error("unsupported algorithm {0}"))]
    UnsupportedAlgorithm(AlgorithmId),

    #[cfg_attr(
        feature = "std",
        error("algorithm {algorithm} does not belong to the {expected} family")
    )]
    AlgorithmMismatch {
        algorithm: AlgorithmId,
        expected: Family,
    },

    #[cfg_attr(feature = "std", error("entropy source unavailable"))]
    Entropy,
}

#[cfg(not(feature = "std"))]
impl core::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CryptoError::InvalidLength { expected, actual } => {
                write!(
                    f,
                    "invalid length: expected {} bytes, found {}",
                    expected, actual
                )
            }
            CryptoError::VerificationFailed => write!(f, "verification failed"),
            CryptoError::InvalidKey => write!(f, "invalid key"),
            CryptoError::InvalidKeyFormat { algorithm } => {
                write!(f, "invalid key format for {}", algorithm)
            }
            CryptoError::InvalidSignature => write!(f, "invalid signature"),
            CryptoError::UnsupportedAlgorithm(id) => write!(f, "unsupported algorithm {}", id),
            CryptoError::AlgorithmMismatch {
                algorithm,
                expected,
            } => write!(
                f,
                "algorithm {} does not belong to the {} family",
                algorithm, expected
            ),
            CryptoError::Entropy => write!(f, "entropy source unavailable"),
        }
    }
}
