//! Hybrid post-quantum + classical transaction authentication.
//!
//! A transaction is accepted only when an ML-DSA-65 signature and an ECDSA
//! P-256 signature both verify over the same canonical payload, under a key
//! bundle that is neither revoked nor expired.

pub mod audit;
pub mod canonical;
pub mod certificates;
pub mod clock;
pub mod config;
pub mod envelope;
pub mod error;
mod serde_bytes32;
pub mod services;
pub mod signer;
pub mod types;
pub mod vault;
pub mod verifier;

pub use audit::{
    AuditAction, AuditDispatcher, AuditError, AuditEvent, AuditSink, MemoryAuditSink,
    TracingAuditSink,
};
pub use canonical::{CanonicalError, CanonicalPayload};
pub use certificates::{CertificateDirectory, CertificateLifecycle, InMemoryCertificates};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TxAuthConfig;
pub use envelope::{EnvelopeParts, SignatureEnvelope, ENVELOPE_VERSION};
pub use error::{KeyVaultError, SigningError, StartupError, VerificationError};
pub use services::HybridServices;
pub use signer::HybridSigningService;
pub use types::{KeyStatus, PublicKeyBundle, UserId, ValidityWindow};
pub use vault::{InMemoryKeyVault, KeyVault, TimeoutVault, VaultSignature};
pub use verifier::{ExpiredKeyPolicy, HybridVerificationService, ReasonCode, VerificationResult};
