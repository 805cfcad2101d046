//! Custody of per-user hybrid key bundles.
//!
//! A [`KeyVault`] is the only component that ever holds private key bytes.
//! Callers get public views and signatures; signing happens inside the vault.

mod memory;
mod timeout;

pub use memory::{InMemoryKeyVault, DEFAULT_KEY_VALIDITY_DAYS};
pub use timeout::{TimeoutVault, DEFAULT_VAULT_QUEUE, DEFAULT_VAULT_WORKERS};

use crypto::{Classical, PostQuantum, TaggedSignature};

use crate::error::Result;
use crate::types::{PublicKeyBundle, UserId};

/// Both halves of a hybrid signature plus the public view of the bundle that
/// produced them.
#[derive(Clone, Debug)]
pub struct VaultSignature {
    pub pq: TaggedSignature<PostQuantum>,
    pub classical: TaggedSignature<Classical>,
    pub bundle: PublicKeyBundle,
}

pub trait KeyVault: Send + Sync {
    /// Create a bundle for a user that has none, or whose bundle is no longer
    /// effective. Fails with `KeyAlreadyExists` while an active bundle exists.
    fn generate(&self, user: UserId) -> Result<PublicKeyBundle>;

    /// Replace the user's bundle with a fresh one, whatever its status.
    fn rotate(&self, user: UserId) -> Result<PublicKeyBundle>;

    fn get_public_bundle(&self, user: UserId) -> Result<PublicKeyBundle>;

    /// Idempotent. Fails only for users that never had a bundle.
    fn revoke(&self, user: UserId) -> Result<()>;

    /// Sign `message` with both private keys of an active bundle.
    fn sign(&self, user: UserId, message: &[u8]) -> Result<VaultSignature>;
}
