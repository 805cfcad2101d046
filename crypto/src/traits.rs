//! Raw key traits implemented by each algorithm wrapper. Engines in
//! [`crate::engine`] lift these into the family-tagged API.

use alloc::vec::Vec;
use crate::error::CryptoError;

pub trait Signature: Sized + Clone {
    fn as_bytes(&self) -> &[u8];
    fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError>;
}

pub trait SigningKey: Sized {
    type VerifyKey: VerifyKey<Signature = Self::Signature>;
    type Signature: Signature;

    /// Derive a keypair from seed material. Callers supply fresh entropy for
    /// production keys; fixed seeds are for tests only.
    fn generate_deterministic(seed: &[u8]) -> Self;
    fn sign(&self, message: &[u8]) -> Self::Signature;
    fn to_bytes(&self) -> Vec<u8>;
    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError>;
    fn verify_key(&self) -> Self::VerifyKey;
}

pub trait VerifyKey: Sized + Clone {
    type Signature: Signature;

    fn verify(&self, message: &[u8], signature: &Self::Signature) -> Result<(), CryptoError>;
    fn to_bytes(&self) -> Vec<u8>;
    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError>;
}
