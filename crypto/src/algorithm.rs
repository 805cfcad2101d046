//! Algorithm identities and family-tagged key/signature values.
//!
//! Every key and signature carries the [`AlgorithmId`] it was produced under,
//! and a zero-sized family marker (`PostQuantum` or `Classical`) in its type.
//! A post-quantum public key therefore cannot be handed to the classical
//! verify path: the mismatch is a type error, not a runtime surprise.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::marker::PhantomData;

use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::hashes::sha256;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which half of a hybrid signature an algorithm belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    PostQuantum,
    Classical,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::PostQuantum => f.write_str("post-quantum"),
            Family::Classical => f.write_str("classical"),
        }
    }
}

/// Algorithm and parameter-set version. New parameter sets get new variants;
/// existing variants are never repurposed so archived envelopes stay verifiable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AlgorithmId {
    #[cfg_attr(feature = "serde", serde(rename = "ml-dsa-65/v1"))]
    MlDsa65V1,
    #[cfg_attr(feature = "serde", serde(rename = "ecdsa-p256-sha256/v1"))]
    EcdsaP256Sha256V1,
}

impl AlgorithmId {
    pub const ALL: [AlgorithmId; 2] = [AlgorithmId::MlDsa65V1, AlgorithmId::EcdsaP256Sha256V1];

    pub const fn family(self) -> Family {
        match self {
            AlgorithmId::MlDsa65V1 => Family::PostQuantum,
            AlgorithmId::EcdsaP256Sha256V1 => Family::Classical,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            AlgorithmId::MlDsa65V1 => "ml-dsa-65/v1",
            AlgorithmId::EcdsaP256Sha256V1 => "ecdsa-p256-sha256/v1",
        }
    }

    /// Parameter-set version, bound into every signing message.
    pub const fn version(self) -> u16 {
        match self {
            AlgorithmId::MlDsa65V1 => 1,
            AlgorithmId::EcdsaP256Sha256V1 => 1,
        }
    }

    /// Stable single-byte code used in canonical encodings.
    pub const fn code(self) -> u8 {
        match self {
            AlgorithmId::MlDsa65V1 => 0x11,
            AlgorithmId::EcdsaP256Sha256V1 => 0x21,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compile-time family marker.
pub trait AlgorithmFamily:
    Copy + Clone + fmt::Debug + PartialEq + Eq + Send + Sync + 'static
{
    const FAMILY: Family;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PostQuantum {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Classical {}

impl AlgorithmFamily for PostQuantum {
    const FAMILY: Family = Family::PostQuantum;
}

impl AlgorithmFamily for Classical {
    const FAMILY: Family = Family::Classical;
}

fn check_family<F: AlgorithmFamily>(algorithm: AlgorithmId) -> Result<(), CryptoError> {
    if algorithm.family() != F::FAMILY {
        return Err(CryptoError::AlgorithmMismatch {
            algorithm,
            expected: F::FAMILY,
        });
    }
    Ok(())
}

/// Serialized shape shared by public keys and signatures.
#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct TaggedBytes {
    algorithm: AlgorithmId,
    #[serde(with = "serde_bytes")]
    bytes: Vec<u8>,
}

/// Public key bytes for one algorithm family.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(
        try_from = "TaggedBytes",
        bound(serialize = "", deserialize = "F: AlgorithmFamily")
    )
)]
pub struct PublicKey<F> {
    algorithm: AlgorithmId,
    #[cfg_attr(feature = "serde", serde(with = "serde_bytes"))]
    bytes: Vec<u8>,
    #[cfg_attr(feature = "serde", serde(skip))]
    _family: PhantomData<F>,
}

impl<F: AlgorithmFamily> PublicKey<F> {
    pub fn new(algorithm: AlgorithmId, bytes: Vec<u8>) -> Result<Self, CryptoError> {
        check_family::<F>(algorithm)?;
        Ok(Self {
            algorithm,
            bytes,
            _family: PhantomData,
        })
    }

    pub fn algorithm(&self) -> AlgorithmId {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// SHA-256 over the algorithm code and key bytes.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut material = Vec::with_capacity(1 + self.bytes.len());
        material.push(self.algorithm.code());
        material.extend_from_slice(&self.bytes);
        sha256(&material)
    }

    /// Hex of the first eight fingerprint bytes. Safe for logs.
    pub fn key_id(&self) -> String {
        hex::encode(&self.fingerprint()[..8])
    }
}

#[cfg(feature = "serde")]
impl<F: AlgorithmFamily> TryFrom<TaggedBytes> for PublicKey<F> {
    type Error = CryptoError;

    fn try_from(raw: TaggedBytes) -> Result<Self, Self::Error> {
        Self::new(raw.algorithm, raw.bytes)
    }
}

/// Secret key bytes for one algorithm family. Zeroized on drop, never printed.
pub struct SecretKey<F> {
    algorithm: AlgorithmId,
    bytes: Vec<u8>,
    _family: PhantomData<F>,
}

impl<F: AlgorithmFamily> SecretKey<F> {
    pub fn new(algorithm: AlgorithmId, bytes: Vec<u8>) -> Result<Self, CryptoError> {
        check_family::<F>(algorithm)?;
        Ok(Self {
            algorithm,
            bytes,
            _family: PhantomData,
        })
    }

    pub fn algorithm(&self) -> AlgorithmId {
        self.algorithm
    }

    /// Raw encoding for engines. Callers outside a key custodian should never
    /// need this.
    pub fn expose_secret(&self) -> &[u8] {
        &self.bytes
    }
}

impl<F> Drop for SecretKey<F> {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl<F> fmt::Debug for SecretKey<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Signature bytes tagged with the algorithm that produced them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(
        try_from = "TaggedBytes",
        bound(serialize = "", deserialize = "F: AlgorithmFamily")
    )
)]
pub struct TaggedSignature<F> {
    algorithm: AlgorithmId,
    #[cfg_attr(feature = "serde", serde(with = "serde_bytes"))]
    bytes: Vec<u8>,
    #[cfg_attr(feature = "serde", serde(skip))]
    _family: PhantomData<F>,
}

impl<F: AlgorithmFamily> TaggedSignature<F> {
    pub fn new(algorithm: AlgorithmId, bytes: Vec<u8>) -> Result<Self, CryptoError> {
        check_family::<F>(algorithm)?;
        Ok(Self {
            algorithm,
            bytes,
            _family: PhantomData,
        })
    }

    pub fn algorithm(&self) -> AlgorithmId {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable access for fault-injection in tests and tooling.
    pub fn bytes_mut(&mut self) -> &mut Vec<u8> {
        &mut self.bytes
    }
}

#[cfg(feature = "serde")]
impl<F: AlgorithmFamily> TryFrom<TaggedBytes> for TaggedSignature<F> {
    type Error = CryptoError;

    fn try_from(raw: TaggedBytes) -> Result<Self, Self::Error> {
        Self::new(raw.algorithm, raw.bytes)
    }
}
