//! ECDSA over NIST P-256 with SHA-256, the classical half of the hybrid.
//!
//! Nonces are RFC 6979 deterministic. Signatures are normalized to low-S when
//! produced and high-S signatures are rejected on verification, so a valid
//! signature has exactly one accepted encoding.

use alloc::vec::Vec;

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature as P256Sig, SigningKey as P256SigningKey, VerifyingKey};

use crate::deterministic::expand_to_length;
use crate::error::CryptoError;
use crate::traits::{Signature as SigTrait, SigningKey as SigningKeyTrait, VerifyKey};

/// SEC1 uncompressed point: 0x04 || x || y
pub const P256_PUBLIC_KEY_LEN: usize = 65;
pub const P256_SECRET_KEY_LEN: usize = 32;
/// Fixed-width r || s
pub const P256_SIGNATURE_LEN: usize = 64;

const KEYGEN_DOMAIN: &[u8] = b"txauth/ecdsa-p256/scalar";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct P256Signature {
    bytes: [u8; P256_SIGNATURE_LEN],
}

impl SigTrait for P256Signature {
    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != P256_SIGNATURE_LEN {
            return Err(CryptoError::InvalidLength {
                expected: P256_SIGNATURE_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; P256_SIGNATURE_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct P256PublicKey {
    inner: VerifyingKey,
}

impl VerifyKey for P256PublicKey {
    type Signature = P256Signature;

    fn verify(&self, message: &[u8], signature: &Self::Signature) -> Result<(), CryptoError> {
        // Rejects r or s of zero or out of range.
        let sig = P256Sig::from_slice(&signature.bytes).map_err(|_| CryptoError::InvalidSignature)?;
        if sig.normalize_s().is_some() {
            return Err(CryptoError::InvalidSignature);
        }
        self.inner
            .verify(message, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.inner.to_encoded_point(false).as_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != P256_PUBLIC_KEY_LEN {
            return Err(CryptoError::InvalidLength {
                expected: P256_PUBLIC_KEY_LEN,
                actual: bytes.len(),
            });
        }
        // Rejects points that are not on the curve.
        let inner = VerifyingKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { inner })
    }
}

/// P-256 signing scalar. The wrapped key zeroizes itself on drop.
#[derive(Clone)]
pub struct P256SecretKey {
    inner: P256SigningKey,
}

impl core::fmt::Debug for P256SecretKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("P256SecretKey").finish_non_exhaustive()
    }
}

impl SigningKeyTrait for P256SecretKey {
    type VerifyKey = P256PublicKey;
    type Signature = P256Signature;

    fn generate_deterministic(seed: &[u8]) -> Self {
        // Rejection-sample a scalar in [1, n). A retry happens with
        // probability below 2^-32.
        let mut counter = 0u32;
        loop {
            let mut input = Vec::with_capacity(seed.len() + 4);
            input.extend_from_slice(seed);
            input.extend_from_slice(&counter.to_be_bytes());
            let candidate = expand_to_length(KEYGEN_DOMAIN, &input, P256_SECRET_KEY_LEN);
            if let Ok(inner) = P256SigningKey::from_slice(&candidate) {
                return Self { inner };
            }
            counter = counter.wrapping_add(1);
        }
    }

    fn sign(&self, message: &[u8]) -> Self::Signature {
        let sig: P256Sig = self.inner.sign(message);
        let sig = sig.normalize_s().unwrap_or(sig);
        let mut bytes = [0u8; P256_SIGNATURE_LEN];
        bytes.copy_from_slice(&sig.to_bytes());
        P256Signature { bytes }
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.inner.to_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != P256_SECRET_KEY_LEN {
            return Err(CryptoError::InvalidLength {
                expected: P256_SECRET_KEY_LEN,
                actual: bytes.len(),
            });
        }
        let inner = P256SigningKey::from_slice(bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { inner })
    }

    fn verify_key(&self) -> Self::VerifyKey {
        P256PublicKey {
            inner: self.inner.verifying_key().clone(),
        }
    }
}
