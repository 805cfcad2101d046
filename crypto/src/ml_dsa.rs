//! ML-DSA-65 (FIPS 204) post-quantum signatures.
//!
//! Thin wrapper around the `ml-dsa` crate's module-lattice implementation,
//! fixed to the ML-DSA-65 parameter set. Encodings are the FIPS 204 byte
//! layouts; lengths are checked before anything reaches the lattice code.

use alloc::vec::Vec;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::traits::{Signature as SigTrait, SigningKey as SigningKeyTrait, VerifyKey};

use ml_dsa::signature::{Signer, Verifier};
use ml_dsa::{MlDsa65, B32};

/// ML-DSA-65 parameter sizes (FIPS 204)
pub const ML_DSA_PUBLIC_KEY_LEN: usize = 1952;
pub const ML_DSA_SECRET_KEY_LEN: usize = 4032;
pub const ML_DSA_SIGNATURE_LEN: usize = 3309;

const KEYGEN_DOMAIN: &[u8] = b"txauth/ml-dsa-65/xi";

/// s1 || s2 inside the secret key encoding: after rho, K and tr (128 bytes),
/// l + k = 11 polynomials of 256 four-bit coefficients.
const SECRET_VECTORS: core::ops::Range<usize> = 128..128 + 11 * 128;
/// Each packed coefficient is eta - c for eta = 4, so at most 2 * eta.
const SECRET_COEFF_MAX: u8 = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MlDsaSignature {
    bytes: Vec<u8>,
}

impl SigTrait for MlDsaSignature {
    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != ML_DSA_SIGNATURE_LEN {
            return Err(CryptoError::InvalidLength {
                expected: ML_DSA_SIGNATURE_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }
}

/// ML-DSA-65 verification key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MlDsaPublicKey {
    bytes: [u8; ML_DSA_PUBLIC_KEY_LEN],
}

impl MlDsaPublicKey {
    fn to_inner(&self) -> ml_dsa::VerifyingKey<MlDsa65> {
        ml_dsa::VerifyingKey::<MlDsa65>::decode(&self.bytes.into())
    }
}

impl VerifyKey for MlDsaPublicKey {
    type Signature = MlDsaSignature;

    fn verify(&self, message: &[u8], signature: &Self::Signature) -> Result<(), CryptoError> {
        let sig_bytes: [u8; ML_DSA_SIGNATURE_LEN] = signature
            .bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature)?;
        // Malformed hint or z encodings decode to None rather than panicking.
        let sig = ml_dsa::Signature::<MlDsa65>::decode(&sig_bytes.into())
            .ok_or(CryptoError::InvalidSignature)?;

        self.to_inner()
            .verify(message, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != ML_DSA_PUBLIC_KEY_LEN {
            return Err(CryptoError::InvalidLength {
                expected: ML_DSA_PUBLIC_KEY_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; ML_DSA_PUBLIC_KEY_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }
}

/// ML-DSA-65 signing key in its expanded FIPS 204 encoding.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MlDsaSecretKey {
    bytes: [u8; ML_DSA_SECRET_KEY_LEN],
}

impl MlDsaSecretKey {
    fn to_inner(&self) -> ml_dsa::SigningKey<MlDsa65> {
        ml_dsa::SigningKey::<MlDsa65>::decode(&self.bytes.into())
    }
}

impl core::fmt::Debug for MlDsaSecretKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MlDsaSecretKey").finish_non_exhaustive()
    }
}

impl SigningKeyTrait for MlDsaSecretKey {
    type VerifyKey = MlDsaPublicKey;
    type Signature = MlDsaSignature;

    fn generate_deterministic(seed: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(KEYGEN_DOMAIN);
        hasher.update(seed);
        let mut xi = [0u8; 32];
        xi.copy_from_slice(&hasher.finalize());

        let seed_b32: B32 = xi.into();
        xi.zeroize();

        let sk = ml_dsa::SigningKey::<MlDsa65>::from_seed(&seed_b32);
        let encoded = sk.encode();

        let mut bytes = [0u8; ML_DSA_SECRET_KEY_LEN];
        bytes.copy_from_slice(encoded.as_ref());
        Self { bytes }
    }

    fn sign(&self, message: &[u8]) -> Self::Signature {
        let sig = self.to_inner().sign(message);
        MlDsaSignature {
            bytes: sig.encode().to_vec(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != ML_DSA_SECRET_KEY_LEN {
            return Err(CryptoError::InvalidLength {
                expected: ML_DSA_SECRET_KEY_LEN,
                actual: bytes.len(),
            });
        }
        let out_of_range = bytes[SECRET_VECTORS]
            .iter()
            .any(|&byte| (byte & 0x0F) > SECRET_COEFF_MAX || (byte >> 4) > SECRET_COEFF_MAX);
        if out_of_range {
            return Err(CryptoError::InvalidKey);
        }
        let mut arr = [0u8; ML_DSA_SECRET_KEY_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    fn verify_key(&self) -> Self::VerifyKey {
        let encoded = self.to_inner().verifying_key().encode();
        let mut bytes = [0u8; ML_DSA_PUBLIC_KEY_LEN];
        bytes.copy_from_slice(encoded.as_ref());
        MlDsaPublicKey { bytes }
    }
}
