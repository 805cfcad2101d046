//! Stateless signature engines, one per algorithm, and the registry that
//! selects between them.
//!
//! An engine never holds key material; keys travel in as family-tagged
//! values. `verify` is total: malformed keys or signatures, or values tagged
//! with a different algorithm, yield `false` instead of an error so that
//! adversarial envelopes cannot turn verification into a crash.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use crate::algorithm::{
    AlgorithmFamily, AlgorithmId, Classical, PostQuantum, PublicKey, SecretKey, TaggedSignature,
};
use crate::ecdsa::P256SecretKey;
use crate::error::CryptoError;
use crate::ml_dsa::MlDsaSecretKey;
use crate::traits::{Signature as SigTrait, SigningKey, VerifyKey};

pub trait SignatureEngine: Send + Sync {
    type Family: AlgorithmFamily;

    fn algorithm(&self) -> AlgorithmId;

    /// Derive a keypair from seed material (32 bytes of OS entropy in
    /// production).
    fn keypair_from_seed(
        &self,
        seed: &[u8],
    ) -> Result<(SecretKey<Self::Family>, PublicKey<Self::Family>), CryptoError>;

    /// Fails with `InvalidKeyFormat` when the key is tagged for another
    /// algorithm or its encoding does not decode.
    fn sign(
        &self,
        message: &[u8],
        key: &SecretKey<Self::Family>,
    ) -> Result<TaggedSignature<Self::Family>, CryptoError>;

    fn verify(
        &self,
        message: &[u8],
        signature: &TaggedSignature<Self::Family>,
        key: &PublicKey<Self::Family>,
    ) -> bool;
}

fn keypair_with<K, F>(
    algorithm: AlgorithmId,
    seed: &[u8],
) -> Result<(SecretKey<F>, PublicKey<F>), CryptoError>
where
    K: SigningKey,
    F: AlgorithmFamily,
{
    let sk = K::generate_deterministic(seed);
    let public = PublicKey::new(algorithm, sk.verify_key().to_bytes())?;
    let secret = SecretKey::new(algorithm, sk.to_bytes())?;
    Ok((secret, public))
}

fn sign_with<K, F>(
    algorithm: AlgorithmId,
    message: &[u8],
    key: &SecretKey<F>,
) -> Result<TaggedSignature<F>, CryptoError>
where
    K: SigningKey,
    F: AlgorithmFamily,
{
    if key.algorithm() != algorithm {
        return Err(CryptoError::InvalidKeyFormat { algorithm });
    }
    let sk = K::from_bytes(key.expose_secret())
        .map_err(|_| CryptoError::InvalidKeyFormat { algorithm })?;
    TaggedSignature::new(algorithm, sk.sign(message).to_vec())
}

fn verify_with<K, F>(
    algorithm: AlgorithmId,
    message: &[u8],
    signature: &TaggedSignature<F>,
    key: &PublicKey<F>,
) -> bool
where
    K: VerifyKey,
    F: AlgorithmFamily,
{
    if signature.algorithm() != algorithm || key.algorithm() != algorithm {
        return false;
    }
    let Ok(pk) = K::from_bytes(key.as_bytes()) else {
        return false;
    };
    let Ok(sig) = <K::Signature as SigTrait>::from_bytes(signature.as_bytes()) else {
        return false;
    };
    pk.verify(message, &sig).is_ok()
}

/// ML-DSA-65, parameter version 1.
#[derive(Clone, Copy, Debug, Default)]
pub struct MlDsa65Engine;

impl SignatureEngine for MlDsa65Engine {
    type Family = PostQuantum;

    fn algorithm(&self) -> AlgorithmId {
        AlgorithmId::MlDsa65V1
    }

    fn keypair_from_seed(
        &self,
        seed: &[u8],
    ) -> Result<(SecretKey<PostQuantum>, PublicKey<PostQuantum>), CryptoError> {
        keypair_with::<MlDsaSecretKey, _>(self.algorithm(), seed)
    }

    fn sign(
        &self,
        message: &[u8],
        key: &SecretKey<PostQuantum>,
    ) -> Result<TaggedSignature<PostQuantum>, CryptoError> {
        sign_with::<MlDsaSecretKey, _>(self.algorithm(), message, key)
    }

    fn verify(
        &self,
        message: &[u8],
        signature: &TaggedSignature<PostQuantum>,
        key: &PublicKey<PostQuantum>,
    ) -> bool {
        verify_with::<<MlDsaSecretKey as SigningKey>::VerifyKey, _>(
            self.algorithm(),
            message,
            signature,
            key,
        )
    }
}

/// ECDSA P-256 with SHA-256, version 1.
#[derive(Clone, Copy, Debug, Default)]
pub struct EcdsaP256Engine;

impl SignatureEngine for EcdsaP256Engine {
    type Family = Classical;

    fn algorithm(&self) -> AlgorithmId {
        AlgorithmId::EcdsaP256Sha256V1
    }

    fn keypair_from_seed(
        &self,
        seed: &[u8],
    ) -> Result<(SecretKey<Classical>, PublicKey<Classical>), CryptoError> {
        keypair_with::<P256SecretKey, _>(self.algorithm(), seed)
    }

    fn sign(
        &self,
        message: &[u8],
        key: &SecretKey<Classical>,
    ) -> Result<TaggedSignature<Classical>, CryptoError> {
        sign_with::<P256SecretKey, _>(self.algorithm(), message, key)
    }

    fn verify(
        &self,
        message: &[u8],
        signature: &TaggedSignature<Classical>,
        key: &PublicKey<Classical>,
    ) -> bool {
        verify_with::<<P256SecretKey as SigningKey>::VerifyKey, _>(
            self.algorithm(),
            message,
            signature,
            key,
        )
    }
}

pub type DynEngine<F> = Arc<dyn SignatureEngine<Family = F>>;

/// Engines of one family keyed by algorithm, plus the one used for new keys.
#[derive(Clone)]
pub struct EngineTable<F: AlgorithmFamily> {
    engines: BTreeMap<AlgorithmId, DynEngine<F>>,
    current: AlgorithmId,
}

impl<F: AlgorithmFamily> EngineTable<F> {
    pub fn new(engine: DynEngine<F>) -> Result<Self, CryptoError> {
        let current = engine.algorithm();
        let mut table = Self {
            engines: BTreeMap::new(),
            current,
        };
        table.register(engine, true)?;
        Ok(table)
    }

    /// Add an engine. Older engines stay registered so envelopes produced
    /// under them keep verifying after a migration.
    pub fn register(&mut self, engine: DynEngine<F>, make_current: bool) -> Result<(), CryptoError> {
        let algorithm = engine.algorithm();
        if algorithm.family() != F::FAMILY {
            return Err(CryptoError::AlgorithmMismatch {
                algorithm,
                expected: F::FAMILY,
            });
        }
        self.engines.insert(algorithm, engine);
        if make_current {
            self.current = algorithm;
        }
        Ok(())
    }

    pub fn current(&self) -> &DynEngine<F> {
        // `current` is only ever set to a key present in `engines`.
        &self.engines[&self.current]
    }

    pub fn get(&self, algorithm: AlgorithmId) -> Option<&DynEngine<F>> {
        self.engines.get(&algorithm)
    }

    pub fn algorithms(&self) -> impl Iterator<Item = AlgorithmId> + '_ {
        self.engines.keys().copied()
    }
}

/// Strategy table for both halves of the hybrid.
#[derive(Clone)]
pub struct EngineRegistry {
    pq: EngineTable<PostQuantum>,
    classical: EngineTable<Classical>,
}

impl EngineRegistry {
    pub fn new(pq: EngineTable<PostQuantum>, classical: EngineTable<Classical>) -> Self {
        Self { pq, classical }
    }

    pub fn pq(&self) -> &EngineTable<PostQuantum> {
        &self.pq
    }

    pub fn classical(&self) -> &EngineTable<Classical> {
        &self.classical
    }

    pub fn pq_mut(&mut self) -> &mut EngineTable<PostQuantum> {
        &mut self.pq
    }

    pub fn classical_mut(&mut self) -> &mut EngineTable<Classical> {
        &mut self.classical
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self {
            pq: EngineTable {
                engines: BTreeMap::from([(
                    AlgorithmId::MlDsa65V1,
                    Arc::new(MlDsa65Engine) as DynEngine<PostQuantum>,
                )]),
                current: AlgorithmId::MlDsa65V1,
            },
            classical: EngineTable {
                engines: BTreeMap::from([(
                    AlgorithmId::EcdsaP256Sha256V1,
                    Arc::new(EcdsaP256Engine) as DynEngine<Classical>,
                )]),
                current: AlgorithmId::EcdsaP256Sha256V1,
            },
        }
    }
}
