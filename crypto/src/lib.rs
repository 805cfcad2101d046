#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod algorithm;
pub mod deterministic;
pub mod ecdsa;
pub mod engine;
#[cfg(feature = "std")]
pub mod entropy;
pub mod error;
pub mod hashes;
pub mod ml_dsa;
pub mod traits;

pub use algorithm::{
    AlgorithmFamily, AlgorithmId, Classical, Family, PostQuantum, PublicKey, SecretKey,
    TaggedSignature,
};
pub use engine::{
    DynEngine, EcdsaP256Engine, EngineRegistry, EngineTable, MlDsa65Engine, SignatureEngine,
};
pub use error::CryptoError;
