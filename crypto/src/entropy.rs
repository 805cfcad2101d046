//! Fresh key seeds from the operating system RNG.

use rand::rngs::OsRng;
use rand::TryRngCore;

use crate::error::CryptoError;

pub const SEED_LEN: usize = 32;

/// Draw a 32-byte seed from the OS CSPRNG. Fails instead of falling back to a
/// weaker source.
pub fn os_seed() -> Result<[u8; SEED_LEN], CryptoError> {
    let mut seed = [0u8; SEED_LEN];
    OsRng
        .try_fill_bytes(&mut seed)
        .map_err(|_| CryptoError::Entropy)?;
    Ok(seed)
}
