use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use crypto::entropy::os_seed;
use crypto::{
    AlgorithmFamily, AlgorithmId, Classical, CryptoError, EngineRegistry, EngineTable,
    PostQuantum, PublicKey, SecretKey, TaggedSignature,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::{KeyVault, VaultSignature};
use crate::certificates::CertificateDirectory;
use crate::clock::{Clock, SystemClock};
use crate::error::{KeyVaultError, Result};
use crate::types::{KeyStatus, PublicKeyBundle, UserId, ValidityWindow};

pub const DEFAULT_KEY_VALIDITY_DAYS: i64 = 365;

struct KeyPair<F> {
    secret: SecretKey<F>,
    public: PublicKey<F>,
}

/// One generation of a user's keys. Immutable once installed.
struct HybridKeys {
    generation: u64,
    created_at: DateTime<Utc>,
    validity: ValidityWindow,
    pq: KeyPair<PostQuantum>,
    classical: KeyPair<Classical>,
}

struct Slot {
    current: Option<Arc<HybridKeys>>,
    stored: KeyStatus,
    generation: u64,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            current: None,
            stored: KeyStatus::Active,
            generation: 0,
        }
    }
}

/// Process-local vault. Each user has a slot guarded by its own mutex; the
/// map lock is held only long enough to find or create a slot.
pub struct InMemoryKeyVault {
    slots: RwLock<HashMap<UserId, Arc<Mutex<Slot>>>>,
    engines: EngineRegistry,
    clock: Arc<dyn Clock>,
    certificates: Option<Arc<dyn CertificateDirectory>>,
    key_validity: Duration,
}

impl Default for InMemoryKeyVault {
    fn default() -> Self {
        Self::new(EngineRegistry::default(), Arc::new(SystemClock))
    }
}

impl InMemoryKeyVault {
    pub fn new(engines: EngineRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            engines,
            clock,
            certificates: None,
            key_validity: Duration::days(DEFAULT_KEY_VALIDITY_DAYS),
        }
    }

    pub fn with_key_validity(mut self, validity: Duration) -> Self {
        self.key_validity = validity;
        self
    }

    pub fn with_certificates(mut self, certificates: Arc<dyn CertificateDirectory>) -> Self {
        self.certificates = Some(certificates);
        self
    }

    /// Persist `EXPIRED` for active bundles whose effective window (key
    /// validity narrowed by any certificate) has closed. Returns how many
    /// bundles changed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let slots: Vec<(UserId, Arc<Mutex<Slot>>)> = self
            .slots
            .read()
            .iter()
            .map(|(user, slot)| (*user, Arc::clone(slot)))
            .collect();
        let mut changed = 0;
        for (user, slot) in slots {
            let mut slot = slot.lock();
            if slot.stored != KeyStatus::Active {
                continue;
            }
            let Some(generation) = slot.current.as_ref().map(|keys| keys.generation) else {
                continue;
            };
            let Some((status, window)) = self.status(user, &slot) else {
                continue;
            };
            // A bundle whose certificate window has not opened yet is left alone.
            if status == KeyStatus::Expired && now > window.valid_to {
                slot.stored = KeyStatus::Expired;
                changed += 1;
                info!(user = %user, generation, valid_to = %window.valid_to, "key bundle expired");
            }
        }
        changed
    }

    fn existing_slot(&self, user: UserId) -> Option<Arc<Mutex<Slot>>> {
        self.slots.read().get(&user).cloned()
    }

    fn slot(&self, user: UserId) -> Arc<Mutex<Slot>> {
        if let Some(slot) = self.existing_slot(user) {
            return slot;
        }
        Arc::clone(self.slots.write().entry(user).or_default())
    }

    /// Effective status and window of the slot's current bundle, if any.
    fn status(&self, user: UserId, slot: &Slot) -> Option<(KeyStatus, ValidityWindow)> {
        let keys = slot.current.as_ref()?;
        let certificate = self
            .certificates
            .as_ref()
            .and_then(|directory| directory.lifecycle(user));
        let window = match certificate {
            Some(lifecycle) => keys.validity.intersect(&lifecycle.window()),
            None => keys.validity,
        };
        let revoked = slot.stored == KeyStatus::Revoked
            || certificate.is_some_and(|lifecycle| lifecycle.revoked);
        let status = if revoked {
            KeyStatus::Revoked
        } else if slot.stored == KeyStatus::Expired || !window.contains(self.clock.now()) {
            KeyStatus::Expired
        } else {
            KeyStatus::Active
        };
        Some((status, window))
    }

    fn view(
        &self,
        user: UserId,
        keys: &HybridKeys,
        status: KeyStatus,
        validity: ValidityWindow,
    ) -> PublicKeyBundle {
        PublicKeyBundle {
            user_id: user,
            generation: keys.generation,
            pq: keys.pq.public.clone(),
            classical: keys.classical.public.clone(),
            created_at: keys.created_at,
            status,
            validity,
        }
    }

    fn fresh_pair<F: AlgorithmFamily>(table: &EngineTable<F>) -> Result<KeyPair<F>> {
        let seed = Zeroizing::new(os_seed()?);
        let (secret, public) = table.current().keypair_from_seed(&seed[..])?;
        Ok(KeyPair { secret, public })
    }

    fn fresh_keys(&self) -> Result<(KeyPair<PostQuantum>, KeyPair<Classical>)> {
        let pq = Self::fresh_pair(self.engines.pq())?;
        let classical = Self::fresh_pair(self.engines.classical())?;
        Ok((pq, classical))
    }

    fn install(
        &self,
        user: UserId,
        slot: &mut Slot,
        pq: KeyPair<PostQuantum>,
        classical: KeyPair<Classical>,
    ) -> PublicKeyBundle {
        let now = self.clock.now();
        slot.generation += 1;
        let keys = Arc::new(HybridKeys {
            generation: slot.generation,
            created_at: now,
            validity: ValidityWindow::new(now, now + self.key_validity),
            pq,
            classical,
        });
        slot.current = Some(Arc::clone(&keys));
        slot.stored = KeyStatus::Active;
        let (status, window) = self
            .status(user, slot)
            .unwrap_or((KeyStatus::Active, keys.validity));
        let bundle = self.view(user, &keys, status, window);
        info!(
            user = %user,
            generation = bundle.generation,
            pq_key = %bundle.pq_key_id(),
            classical_key = %bundle.classical_key_id(),
            pq_algorithm = %bundle.pq.algorithm(),
            classical_algorithm = %bundle.classical.algorithm(),
            "installed hybrid key bundle"
        );
        bundle
    }

    fn sign_half<F: AlgorithmFamily>(
        table: &EngineTable<F>,
        message: &[u8],
        secret: &SecretKey<F>,
    ) -> Result<TaggedSignature<F>> {
        let algorithm: AlgorithmId = secret.algorithm();
        let engine = table
            .get(algorithm)
            .ok_or(CryptoError::UnsupportedAlgorithm(algorithm))?;
        Ok(engine.sign(message, secret)?)
    }
}

impl KeyVault for InMemoryKeyVault {
    fn generate(&self, user: UserId) -> Result<PublicKeyBundle> {
        let slot = self.slot(user);
        if let Some((KeyStatus::Active, _)) = self.status(user, &slot.lock()) {
            return Err(KeyVaultError::KeyAlreadyExists(user));
        }

        let (pq, classical) = self.fresh_keys()?;

        let mut guard = slot.lock();
        if let Some((KeyStatus::Active, _)) = self.status(user, &guard) {
            debug!(user = %user, "lost generate race; discarding fresh keys");
            return Err(KeyVaultError::KeyAlreadyExists(user));
        }
        Ok(self.install(user, &mut guard, pq, classical))
    }

    fn rotate(&self, user: UserId) -> Result<PublicKeyBundle> {
        let slot = self.slot(user);
        let (pq, classical) = self.fresh_keys()?;
        let mut guard = slot.lock();
        let previous = guard.current.as_ref().map(|keys| keys.generation);
        let bundle = self.install(user, &mut guard, pq, classical);
        info!(user = %user, ?previous, generation = bundle.generation, "rotated key bundle");
        Ok(bundle)
    }

    fn get_public_bundle(&self, user: UserId) -> Result<PublicKeyBundle> {
        let slot = self
            .existing_slot(user)
            .ok_or(KeyVaultError::KeyNotFound(user))?;
        let guard = slot.lock();
        let keys = guard
            .current
            .as_ref()
            .ok_or(KeyVaultError::KeyNotFound(user))?;
        let (status, window) = self
            .status(user, &guard)
            .ok_or(KeyVaultError::KeyNotFound(user))?;
        Ok(self.view(user, keys, status, window))
    }

    fn revoke(&self, user: UserId) -> Result<()> {
        let slot = self
            .existing_slot(user)
            .ok_or(KeyVaultError::KeyNotFound(user))?;
        let mut guard = slot.lock();
        let Some(generation) = guard.current.as_ref().map(|keys| keys.generation) else {
            return Err(KeyVaultError::KeyNotFound(user));
        };
        if guard.stored == KeyStatus::Revoked {
            debug!(user = %user, generation, "key bundle already revoked");
            return Ok(());
        }
        guard.stored = KeyStatus::Revoked;
        warn!(user = %user, generation, "revoked key bundle");
        Ok(())
    }

    fn sign(&self, user: UserId, message: &[u8]) -> Result<VaultSignature> {
        let slot = self
            .existing_slot(user)
            .ok_or(KeyVaultError::KeyNotFound(user))?;
        let (keys, window) = {
            let guard = slot.lock();
            match (guard.current.as_ref(), self.status(user, &guard)) {
                (Some(keys), Some((KeyStatus::Active, window))) => (Arc::clone(keys), window),
                (_, Some((KeyStatus::Revoked, _))) => return Err(KeyVaultError::KeyRevoked(user)),
                (_, Some((KeyStatus::Expired, _))) => return Err(KeyVaultError::KeyExpired(user)),
                _ => return Err(KeyVaultError::KeyNotFound(user)),
            }
        };

        let pq = Self::sign_half(self.engines.pq(), message, &keys.pq.secret)?;
        let classical = Self::sign_half(self.engines.classical(), message, &keys.classical.secret)?;
        debug!(user = %user, generation = keys.generation, "signed with both keys");
        Ok(VaultSignature {
            pq,
            classical,
            bundle: self.view(user, &keys, KeyStatus::Active, window),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificates::{CertificateLifecycle, InMemoryCertificates};
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::time::Duration as StdDuration;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    fn vault_at(clock: Arc<ManualClock>) -> InMemoryKeyVault {
        InMemoryKeyVault::new(EngineRegistry::default(), clock).with_key_validity(Duration::days(30))
    }

    #[test]
    fn generate_then_get_returns_same_public_keys() {
        let clock = Arc::new(ManualClock::new(start()));
        let vault = vault_at(clock);
        let created = vault.generate(UserId(1)).expect("generate");
        let fetched = vault.get_public_bundle(UserId(1)).expect("get");
        assert_eq!(created, fetched);
        assert_eq!(created.generation, 1);
        assert_eq!(created.status, KeyStatus::Active);
        assert_eq!(created.validity.valid_to, start() + Duration::days(30));
    }

    #[test]
    fn generate_twice_is_rejected_while_active() {
        let vault = vault_at(Arc::new(ManualClock::new(start())));
        vault.generate(UserId(2)).expect("generate");
        assert_eq!(
            vault.generate(UserId(2)),
            Err(KeyVaultError::KeyAlreadyExists(UserId(2)))
        );
    }

    #[test]
    fn unknown_user_is_not_found_everywhere() {
        let vault = vault_at(Arc::new(ManualClock::new(start())));
        let user = UserId(999);
        assert_eq!(
            vault.get_public_bundle(user),
            Err(KeyVaultError::KeyNotFound(user))
        );
        assert_eq!(vault.revoke(user), Err(KeyVaultError::KeyNotFound(user)));
        assert!(matches!(
            vault.sign(user, b"m"),
            Err(KeyVaultError::KeyNotFound(_))
        ));
    }

    #[test]
    fn revoke_is_idempotent_and_blocks_signing() {
        let vault = vault_at(Arc::new(ManualClock::new(start())));
        let user = UserId(3);
        vault.generate(user).expect("generate");
        vault.revoke(user).expect("revoke");
        vault.revoke(user).expect("revoke again");
        assert_eq!(
            vault.get_public_bundle(user).expect("get").status,
            KeyStatus::Revoked
        );
        assert!(matches!(
            vault.sign(user, b"m"),
            Err(KeyVaultError::KeyRevoked(_))
        ));
    }

    #[test]
    fn regenerate_after_revoke_starts_new_generation() {
        let vault = vault_at(Arc::new(ManualClock::new(start())));
        let user = UserId(4);
        let first = vault.generate(user).expect("generate");
        vault.revoke(user).expect("revoke");
        let second = vault.generate(user).expect("regenerate");
        assert_eq!(second.generation, first.generation + 1);
        assert_eq!(second.status, KeyStatus::Active);
        assert_ne!(first.pq, second.pq);
        assert_ne!(first.classical, second.classical);
    }

    #[test]
    fn rotation_supersedes_active_bundle() {
        let vault = vault_at(Arc::new(ManualClock::new(start())));
        let user = UserId(5);
        let first = vault.generate(user).expect("generate");
        let rotated = vault.rotate(user).expect("rotate");
        assert_eq!(rotated.generation, 2);
        assert_ne!(first.pq, rotated.pq);
        assert_eq!(vault.get_public_bundle(user).expect("get"), rotated);
    }

    #[test]
    fn status_expires_with_the_clock() {
        let clock = Arc::new(ManualClock::new(start()));
        let vault = vault_at(Arc::clone(&clock));
        let user = UserId(6);
        vault.generate(user).expect("generate");
        clock.advance(Duration::days(30));
        assert_eq!(
            vault.get_public_bundle(user).expect("get").status,
            KeyStatus::Active
        );
        clock.advance(Duration::milliseconds(1));
        assert_eq!(
            vault.get_public_bundle(user).expect("get").status,
            KeyStatus::Expired
        );
        assert!(matches!(
            vault.sign(user, b"m"),
            Err(KeyVaultError::KeyExpired(_))
        ));
        // An expired bundle no longer blocks generation.
        assert_eq!(vault.generate(user).expect("regenerate").generation, 2);
    }

    #[test]
    fn sweep_persists_expiry() {
        let clock = Arc::new(ManualClock::new(start()));
        let vault = vault_at(Arc::clone(&clock));
        vault.generate(UserId(7)).expect("generate");
        vault.generate(UserId(8)).expect("generate");
        assert_eq!(vault.sweep_expired(), 0);
        clock.advance(Duration::days(31));
        assert_eq!(vault.sweep_expired(), 2);
        clock.set(start());
        assert_eq!(
            vault.get_public_bundle(UserId(7)).expect("get").status,
            KeyStatus::Expired
        );
    }

    #[test]
    fn sweep_follows_the_certificate_window() {
        let clock = Arc::new(ManualClock::new(start()));
        let certificates = Arc::new(InMemoryCertificates::new());
        let vault = vault_at(Arc::clone(&clock)).with_certificates(certificates.clone());
        vault.generate(UserId(14)).expect("generate");
        vault.generate(UserId(15)).expect("generate");
        vault.generate(UserId(16)).expect("generate");
        certificates.upsert(
            UserId(14),
            CertificateLifecycle {
                valid_from: start(),
                valid_to: start() + Duration::days(2),
                revoked: false,
            },
        );
        certificates.upsert(
            UserId(16),
            CertificateLifecycle {
                valid_from: start() + Duration::days(10),
                valid_to: start() + Duration::days(20),
                revoked: false,
            },
        );

        clock.advance(Duration::days(3));
        assert_eq!(vault.sweep_expired(), 1);
        // Re-admitting the certificate does not resurrect a swept bundle.
        certificates.upsert(
            UserId(14),
            CertificateLifecycle {
                valid_from: start(),
                valid_to: start() + Duration::days(60),
                revoked: false,
            },
        );
        assert_eq!(
            vault.get_public_bundle(UserId(14)).expect("get").status,
            KeyStatus::Expired
        );
        assert_eq!(
            vault.get_public_bundle(UserId(15)).expect("get").status,
            KeyStatus::Active
        );
        assert_eq!(
            vault.get_public_bundle(UserId(16)).expect("get").status,
            KeyStatus::Expired
        );

        clock.advance(Duration::days(8));
        assert_eq!(
            vault.get_public_bundle(UserId(16)).expect("get").status,
            KeyStatus::Active
        );
        assert_eq!(vault.sweep_expired(), 0);
    }

    #[test]
    fn certificate_directory_narrows_status() {
        let clock = Arc::new(ManualClock::new(start()));
        let certificates = Arc::new(InMemoryCertificates::new());
        let vault = vault_at(Arc::clone(&clock)).with_certificates(certificates.clone());
        let user = UserId(9);
        vault.generate(user).expect("generate");

        certificates.upsert(
            user,
            CertificateLifecycle {
                valid_from: start(),
                valid_to: start() + Duration::days(5),
                revoked: false,
            },
        );
        let bundle = vault.get_public_bundle(user).expect("get");
        assert_eq!(bundle.status, KeyStatus::Active);
        assert_eq!(bundle.validity.valid_to, start() + Duration::days(5));

        clock.advance(Duration::days(6));
        assert_eq!(
            vault.get_public_bundle(user).expect("get").status,
            KeyStatus::Expired
        );

        certificates.upsert(
            user,
            CertificateLifecycle {
                valid_from: start(),
                valid_to: start() + Duration::days(60),
                revoked: true,
            },
        );
        assert_eq!(
            vault.get_public_bundle(user).expect("get").status,
            KeyStatus::Revoked
        );
    }

    #[test]
    fn signatures_verify_against_returned_bundle() {
        let vault = vault_at(Arc::new(ManualClock::new(start())));
        let user = UserId(10);
        vault.generate(user).expect("generate");
        let signed = vault.sign(user, b"message").expect("sign");
        let engines = EngineRegistry::default();
        assert!(engines
            .pq()
            .current()
            .verify(b"message", &signed.pq, &signed.bundle.pq));
        assert!(engines
            .classical()
            .current()
            .verify(b"message", &signed.classical, &signed.bundle.classical));
    }

    #[test]
    fn held_slot_does_not_block_other_users() {
        let vault = Arc::new(vault_at(Arc::new(ManualClock::new(start()))));
        vault.generate(UserId(11)).expect("generate");
        let held = vault.slot(UserId(11));
        let _guard = held.lock();

        let (tx, rx) = crossbeam_channel::bounded(1);
        let worker = Arc::clone(&vault);
        std::thread::spawn(move || {
            let _ = tx.send(worker.generate(UserId(12)).map(|bundle| bundle.user_id));
        });
        let outcome = rx
            .recv_timeout(StdDuration::from_secs(30))
            .expect("other user progressed");
        assert_eq!(outcome, Ok(UserId(12)));
    }

    #[test]
    fn private_bytes_never_appear_in_views() {
        let vault = vault_at(Arc::new(ManualClock::new(start())));
        let user = UserId(13);
        vault.generate(user).expect("generate");
        let slot = vault.existing_slot(user).expect("slot");
        let keys = Arc::clone(slot.lock().current.as_ref().expect("keys"));
        let bundle = vault.get_public_bundle(user).expect("get");
        let secrets = [
            keys.pq.secret.expose_secret(),
            keys.classical.secret.expose_secret(),
        ];
        let publics = [bundle.pq.as_bytes(), bundle.classical.as_bytes()];
        for secret in secrets {
            for public in publics {
                assert!(!public.windows(secret.len()).any(|window| window == secret));
            }
        }

        // Both renderings spell bytes as decimal lists, so the secret's own
        // rendering is what a leak would look like.
        let debug = format!("{bundle:?}");
        let json = serde_json::to_string(&bundle).expect("serialize");
        for secret in secrets {
            let needle = format!("{secret:?}");
            let needle = needle.trim_start_matches('[').trim_end_matches(']');
            assert!(!debug.contains(needle));
            assert!(!json.contains(&needle.replace(' ', "")));
        }

        let value = serde_json::to_value(&bundle).expect("serialize");
        let mut fields: Vec<&str> = value
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect();
        fields.sort_unstable();
        assert_eq!(
            fields,
            ["classical", "created_at", "generation", "pq", "status", "user_id", "validity"]
        );
    }
}
