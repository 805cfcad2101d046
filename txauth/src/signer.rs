use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::audit::{emit, AuditAction, AuditEvent, AuditSink};
use crate::canonical::CanonicalPayload;
use crate::clock::Clock;
use crate::envelope::{signing_message, EnvelopeParts, SignatureEnvelope, ENVELOPE_VERSION};
use crate::error::SigningError;
use crate::types::UserId;
use crate::vault::KeyVault;

/// Produces dual-signature envelopes. Holds no key material; the vault signs.
pub struct HybridSigningService {
    vault: Arc<dyn KeyVault>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    audit_failures: AtomicU64,
}

impl HybridSigningService {
    pub fn new(vault: Arc<dyn KeyVault>, clock: Arc<dyn Clock>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            vault,
            clock,
            audit,
            audit_failures: AtomicU64::new(0),
        }
    }

    pub fn audit_failures(&self) -> u64 {
        self.audit_failures.load(Ordering::Relaxed)
    }

    pub fn sign(&self, payload: &[u8], user: UserId) -> Result<SignatureEnvelope, SigningError> {
        let canonical = CanonicalPayload::from_bytes(payload)?;
        self.sign_canonical(&canonical, user)
    }

    pub fn sign_value<T: Serialize + ?Sized>(
        &self,
        value: &T,
        user: UserId,
    ) -> Result<SignatureEnvelope, SigningError> {
        let canonical = CanonicalPayload::from_serialize(value)?;
        self.sign_canonical(&canonical, user)
    }

    pub fn sign_canonical(
        &self,
        canonical: &CanonicalPayload,
        user: UserId,
    ) -> Result<SignatureEnvelope, SigningError> {
        let payload_hash = canonical.digest();
        let timestamp = self.clock.now();
        let message = signing_message(ENVELOPE_VERSION, user, timestamp, &payload_hash);

        let signed = self.vault.sign(user, &message).map_err(|err| {
            warn!(user = %user, %err, "signing refused");
            err
        })?;

        let envelope = SignatureEnvelope::from_parts(EnvelopeParts {
            version: ENVELOPE_VERSION,
            payload_hash,
            pq: signed.pq,
            classical: signed.classical,
            signer: user,
            timestamp,
        });

        let pq_key_id = signed.bundle.pq_key_id();
        let classical_key_id = signed.bundle.classical_key_id();
        info!(
            user = %user,
            transaction_id = %envelope.transaction_id(),
            generation = signed.bundle.generation,
            pq_key = %pq_key_id,
            classical_key = %classical_key_id,
            "signed payload"
        );
        let event = AuditEvent {
            user,
            action: AuditAction::Sign,
            transaction_id: envelope.transaction_id(),
            valid: true,
            reason: None,
            pq_key_id: Some(pq_key_id),
            classical_key_id: Some(classical_key_id),
            at: timestamp,
        };
        emit(self.audit.as_ref(), &self.audit_failures, &event);
        Ok(envelope)
    }
}
