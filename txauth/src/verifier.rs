//! Hybrid verification: an envelope is valid only when the payload hash
//! matches, the signer's bundle is usable, and both signatures verify.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crypto::{AlgorithmId, EngineRegistry};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{debug, info};

use crate::audit::{emit, AuditAction, AuditEvent, AuditSink};
use crate::canonical::CanonicalPayload;
use crate::clock::Clock;
use crate::envelope::{signing_message, SignatureEnvelope};
use crate::error::VerificationError;
use crate::types::{KeyStatus, PublicKeyBundle, UserId};
use crate::vault::KeyVault;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    PqMismatch,
    ClassicalMismatch,
    Revoked,
    Expired,
    PayloadMismatch,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::PqMismatch => "pq_mismatch",
            ReasonCode::ClassicalMismatch => "classical_mismatch",
            ReasonCode::Revoked => "revoked",
            ReasonCode::Expired => "expired",
            ReasonCode::PayloadMismatch => "payload_mismatch",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub valid: bool,
    pub reason: Option<ReasonCode>,
    pub pq_algorithm: AlgorithmId,
    pub classical_algorithm: AlgorithmId,
}

impl VerificationResult {
    fn accepted(envelope: &SignatureEnvelope) -> Self {
        Self {
            valid: true,
            reason: None,
            pq_algorithm: envelope.pq_algorithm(),
            classical_algorithm: envelope.classical_algorithm(),
        }
    }

    fn rejected(envelope: &SignatureEnvelope, reason: ReasonCode) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            pq_algorithm: envelope.pq_algorithm(),
            classical_algorithm: envelope.classical_algorithm(),
        }
    }
}

/// What to do with an envelope whose signer's bundle has expired.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpiredKeyPolicy {
    /// Expired bundles never validate.
    #[default]
    Reject,
    /// Accept envelopes whose signed timestamp falls inside the bundle's
    /// validity window.
    AcceptBeforeExpiry,
}

impl std::str::FromStr for ExpiredKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(ExpiredKeyPolicy::Reject),
            "accept-before-expiry" => Ok(ExpiredKeyPolicy::AcceptBeforeExpiry),
            other => Err(format!(
                "unknown expired-key policy {other:?} (expected reject or accept-before-expiry)"
            )),
        }
    }
}

pub struct HybridVerificationService {
    vault: Arc<dyn KeyVault>,
    engines: EngineRegistry,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    policy: ExpiredKeyPolicy,
    audit_failures: AtomicU64,
}

impl HybridVerificationService {
    pub fn new(
        vault: Arc<dyn KeyVault>,
        engines: EngineRegistry,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            vault,
            engines,
            clock,
            audit,
            policy: ExpiredKeyPolicy::default(),
            audit_failures: AtomicU64::new(0),
        }
    }

    pub fn with_expired_policy(mut self, policy: ExpiredKeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn expired_policy(&self) -> ExpiredKeyPolicy {
        self.policy
    }

    /// Audit events the sink refused.
    pub fn audit_failures(&self) -> u64 {
        self.audit_failures.load(Ordering::Relaxed)
    }

    /// Verify an envelope over raw payload bytes claimed to come from `user`.
    ///
    /// Cryptographic and lifecycle rejections come back as
    /// `Ok(VerificationResult { valid: false, .. })`. `Err` is reserved for
    /// a missing bundle or an unreachable vault.
    pub fn verify(
        &self,
        payload: &[u8],
        envelope: &SignatureEnvelope,
        user: UserId,
    ) -> Result<VerificationResult, VerificationError> {
        let digest = match CanonicalPayload::from_bytes(payload) {
            Ok(canonical) => Some(canonical.digest()),
            Err(err) => {
                debug!(user = %user, %err, "payload does not canonicalize");
                None
            }
        };
        self.verify_digest(digest, envelope, user)
    }

    /// Verify an envelope over structured data.
    pub fn verify_value<T: Serialize + ?Sized>(
        &self,
        value: &T,
        envelope: &SignatureEnvelope,
        user: UserId,
    ) -> Result<VerificationResult, VerificationError> {
        let digest = CanonicalPayload::from_serialize(value)
            .map(|canonical| canonical.digest())
            .ok();
        self.verify_digest(digest, envelope, user)
    }

    fn verify_digest(
        &self,
        digest: Option<[u8; 32]>,
        envelope: &SignatureEnvelope,
        user: UserId,
    ) -> Result<VerificationResult, VerificationError> {
        let hash_matches =
            digest.is_some_and(|digest| bool::from(digest[..].ct_eq(&envelope.payload_hash()[..])));
        if !hash_matches {
            let result = VerificationResult::rejected(envelope, ReasonCode::PayloadMismatch);
            self.record(user, envelope, &result, None);
            return Ok(result);
        }

        let bundle = self.vault.get_public_bundle(user)?;
        let result = self.check_bundle(&bundle, envelope, user);
        self.record(user, envelope, &result, Some(&bundle));
        Ok(result)
    }

    fn check_bundle(
        &self,
        bundle: &PublicKeyBundle,
        envelope: &SignatureEnvelope,
        user: UserId,
    ) -> VerificationResult {
        match bundle.status {
            KeyStatus::Active => {}
            KeyStatus::Revoked => {
                return VerificationResult::rejected(envelope, ReasonCode::Revoked);
            }
            KeyStatus::Expired => {
                let issued_in_window = bundle.validity.contains(envelope.timestamp());
                if self.policy == ExpiredKeyPolicy::Reject || !issued_in_window {
                    return VerificationResult::rejected(envelope, ReasonCode::Expired);
                }
                debug!(user = %user, "accepting envelope issued before key expiry");
            }
        }

        // Bound to the claimed user, not the envelope's signer field.
        let message = signing_message(
            envelope.version(),
            user,
            envelope.timestamp(),
            envelope.payload_hash(),
        );

        // Both halves always run.
        let pq_ok = self
            .engines
            .pq()
            .get(envelope.pq_algorithm())
            .is_some_and(|engine| engine.verify(&message, envelope.pq_signature(), &bundle.pq));
        let classical_ok = self
            .engines
            .classical()
            .get(envelope.classical_algorithm())
            .is_some_and(|engine| {
                engine.verify(&message, envelope.classical_signature(), &bundle.classical)
            });

        match (pq_ok, classical_ok) {
            (true, true) => VerificationResult::accepted(envelope),
            (false, _) => VerificationResult::rejected(envelope, ReasonCode::PqMismatch),
            (true, false) => VerificationResult::rejected(envelope, ReasonCode::ClassicalMismatch),
        }
    }

    fn record(
        &self,
        user: UserId,
        envelope: &SignatureEnvelope,
        result: &VerificationResult,
        bundle: Option<&PublicKeyBundle>,
    ) {
        info!(
            user = %user,
            transaction_id = %envelope.transaction_id(),
            valid = result.valid,
            reason = result.reason.map(ReasonCode::as_str),
            generation = bundle.map(|bundle| bundle.generation),
            "verified envelope"
        );
        let event = AuditEvent {
            user,
            action: AuditAction::Verify,
            transaction_id: envelope.transaction_id(),
            valid: result.valid,
            reason: result.reason,
            pq_key_id: bundle.map(PublicKeyBundle::pq_key_id),
            classical_key_id: bundle.map(PublicKeyBundle::classical_key_id),
            at: self.clock.now(),
        };
        emit(self.audit.as_ref(), &self.audit_failures, &event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_use_wire_names() {
        for code in [
            ReasonCode::PqMismatch,
            ReasonCode::ClassicalMismatch,
            ReasonCode::Revoked,
            ReasonCode::Expired,
            ReasonCode::PayloadMismatch,
        ] {
            let json = serde_json::to_string(&code).expect("serialize");
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn expired_policy_parses_config_values() {
        assert_eq!("reject".parse::<ExpiredKeyPolicy>(), Ok(ExpiredKeyPolicy::Reject));
        assert_eq!(
            "accept-before-expiry".parse::<ExpiredKeyPolicy>(),
            Ok(ExpiredKeyPolicy::AcceptBeforeExpiry)
        );
        assert!("lenient".parse::<ExpiredKeyPolicy>().is_err());
        assert_eq!(ExpiredKeyPolicy::default(), ExpiredKeyPolicy::Reject);
    }
}
