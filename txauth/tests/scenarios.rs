use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use crypto::{AlgorithmId, EngineRegistry};
use serde_json::json;
use txauth::{
    AuditAction, AuditError, AuditEvent, AuditSink, CertificateLifecycle, ExpiredKeyPolicy,
    HybridSigningService, HybridVerificationService, InMemoryCertificates, InMemoryKeyVault,
    KeyVault, KeyVaultError, ManualClock, MemoryAuditSink, PublicKeyBundle, ReasonCode,
    SignatureEnvelope, TimeoutVault, UserId, VaultSignature, VerificationError,
};

const PAYLOAD: &[u8] = b"transfer:100:acct7";

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 8, 30, 0).unwrap()
}

struct Harness {
    clock: Arc<ManualClock>,
    vault: Arc<InMemoryKeyVault>,
    audit: Arc<MemoryAuditSink>,
    signer: HybridSigningService,
    verifier: HybridVerificationService,
}

fn harness_with(
    policy: ExpiredKeyPolicy,
    certificates: Option<Arc<InMemoryCertificates>>,
    sink: Option<Arc<dyn AuditSink>>,
) -> Harness {
    let clock = Arc::new(ManualClock::new(start()));
    let mut vault = InMemoryKeyVault::new(EngineRegistry::default(), clock.clone())
        .with_key_validity(Duration::days(90));
    if let Some(certificates) = certificates {
        vault = vault.with_certificates(certificates);
    }
    let vault = Arc::new(vault);
    let audit = Arc::new(MemoryAuditSink::new());
    let sink: Arc<dyn AuditSink> = sink.unwrap_or_else(|| audit.clone() as Arc<dyn AuditSink>);
    let signer = HybridSigningService::new(vault.clone(), clock.clone(), sink.clone());
    let verifier =
        HybridVerificationService::new(vault.clone(), EngineRegistry::default(), clock.clone(), sink)
            .with_expired_policy(policy);
    Harness {
        clock,
        vault,
        audit,
        signer,
        verifier,
    }
}

fn harness() -> Harness {
    harness_with(ExpiredKeyPolicy::Reject, None, None)
}

fn flip_last_pq(envelope: SignatureEnvelope) -> SignatureEnvelope {
    let mut parts = envelope.into_parts();
    let sig = parts.pq.bytes_mut();
    let last = sig.len() - 1;
    sig[last] ^= 0x01;
    SignatureEnvelope::from_parts(parts)
}

fn flip_first_classical(envelope: SignatureEnvelope) -> SignatureEnvelope {
    let mut parts = envelope.into_parts();
    parts.classical.bytes_mut()[0] ^= 0x40;
    SignatureEnvelope::from_parts(parts)
}

#[test]
fn scenario_a_round_trip_is_valid() {
    let h = harness();
    let user = UserId(42);
    h.vault.generate(user).expect("generate");
    let envelope = h.signer.sign(PAYLOAD, user).expect("sign");
    let result = h.verifier.verify(PAYLOAD, &envelope, user).expect("verify");
    assert!(result.valid);
    assert_eq!(result.reason, None);
    assert_eq!(result.pq_algorithm, AlgorithmId::MlDsa65V1);
    assert_eq!(result.classical_algorithm, AlgorithmId::EcdsaP256Sha256V1);
}

#[test]
fn scenario_b_pq_tamper_is_pq_mismatch() {
    let h = harness();
    let user = UserId(42);
    h.vault.generate(user).expect("generate");
    let envelope = flip_last_pq(h.signer.sign(PAYLOAD, user).expect("sign"));
    let result = h.verifier.verify(PAYLOAD, &envelope, user).expect("verify");
    assert!(!result.valid);
    assert_eq!(result.reason, Some(ReasonCode::PqMismatch));
}

#[test]
fn scenario_c_unknown_user_is_key_not_found() {
    let h = harness();
    assert_eq!(
        h.vault.get_public_bundle(UserId(999)),
        Err(KeyVaultError::KeyNotFound(UserId(999)))
    );

    h.vault.generate(UserId(42)).expect("generate");
    let envelope = h.signer.sign(PAYLOAD, UserId(42)).expect("sign");
    assert_eq!(
        h.verifier.verify(PAYLOAD, &envelope, UserId(999)),
        Err(VerificationError::KeyNotFound(UserId(999)))
    );
}

#[test]
fn scenario_d_revoked_bundle_fails_verification() {
    let h = harness();
    let user = UserId(42);
    h.vault.generate(user).expect("generate");
    let envelope = h.signer.sign(PAYLOAD, user).expect("sign");
    h.vault.revoke(user).expect("revoke");
    let result = h.verifier.verify(PAYLOAD, &envelope, user).expect("verify");
    assert!(!result.valid);
    assert_eq!(result.reason, Some(ReasonCode::Revoked));
}

#[test]
fn scenario_e_json_representation_does_not_matter() {
    let h = harness();
    let user = UserId(42);
    h.vault.generate(user).expect("generate");
    let envelope = h
        .signer
        .sign(br#"{"amount":100,"to":"acct7"}"#, user)
        .expect("sign");
    let reordered = br#"{ "to": "acct7", "amount": 100.0 }"#;
    let result = h.verifier.verify(reordered, &envelope, user).expect("verify");
    assert!(result.valid, "{result:?}");
}

#[test]
fn classical_tamper_is_classical_mismatch() {
    let h = harness();
    let user = UserId(5);
    h.vault.generate(user).expect("generate");
    let envelope = flip_first_classical(h.signer.sign(PAYLOAD, user).expect("sign"));
    let result = h.verifier.verify(PAYLOAD, &envelope, user).expect("verify");
    assert_eq!(result.reason, Some(ReasonCode::ClassicalMismatch));
}

#[test]
fn both_halves_tampered_reports_pq_first() {
    let h = harness();
    let user = UserId(6);
    h.vault.generate(user).expect("generate");
    let envelope = flip_first_classical(flip_last_pq(h.signer.sign(PAYLOAD, user).expect("sign")));
    let result = h.verifier.verify(PAYLOAD, &envelope, user).expect("verify");
    assert_eq!(result.reason, Some(ReasonCode::PqMismatch));
}

#[test]
fn altered_payload_is_payload_mismatch() {
    let h = harness();
    let user = UserId(7);
    h.vault.generate(user).expect("generate");
    let envelope = h.signer.sign(PAYLOAD, user).expect("sign");
    let result = h
        .verifier
        .verify(b"transfer:900:acct7", &envelope, user)
        .expect("verify");
    assert!(!result.valid);
    assert_eq!(result.reason, Some(ReasonCode::PayloadMismatch));
}

#[test]
fn envelope_from_one_user_does_not_verify_for_another() {
    let h = harness();
    h.vault.generate(UserId(1)).expect("generate");
    h.vault.generate(UserId(2)).expect("generate");
    let envelope = h.signer.sign(PAYLOAD, UserId(1)).expect("sign");
    let result = h.verifier.verify(PAYLOAD, &envelope, UserId(2)).expect("verify");
    assert_eq!(result.reason, Some(ReasonCode::PqMismatch));
}

#[test]
fn forged_timestamp_breaks_both_signatures() {
    let h = harness();
    let user = UserId(8);
    h.vault.generate(user).expect("generate");
    let mut parts = h.signer.sign(PAYLOAD, user).expect("sign").into_parts();
    parts.timestamp += Duration::seconds(1);
    let result = h
        .verifier
        .verify(PAYLOAD, &SignatureEnvelope::from_parts(parts), user)
        .expect("verify");
    assert_eq!(result.reason, Some(ReasonCode::PqMismatch));
}

#[test]
fn rotation_invalidates_old_envelopes() {
    let h = harness();
    let user = UserId(9);
    h.vault.generate(user).expect("generate");
    let old = h.signer.sign(PAYLOAD, user).expect("sign");
    h.vault.rotate(user).expect("rotate");
    let result = h.verifier.verify(PAYLOAD, &old, user).expect("verify");
    assert_eq!(result.reason, Some(ReasonCode::PqMismatch));

    let fresh = h.signer.sign(PAYLOAD, user).expect("sign");
    assert!(h.verifier.verify(PAYLOAD, &fresh, user).expect("verify").valid);
}

#[test]
fn regenerated_bundle_after_revoke_signs_again() {
    let h = harness();
    let user = UserId(10);
    h.vault.generate(user).expect("generate");
    h.vault.revoke(user).expect("revoke");
    assert_eq!(
        h.signer.sign(PAYLOAD, user).map(|_| ()),
        Err(KeyVaultError::KeyRevoked(user).into())
    );
    h.vault.generate(user).expect("regenerate");
    let envelope = h.signer.sign(PAYLOAD, user).expect("sign");
    assert!(h.verifier.verify(PAYLOAD, &envelope, user).expect("verify").valid);
}

#[test]
fn expired_bundle_is_rejected_by_default() {
    let h = harness();
    let user = UserId(11);
    h.vault.generate(user).expect("generate");
    let envelope = h.signer.sign(PAYLOAD, user).expect("sign");
    h.clock.advance(Duration::days(91));
    let result = h.verifier.verify(PAYLOAD, &envelope, user).expect("verify");
    assert_eq!(result.reason, Some(ReasonCode::Expired));
    assert!(matches!(
        h.signer.sign(PAYLOAD, user),
        Err(txauth::SigningError::Vault(KeyVaultError::KeyExpired(_)))
    ));
}

#[test]
fn expired_bundle_accepts_envelopes_issued_in_window_when_configured() {
    let h = harness_with(ExpiredKeyPolicy::AcceptBeforeExpiry, None, None);
    let user = UserId(12);
    h.vault.generate(user).expect("generate");
    let envelope = h.signer.sign(PAYLOAD, user).expect("sign");
    h.clock.advance(Duration::days(91));
    let result = h.verifier.verify(PAYLOAD, &envelope, user).expect("verify");
    assert!(result.valid, "{result:?}");

    // A timestamp pushed past expiry is outside the window, and also no
    // longer matches the signatures.
    let mut parts = envelope.into_parts();
    parts.timestamp = start() + Duration::days(91);
    let late = SignatureEnvelope::from_parts(parts);
    let result = h.verifier.verify(PAYLOAD, &late, user).expect("verify");
    assert_eq!(result.reason, Some(ReasonCode::Expired));
}

#[test]
fn revoked_bundle_never_validates_even_with_lenient_expiry() {
    let h = harness_with(ExpiredKeyPolicy::AcceptBeforeExpiry, None, None);
    let user = UserId(13);
    h.vault.generate(user).expect("generate");
    let envelope = h.signer.sign(PAYLOAD, user).expect("sign");
    h.vault.revoke(user).expect("revoke");
    h.clock.advance(Duration::days(91));
    let result = h.verifier.verify(PAYLOAD, &envelope, user).expect("verify");
    assert_eq!(result.reason, Some(ReasonCode::Revoked));
}

#[test]
fn certificate_revocation_fails_verification() {
    let certificates = Arc::new(InMemoryCertificates::new());
    let h = harness_with(ExpiredKeyPolicy::Reject, Some(certificates.clone()), None);
    let user = UserId(14);
    h.vault.generate(user).expect("generate");
    let envelope = h.signer.sign(PAYLOAD, user).expect("sign");
    certificates.upsert(
        user,
        CertificateLifecycle {
            valid_from: start(),
            valid_to: start() + Duration::days(365),
            revoked: true,
        },
    );
    let result = h.verifier.verify(PAYLOAD, &envelope, user).expect("verify");
    assert_eq!(result.reason, Some(ReasonCode::Revoked));
}

#[test]
fn structured_values_sign_and_verify() {
    #[derive(serde::Serialize)]
    struct Transfer {
        amount: u64,
        to: &'static str,
    }
    let h = harness();
    let user = UserId(15);
    h.vault.generate(user).expect("generate");
    let envelope = h
        .signer
        .sign_value(&Transfer { amount: 100, to: "acct7" }, user)
        .expect("sign");
    let result = h
        .verifier
        .verify_value(&json!({"to": "acct7", "amount": 100}), &envelope, user)
        .expect("verify");
    assert!(result.valid);
    let raw = h
        .verifier
        .verify(br#"{"amount":100,"to":"acct7"}"#, &envelope, user)
        .expect("verify");
    assert!(raw.valid);
}

#[test]
fn envelope_survives_json_transport() {
    let h = harness();
    let user = UserId(16);
    h.vault.generate(user).expect("generate");
    let envelope = h.signer.sign(PAYLOAD, user).expect("sign");
    let wire = serde_json::to_string(&envelope).expect("encode");
    let received: SignatureEnvelope = serde_json::from_str(&wire).expect("decode");
    assert_eq!(received, envelope);
    assert_eq!(
        received.pq_signature().as_bytes(),
        envelope.pq_signature().as_bytes()
    );
    assert!(h.verifier.verify(PAYLOAD, &received, user).expect("verify").valid);
}

#[test]
fn every_sign_and_verify_is_audited() {
    let h = harness();
    let user = UserId(17);
    let bundle = h.vault.generate(user).expect("generate");
    let envelope = h.signer.sign(PAYLOAD, user).expect("sign");
    h.verifier.verify(PAYLOAD, &envelope, user).expect("verify");
    h.verifier
        .verify(PAYLOAD, &flip_last_pq(envelope.clone()), user)
        .expect("verify");

    let events = h.audit.events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].action, AuditAction::Sign);
    assert!(events[1].valid);
    assert_eq!(events[2].reason, Some(ReasonCode::PqMismatch));
    for event in &events {
        assert_eq!(event.transaction_id, envelope.transaction_id());
        assert_eq!(event.pq_key_id.as_deref(), Some(bundle.pq_key_id().as_str()));
    }
}

struct RefusingSink;

impl AuditSink for RefusingSink {
    fn log_action(&self, _event: &AuditEvent) -> Result<(), AuditError> {
        Err(AuditError::Sink("audit store offline".to_string()))
    }
}

#[test]
fn audit_failure_never_changes_outcomes() {
    let h = harness_with(ExpiredKeyPolicy::Reject, None, Some(Arc::new(RefusingSink)));
    let user = UserId(18);
    h.vault.generate(user).expect("generate");
    let envelope = h.signer.sign(PAYLOAD, user).expect("sign despite audit failure");
    assert!(h.verifier.verify(PAYLOAD, &envelope, user).expect("verify").valid);
    let tampered = h
        .verifier
        .verify(PAYLOAD, &flip_last_pq(envelope), user)
        .expect("verify");
    assert_eq!(tampered.reason, Some(ReasonCode::PqMismatch));
    assert_eq!(h.signer.audit_failures(), 1);
    assert_eq!(h.verifier.audit_failures(), 2);
}

/// Backend that never answers bundle lookups.
struct UnreachableVault;

impl KeyVault for UnreachableVault {
    fn generate(&self, user: UserId) -> txauth::error::Result<PublicKeyBundle> {
        Err(KeyVaultError::KeyNotFound(user))
    }

    fn rotate(&self, user: UserId) -> txauth::error::Result<PublicKeyBundle> {
        Err(KeyVaultError::KeyNotFound(user))
    }

    fn get_public_bundle(&self, _user: UserId) -> txauth::error::Result<PublicKeyBundle> {
        std::thread::sleep(StdDuration::from_secs(5));
        Err(KeyVaultError::Entropy)
    }

    fn revoke(&self, _user: UserId) -> txauth::error::Result<()> {
        Ok(())
    }

    fn sign(&self, user: UserId, _message: &[u8]) -> txauth::error::Result<VaultSignature> {
        Err(KeyVaultError::KeyNotFound(user))
    }
}

#[test]
fn stalled_vault_is_an_infrastructure_error() {
    let h = harness();
    let user = UserId(19);
    h.vault.generate(user).expect("generate");
    let envelope = h.signer.sign(PAYLOAD, user).expect("sign");

    let stalled = Arc::new(
        TimeoutVault::new(Arc::new(UnreachableVault), StdDuration::from_millis(50))
            .expect("vault pool"),
    );
    let verifier = HybridVerificationService::new(
        stalled,
        EngineRegistry::default(),
        h.clock.clone(),
        h.audit.clone(),
    );
    assert!(matches!(
        verifier.verify(PAYLOAD, &envelope, user),
        Err(VerificationError::Unavailable {
            operation: "get_public_bundle",
            ..
        })
    ));
}
