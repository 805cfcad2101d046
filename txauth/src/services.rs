//! Wiring of vault, signer and verifier from a [`TxAuthConfig`].

use std::sync::Arc;

use crypto::EngineRegistry;
use tracing::info;

use crate::audit::{AuditDispatcher, AuditSink};
use crate::certificates::CertificateDirectory;
use crate::clock::Clock;
use crate::config::TxAuthConfig;
use crate::error::StartupError;
use crate::signer::HybridSigningService;
use crate::vault::{InMemoryKeyVault, KeyVault, TimeoutVault};
use crate::verifier::HybridVerificationService;

pub struct HybridServices {
    pub vault: Arc<dyn KeyVault>,
    pub signer: HybridSigningService,
    pub verifier: HybridVerificationService,
    pub audit: Arc<AuditDispatcher>,
}

impl HybridServices {
    /// In-memory vault behind a bounded worker pool with a per-call timeout,
    /// and `sink` fed through a bounded dispatcher.
    pub fn from_config(
        config: &TxAuthConfig,
        clock: Arc<dyn Clock>,
        certificates: Option<Arc<dyn CertificateDirectory>>,
        sink: Arc<dyn AuditSink>,
    ) -> Result<Self, StartupError> {
        let engines = EngineRegistry::default();
        let mut backend = InMemoryKeyVault::new(engines.clone(), Arc::clone(&clock))
            .with_key_validity(config.key_validity());
        if let Some(certificates) = certificates {
            backend = backend.with_certificates(certificates);
        }
        let vault: Arc<dyn KeyVault> = Arc::new(TimeoutVault::with_pool(
            Arc::new(backend),
            config.vault_timeout(),
            config.vault_workers,
            config.vault_queue,
        )?);
        let audit = Arc::new(AuditDispatcher::new(sink, config.audit_queue)?);

        let signer = HybridSigningService::new(
            Arc::clone(&vault),
            Arc::clone(&clock),
            audit.clone(),
        );
        let verifier = HybridVerificationService::new(
            Arc::clone(&vault),
            engines,
            clock,
            audit.clone(),
        )
        .with_expired_policy(config.expired_policy);

        info!(
            key_validity_days = config.key_validity_days,
            expired_policy = ?config.expired_policy,
            vault_timeout_ms = config.vault_timeout_ms,
            vault_workers = config.vault_workers,
            audit_queue = config.audit_queue,
            "hybrid services ready"
        );
        Ok(Self {
            vault,
            signer,
            verifier,
            audit,
        })
    }
}
