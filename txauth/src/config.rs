use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::vault::{DEFAULT_KEY_VALIDITY_DAYS, DEFAULT_VAULT_QUEUE, DEFAULT_VAULT_WORKERS};
use crate::verifier::ExpiredKeyPolicy;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxAuthConfig {
    /// Lifetime of a freshly generated bundle.
    pub key_validity_days: u32,
    pub expired_policy: ExpiredKeyPolicy,
    /// Upper bound on any single vault call.
    pub vault_timeout_ms: u64,
    /// Threads serving vault calls.
    pub vault_workers: usize,
    /// Vault calls allowed to wait for a worker.
    pub vault_queue: usize,
    /// Capacity of the audit dispatch queue.
    pub audit_queue: usize,
}

impl Default for TxAuthConfig {
    fn default() -> Self {
        Self {
            key_validity_days: DEFAULT_KEY_VALIDITY_DAYS as u32,
            expired_policy: ExpiredKeyPolicy::Reject,
            vault_timeout_ms: 2_000,
            vault_workers: DEFAULT_VAULT_WORKERS,
            vault_queue: DEFAULT_VAULT_QUEUE,
            audit_queue: 1024,
        }
    }
}

impl TxAuthConfig {
    /// Read `TXAUTH_*` variables, falling back to defaults for anything unset
    /// or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let key_validity_days = lookup("TXAUTH_KEY_VALIDITY_DAYS")
            .and_then(|s| s.parse().ok())
            .filter(|days| *days > 0)
            .unwrap_or(defaults.key_validity_days);

        let expired_policy = lookup("TXAUTH_EXPIRED_POLICY")
            .and_then(|s| s.trim().to_lowercase().parse().ok())
            .unwrap_or(defaults.expired_policy);

        let vault_timeout_ms = lookup("TXAUTH_VAULT_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(defaults.vault_timeout_ms);

        let vault_workers = lookup("TXAUTH_VAULT_WORKERS")
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.vault_workers);

        let vault_queue = lookup("TXAUTH_VAULT_QUEUE")
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.vault_queue);

        let audit_queue = lookup("TXAUTH_AUDIT_QUEUE")
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.audit_queue);

        Self {
            key_validity_days,
            expired_policy,
            vault_timeout_ms,
            vault_workers,
            vault_queue,
            audit_queue,
        }
    }

    pub fn key_validity(&self) -> Duration {
        Duration::days(i64::from(self.key_validity_days))
    }

    pub fn vault_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.vault_timeout_ms)
    }
}
