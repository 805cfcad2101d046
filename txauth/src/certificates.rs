//! Certificate lifecycle input owned by the surrounding certificate service.
//! The vault only reads it when deriving a bundle's effective status.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{UserId, ValidityWindow};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateLifecycle {
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub revoked: bool,
}

impl CertificateLifecycle {
    pub fn window(&self) -> ValidityWindow {
        ValidityWindow::new(self.valid_from, self.valid_to)
    }
}

pub trait CertificateDirectory: Send + Sync {
    fn lifecycle(&self, user: UserId) -> Option<CertificateLifecycle>;
}

/// Directory backed by a map, fed by whatever owns certificate records.
#[derive(Debug, Default)]
pub struct InMemoryCertificates {
    records: RwLock<HashMap<UserId, CertificateLifecycle>>,
}

impl InMemoryCertificates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, user: UserId, lifecycle: CertificateLifecycle) {
        self.records.write().insert(user, lifecycle);
    }

    pub fn remove(&self, user: UserId) {
        self.records.write().remove(&user);
    }
}

impl CertificateDirectory for InMemoryCertificates {
    fn lifecycle(&self, user: UserId) -> Option<CertificateLifecycle> {
        self.records.read().get(&user).copied()
    }
}
