//! Audit records for every sign and verify, and the sinks that receive them.
//!
//! Sinks are advisory: the services swallow sink errors after logging and
//! counting them, so auditing can never change a signing or verification
//! outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::types::UserId;
use crate::verifier::ReasonCode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Sign,
    Verify,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Sign => "sign",
            AuditAction::Verify => "verify",
        }
    }
}

/// Never carries key material; keys are identified by short fingerprints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub user: UserId,
    pub action: AuditAction,
    /// Hex payload hash from the envelope.
    pub transaction_id: String,
    pub valid: bool,
    pub reason: Option<ReasonCode>,
    pub pq_key_id: Option<String>,
    pub classical_key_id: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    #[error("audit queue is full")]
    QueueFull,

    #[error("audit queue is closed")]
    Closed,

    #[error("audit sink failed: {0}")]
    Sink(String),
}

pub trait AuditSink: Send + Sync {
    fn log_action(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Writes each event as a structured `tracing` record.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log_action(&self, event: &AuditEvent) -> Result<(), AuditError> {
        info!(
            target: "txauth::audit",
            user = %event.user,
            action = event.action.as_str(),
            transaction_id = %event.transaction_id,
            valid = event.valid,
            reason = event.reason.map(ReasonCode::as_str),
            pq_key = event.pq_key_id.as_deref(),
            classical_key = event.classical_key_id.as_deref(),
            at = %event.at,
            "audit"
        );
        Ok(())
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn log_action(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Hand an event to a sink, logging and counting failures instead of
/// returning them.
pub(crate) fn emit(sink: &dyn AuditSink, failures: &AtomicU64, event: &AuditEvent) {
    if let Err(err) = sink.log_action(event) {
        failures.fetch_add(1, Ordering::Relaxed);
        warn!(
            user = %event.user,
            action = event.action.as_str(),
            %err,
            "audit sink rejected event"
        );
    }
}

#[derive(Debug, Default)]
struct DispatchStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Non-blocking front for a slow sink. Events go through a bounded queue to
/// a worker thread; a full queue drops the event rather than stalling the
/// caller.
pub struct AuditDispatcher {
    tx: Option<Sender<AuditEvent>>,
    worker: Option<JoinHandle<()>>,
    stats: Arc<DispatchStats>,
}

impl AuditDispatcher {
    pub fn new(sink: Arc<dyn AuditSink>, capacity: usize) -> Result<Self, AuditError> {
        let (tx, rx) = crossbeam_channel::bounded::<AuditEvent>(capacity.max(1));
        let stats = Arc::new(DispatchStats::default());
        let worker_stats = Arc::clone(&stats);
        let worker = thread::Builder::new()
            .name("audit-dispatch".to_string())
            .spawn(move || {
                for event in rx.iter() {
                    match sink.log_action(&event) {
                        Ok(()) => {
                            worker_stats.delivered.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            worker_stats.failed.fetch_add(1, Ordering::Relaxed);
                            error!(user = %event.user, %err, "audit sink failed");
                        }
                    }
                }
            })
            .map_err(|err| AuditError::Sink(err.to_string()))?;
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            stats,
        })
    }

    pub fn delivered(&self) -> u64 {
        self.stats.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }

    /// Close the queue and wait for queued events to drain.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("audit dispatch worker panicked");
            }
        }
    }
}

impl AuditSink for AuditDispatcher {
    fn log_action(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(AuditError::Closed);
        };
        match tx.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(AuditError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(AuditError::Closed)
            }
        }
    }
}

impl Drop for AuditDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}
