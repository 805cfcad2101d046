use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, error, warn};

use super::{KeyVault, VaultSignature};
use crate::error::{KeyVaultError, Result};
use crate::types::{PublicKeyBundle, UserId};

pub const DEFAULT_VAULT_WORKERS: usize = 4;
pub const DEFAULT_VAULT_QUEUE: usize = 64;

struct Job<V> {
    operation: &'static str,
    deadline: Instant,
    run: Box<dyn FnOnce(&V) + Send>,
}

/// Bounds every call into a backend that may stall, such as a remote HSM.
///
/// Calls are queued to a fixed pool of worker threads. A caller waits at most
/// `timeout` for its answer and gets `Unavailable` after that, or at once
/// when the queue is full. Jobs whose caller already gave up are skipped, so
/// a timed-out call never takes effect later. A hung backend can hold at
/// most `workers` threads.
pub struct TimeoutVault<V> {
    jobs: Option<Sender<Job<V>>>,
    timeout: Duration,
    workers: usize,
}

impl<V> TimeoutVault<V>
where
    V: KeyVault + 'static,
{
    pub fn new(inner: Arc<V>, timeout: Duration) -> Result<Self> {
        Self::with_pool(inner, timeout, DEFAULT_VAULT_WORKERS, DEFAULT_VAULT_QUEUE)
    }

    pub fn with_pool(
        inner: Arc<V>,
        timeout: Duration,
        workers: usize,
        queue: usize,
    ) -> Result<Self> {
        let workers = workers.max(1);
        let (tx, rx) = crossbeam_channel::bounded::<Job<V>>(queue.max(1));
        for id in 0..workers {
            let rx = rx.clone();
            let inner = Arc::clone(&inner);
            thread::Builder::new()
                .name(format!("vault-worker-{id}"))
                .spawn(move || {
                    for job in rx.iter() {
                        if Instant::now() > job.deadline {
                            debug!(operation = job.operation, "skipping vault call past its deadline");
                            continue;
                        }
                        let run = job.run;
                        if panic::catch_unwind(AssertUnwindSafe(|| run(&*inner))).is_err() {
                            error!(operation = job.operation, "key vault backend panicked");
                        }
                    }
                })
                .map_err(|err| KeyVaultError::Unavailable {
                    operation: "start",
                    reason: err.to_string(),
                })?;
        }
        Ok(Self {
            jobs: Some(tx),
            timeout,
            workers,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    fn call<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&V) -> Result<T> + Send + 'static,
    {
        let unavailable = |reason: String| KeyVaultError::Unavailable { operation, reason };
        let Some(jobs) = self.jobs.as_ref() else {
            return Err(unavailable("vault closed".to_string()));
        };

        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let job = Job {
            operation,
            deadline: Instant::now() + self.timeout,
            run: Box::new(move |vault: &V| {
                let _ = reply_tx.send(f(vault));
            }),
        };
        match jobs.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(operation, "key vault queue full");
                return Err(unavailable("vault queue full".to_string()));
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(unavailable("vault workers exited".to_string()));
            }
        }

        match reply_rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(operation, timeout_ms = self.timeout.as_millis() as u64, "key vault timed out");
                Err(unavailable(format!(
                    "no answer within {} ms",
                    self.timeout.as_millis()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!(operation, "key vault worker dropped the call");
                Err(unavailable("worker exited without answering".to_string()))
            }
        }
    }
}

impl<V> Drop for TimeoutVault<V> {
    fn drop(&mut self) {
        // Idle workers exit once the queue closes. Hung ones are not joined.
        self.jobs.take();
    }
}

impl<V> KeyVault for TimeoutVault<V>
where
    V: KeyVault + 'static,
{
    fn generate(&self, user: UserId) -> Result<PublicKeyBundle> {
        self.call("generate", move |vault| vault.generate(user))
    }

    fn rotate(&self, user: UserId) -> Result<PublicKeyBundle> {
        self.call("rotate", move |vault| vault.rotate(user))
    }

    fn get_public_bundle(&self, user: UserId) -> Result<PublicKeyBundle> {
        self.call("get_public_bundle", move |vault| vault.get_public_bundle(user))
    }

    fn revoke(&self, user: UserId) -> Result<()> {
        self.call("revoke", move |vault| vault.revoke(user))
    }

    fn sign(&self, user: UserId, message: &[u8]) -> Result<VaultSignature> {
        let message = message.to_vec();
        self.call("sign", move |vault| vault.sign(user, &message))
    }
}
