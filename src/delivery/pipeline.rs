use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::DeliveryError;
use super::queue::PersistentQueue;
use super::transport::Transport;
use super::wire::WireSession;
use crate::config::AggregatorConfig;
use crate::kernel::session::SessionSnapshot;

#[derive(Debug, Clone, PartialEq)]
pub struct DeliverySettings {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub attempt_timeout: Duration,
    pub save_offline: bool,
    pub probe_timeout: Duration,
    pub replay_spacing: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self::from(&AggregatorConfig::default())
    }
}

impl From<&AggregatorConfig> for DeliverySettings {
    fn from(config: &AggregatorConfig) -> Self {
        Self {
            max_attempts: config.max_retry_attempts.max(1),
            retry_delay: config.retry_delay(),
            attempt_timeout: config.connection_timeout(),
            save_offline: config.save_offline_data,
            probe_timeout: config.replay_probe_timeout(),
            replay_spacing: config.replay_spacing(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPhase {
    Idle,
    Sending { attempt: u32 },
    Retrying { attempt: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    /// Retries exhausted; the snapshot went to the offline queue.
    Queued { attempts: u32, evicted: Vec<Uuid> },
    /// Retries exhausted with offline storage disabled.
    Dropped { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStop {
    /// The front entry failed; it stays queued.
    Failed,
    /// Another delivery held the flight permit.
    Busy,
    /// The connectivity probe failed.
    Offline,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub delivered: usize,
    pub remaining: usize,
    pub stopped: Option<ReplayStop>,
}

/// Exclusive right to run one delivery. Returns the pipeline to `Idle` on drop.
pub struct FlightPermit {
    phase: Arc<Mutex<DeliveryPhase>>,
    idle: Arc<Notify>,
}

impl FlightPermit {
    fn set(&self, phase: DeliveryPhase) {
        *lock(&self.phase) = phase;
    }
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        *lock(&self.phase) = DeliveryPhase::Idle;
        self.idle.notify_waiters();
    }
}

/// Retry/backoff delivery with an offline fallback and single-flight guard.
///
/// Cloning is cheap and every clone shares the same queue and flight state.
pub struct DeliveryPipeline<T> {
    transport: Arc<T>,
    queue: Arc<Mutex<PersistentQueue>>,
    phase: Arc<Mutex<DeliveryPhase>>,
    idle: Arc<Notify>,
    attempts_made: Arc<AtomicU64>,
    settings: DeliverySettings,
}

impl<T> Clone for DeliveryPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            queue: Arc::clone(&self.queue),
            phase: Arc::clone(&self.phase),
            idle: Arc::clone(&self.idle),
            attempts_made: Arc::clone(&self.attempts_made),
            settings: self.settings.clone(),
        }
    }
}

impl<T: Transport> DeliveryPipeline<T> {
    pub fn new(transport: T, queue: PersistentQueue, settings: DeliverySettings) -> Self {
        Self {
            transport: Arc::new(transport),
            queue: Arc::new(Mutex::new(queue)),
            phase: Arc::new(Mutex::new(DeliveryPhase::Idle)),
            idle: Arc::new(Notify::new()),
            attempts_made: Arc::new(AtomicU64::new(0)),
            settings,
        }
    }

    pub fn phase(&self) -> DeliveryPhase {
        *lock(&self.phase)
    }

    pub fn is_sending(&self) -> bool {
        self.phase() != DeliveryPhase::Idle
    }

    /// Network attempts made over the pipeline's lifetime, probes excluded.
    pub fn attempts_made(&self) -> u64 {
        self.attempts_made.load(Ordering::Relaxed)
    }

    pub fn queued(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn queued_sessions(&self) -> Vec<SessionSnapshot> {
        lock(&self.queue).queue().iter().cloned().collect()
    }

    /// Claims the single delivery slot, or `None` if a delivery is in flight.
    pub fn try_acquire(&self) -> Option<FlightPermit> {
        let mut phase = lock(&self.phase);
        if *phase != DeliveryPhase::Idle {
            return None;
        }
        *phase = DeliveryPhase::Sending { attempt: 0 };
        Some(FlightPermit {
            phase: Arc::clone(&self.phase),
            idle: Arc::clone(&self.idle),
        })
    }

    /// Resolves once no delivery holds the flight permit.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_sending() {
                return;
            }
            notified.await;
        }
    }

    /// Spawns delivery of `snapshot`. `None` means a delivery was already in
    /// flight and this call was coalesced away.
    pub fn send(&self, snapshot: SessionSnapshot) -> Option<JoinHandle<DeliveryOutcome>> {
        let permit = self.try_acquire()?;
        let pipeline = self.clone();
        Some(tokio::spawn(async move { pipeline.deliver(permit, snapshot).await }))
    }

    /// Runs the retry loop for `snapshot` under `permit`.
    pub async fn deliver(
        &self,
        permit: FlightPermit,
        snapshot: SessionSnapshot,
    ) -> DeliveryOutcome {
        let wire = WireSession::from(&snapshot);
        let max_attempts = self.settings.max_attempts;
        let mut attempt = 0;

        while attempt < max_attempts {
            attempt += 1;
            permit.set(DeliveryPhase::Sending { attempt });

            match self.attempt(&wire).await {
                Ok(()) => {
                    // Queued copies of this session are older than what was just sent.
                    let stale = lock(&self.queue).remove_session(snapshot.session_id);
                    info!(
                        session_id = %snapshot.session_id,
                        attempt,
                        stale,
                        "session delivered"
                    );
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Err(e) => {
                    warn!(
                        session_id = %snapshot.session_id,
                        attempt,
                        max_attempts,
                        rejected = e.is_rejection(),
                        error = %e,
                        "delivery attempt failed"
                    );
                }
            }

            if attempt < max_attempts {
                permit.set(DeliveryPhase::Retrying { attempt });
                tokio::time::sleep(self.settings.retry_delay).await;
            }
        }

        self.store_offline(snapshot, attempt)
    }

    /// Fallback for a snapshot that could not be delivered after `attempts`
    /// network attempts: queued when offline storage is enabled, else dropped.
    pub fn store_offline(&self, snapshot: SessionSnapshot, attempts: u32) -> DeliveryOutcome {
        let session_id = snapshot.session_id;
        if !self.settings.save_offline {
            warn!(
                session_id = %session_id,
                attempts,
                "offline storage disabled; dropping session"
            );
            return DeliveryOutcome::Dropped { attempts };
        }

        let (evicted, queued) = {
            let mut queue = lock(&self.queue);
            let evicted = queue.enqueue(snapshot);
            (evicted, queue.len())
        };
        warn!(session_id = %session_id, attempts, queued, "session queued offline");
        DeliveryOutcome::Queued { attempts, evicted }
    }

    /// One bounded network attempt. A timeout counts as a failure.
    async fn attempt(&self, wire: &WireSession) -> Result<(), DeliveryError> {
        self.attempts_made.fetch_add(1, Ordering::Relaxed);
        let timeout = self.settings.attempt_timeout;
        match tokio::time::timeout(timeout, self.transport.deliver(wire)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(timeout)),
        }
    }

    /// Probe with the configured probe timeout.
    pub async fn probe(&self) -> Result<(), DeliveryError> {
        let timeout = self.settings.probe_timeout;
        match tokio::time::timeout(timeout, self.transport.probe()).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(timeout)),
        }
    }

    /// Drains the offline queue front to back, one attempt per entry,
    /// stopping at the first failure so order is preserved. `cancel` is
    /// checked before each entry; an attempt already running is not aborted.
    pub async fn replay_queue(&self, cancel: &CancellationToken) -> ReplayReport {
        let mut delivered = 0;
        let mut stopped = None;

        loop {
            if cancel.is_cancelled() {
                stopped = Some(ReplayStop::Cancelled);
                break;
            }
            let Some(next) = lock(&self.queue).front().cloned() else {
                break;
            };
            let Some(permit) = self.try_acquire() else {
                debug!("replay paused; a delivery is in flight");
                stopped = Some(ReplayStop::Busy);
                break;
            };
            permit.set(DeliveryPhase::Sending { attempt: 1 });
            let result = self.attempt(&WireSession::from(&next)).await;

            match result {
                Ok(()) => {
                    let remaining = {
                        let mut queue = lock(&self.queue);
                        queue.remove_delivered(next.session_id);
                        queue.len()
                    };
                    drop(permit);
                    delivered += 1;
                    info!(session_id = %next.session_id, remaining, "offline session delivered");
                    if remaining == 0 {
                        break;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.settings.replay_spacing) => {}
                    }
                }
                Err(e) => {
                    warn!(
                        session_id = %next.session_id,
                        error = %e,
                        "offline replay failed; will retry later"
                    );
                    stopped = Some(ReplayStop::Failed);
                    break;
                }
            }
        }

        ReplayReport {
            delivered,
            remaining: self.queued(),
            stopped,
        }
    }

    /// Waits `grace`, probes the collector and replays the queue if it
    /// answers. Cancellation during the wait or the probe ends the task.
    pub async fn replay_when_online(
        &self,
        grace: Duration,
        cancel: CancellationToken,
    ) -> ReplayReport {
        tokio::select! {
            _ = cancel.cancelled() => return self.stopped_report(ReplayStop::Cancelled),
            _ = tokio::time::sleep(grace) => {}
        }

        let probe = tokio::select! {
            _ = cancel.cancelled() => return self.stopped_report(ReplayStop::Cancelled),
            result = self.probe() => result,
        };

        match probe {
            Ok(()) => {
                info!(queued = self.queued(), "collector reachable; replaying offline sessions");
                self.replay_queue(&cancel).await
            }
            Err(e) => {
                warn!(error = %e, "collector unreachable; running offline");
                self.stopped_report(ReplayStop::Offline)
            }
        }
    }

    fn stopped_report(&self, stop: ReplayStop) -> ReplayReport {
        ReplayReport {
            delivered: 0,
            remaining: self.queued(),
            stopped: Some(stop),
        }
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
