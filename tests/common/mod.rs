#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use playpulse::delivery::{DeliveryError, DeliverySettings, Transport, WireSession};
use playpulse::kernel::scene::SceneRecord;
use playpulse::kernel::session::SessionSnapshot;
use playpulse::providers::MetricsProvider;
use playpulse::storage::{KeyValueStore, StoreError};
use tokio::sync::Notify;

#[derive(Default)]
struct Script {
    attempts: AtomicU32,
    probes: AtomicU32,
    fail_next: AtomicU32,
    always_fail: AtomicBool,
    hang: AtomicBool,
    probe_fails: AtomicBool,
    reject_status: Mutex<Option<u16>>,
    gate: Mutex<Option<Arc<Notify>>>,
    delivered: Mutex<Vec<WireSession>>,
}

/// Transport whose behaviour is scripted per test. Clones share state.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let t = Self::default();
        t.script.always_fail.store(true, Ordering::SeqCst);
        t
    }

    pub fn fail_next(&self, n: u32) {
        self.script.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn set_always_fail(&self, fail: bool) {
        self.script.always_fail.store(fail, Ordering::SeqCst);
    }

    pub fn reject_with(&self, status: u16) {
        *self.script.reject_status.lock().unwrap() = Some(status);
    }

    pub fn hang(&self) {
        self.script.hang.store(true, Ordering::SeqCst);
    }

    pub fn fail_probes(&self) {
        self.script.probe_fails.store(true, Ordering::SeqCst);
    }

    /// Every delivery waits for one `notify_one` on the returned gate.
    pub fn gated(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.script.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn attempts(&self) -> u32 {
        self.script.attempts.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> u32 {
        self.script.probes.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<WireSession> {
        self.script.delivered.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    async fn deliver(&self, session: &WireSession) -> Result<(), DeliveryError> {
        self.script.attempts.fetch_add(1, Ordering::SeqCst);

        let gate = self.script.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.script.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        if self.script.always_fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Unreachable("scripted outage".into()));
        }
        let pending = self.script.fail_next.load(Ordering::SeqCst);
        if pending > 0 {
            self.script.fail_next.store(pending - 1, Ordering::SeqCst);
            return Err(DeliveryError::Unreachable("scripted outage".into()));
        }
        let rejection = *self.script.reject_status.lock().unwrap();
        if let Some(status) = rejection {
            return Err(DeliveryError::Rejected { status });
        }

        self.script.delivered.lock().unwrap().push(session.clone());
        Ok(())
    }

    async fn probe(&self) -> Result<(), DeliveryError> {
        self.script.probes.fetch_add(1, Ordering::SeqCst);
        if self.script.probe_fails.load(Ordering::SeqCst) {
            Err(DeliveryError::Unreachable("scripted probe failure".into()))
        } else {
            Ok(())
        }
    }
}

/// Store whose writes always fail; reads see nothing.
pub struct BrokenStore;

impl KeyValueStore for BrokenStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "quota exceeded")))
    }

    fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "quota exceeded")))
    }
}

/// Fixed counters.
pub struct FixedProvider {
    pub correct: u32,
    pub wrong: u32,
    pub score: i64,
    pub time: f64,
}

impl MetricsProvider for FixedProvider {
    fn correct_answers(&self) -> u32 {
        self.correct
    }
    fn wrong_answers(&self) -> u32 {
        self.wrong
    }
    fn score(&self) -> i64 {
        self.score
    }
    fn time_spent(&self) -> f64 {
        self.time
    }
}

pub fn settings() -> DeliverySettings {
    DeliverySettings {
        max_attempts: 3,
        retry_delay: Duration::from_secs(5),
        attempt_timeout: Duration::from_secs(30),
        save_offline: true,
        probe_timeout: Duration::from_secs(10),
        replay_spacing: Duration::from_secs(1),
    }
}

pub fn session(player: &str) -> SessionSnapshot {
    SessionSnapshot::new(player, "1.0.0", Utc::now())
}

pub fn session_with_scene(player: &str, scene: &str, correct: u32) -> SessionSnapshot {
    let mut snapshot = session(player);
    let mut record = SceneRecord::open(scene, Utc::now());
    record.correct_answers = correct;
    record.close(Utc::now());
    snapshot.upsert_scene(record);
    snapshot.recompute_totals(Utc::now());
    snapshot
}

pub fn temp_path(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("playpulse_{tag}_{}.json", uuid::Uuid::new_v4()))
}
