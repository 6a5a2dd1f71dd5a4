use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::event::{FlushTrigger, SceneEvent, SendOutcome};
use super::scene::SceneTracker;
use super::session::{SessionAccumulator, SessionSnapshot};
use super::totals::SessionTotals;
use crate::config::AggregatorConfig;
use crate::delivery::{
    DeliveryError, DeliveryOutcome, DeliveryPipeline, DeliverySettings, PersistentQueue,
    ReplayReport, Transport,
};
use crate::providers::MetricsProvider;
use crate::storage::KeyValueStore;

pub const PLAYER_NAME_KEY: &str = "player_name";

/// Live view of the open scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneStats {
    pub scene_name: String,
    pub correct_answers: u32,
    pub wrong_answers: u32,
    pub score: i64,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    pub session_id: Uuid,
    pub current_scene: Option<SceneStats>,
    pub totals: SessionTotals,
    pub queued_sessions: usize,
    pub delivery_attempts: u64,
}

/// Composition root of the telemetry core.
///
/// The host owns one instance, forwards scene transitions to it and calls
/// [`SessionAggregator::tick`] from its loop. Deliveries run as spawned
/// tasks, so every method here returns without waiting on the network
/// (except the explicitly async ones).
pub struct SessionAggregator<T: Transport> {
    config: AggregatorConfig,
    tracker: SceneTracker,
    session: SessionAccumulator,
    pipeline: DeliveryPipeline<T>,
    store: Arc<dyn KeyValueStore>,
    last_interval_send: Instant,
    completion_pending: bool,
    in_flight: Option<JoinHandle<DeliveryOutcome>>,
    replay_cancel: CancellationToken,
}

impl<T: Transport> SessionAggregator<T> {
    /// Builds the aggregator and loads the offline queue from `store`.
    pub fn new(config: AggregatorConfig, transport: T, store: Arc<dyn KeyValueStore>) -> Self {
        let player_name = resolve_player_name(&config, store.as_ref());
        let queue = PersistentQueue::load(Arc::clone(&store), config.max_offline_sessions);
        let pipeline = DeliveryPipeline::new(transport, queue, DeliverySettings::from(&config));
        let tracker = SceneTracker::new(
            config.game_scenes.iter().cloned(),
            config.provider_retry_delay(),
        );
        let session = SessionAccumulator::new(&player_name, &config.game_version);

        info!(
            session_id = %session.session_id(),
            player = %player_name,
            queued = pipeline.queued(),
            "session aggregator started"
        );

        Self {
            config,
            tracker,
            session,
            pipeline,
            store,
            last_interval_send: Instant::now(),
            completion_pending: false,
            in_flight: None,
            replay_cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &DeliveryPipeline<T> {
        &self.pipeline
    }

    pub fn tracker(&self) -> &SceneTracker {
        &self.tracker
    }

    pub fn session(&self) -> &SessionSnapshot {
        self.session.snapshot()
    }

    pub fn session_id(&self) -> Uuid {
        self.session.session_id()
    }

    pub fn is_sending(&self) -> bool {
        self.pipeline.is_sending()
    }

    pub fn player_name(&self) -> &str {
        &self.session.snapshot().player_name
    }

    pub fn register_metrics_provider(&mut self, scene: &str, provider: Arc<dyn MetricsProvider>) {
        debug!(scene, "metrics provider registered");
        self.tracker.register_provider(scene, provider);
    }

    pub fn unregister_metrics_provider(&mut self, scene: &str) -> bool {
        self.tracker.unregister_provider(scene)
    }

    pub fn handle(&mut self, event: SceneEvent) {
        debug!(scene = event.scene(), ?event, "scene event");
        match event {
            SceneEvent::Entered(name) => self.on_scene_entered(&name),
            SceneEvent::Exited(name) => {
                self.on_scene_exited(&name);
            }
        }
    }

    pub fn on_scene_entered(&mut self, name: &str) {
        if let Some(closed) = self.tracker.enter(name, chrono::Utc::now(), Instant::now()) {
            self.session.record_closed_scene(closed);
        }
        if !self.tracker.is_game_scene(name) {
            debug!(scene = name, "ignoring non-game scene");
        }
    }

    /// The open record stays open; a scene that reloads keeps its counters.
    pub fn on_scene_exited(&mut self, name: &str) -> SendOutcome {
        if !self.tracker.exit(name) {
            return SendOutcome::Skipped;
        }
        if !self.config.send_on_scene_change {
            return SendOutcome::Skipped;
        }
        self.flush(FlushTrigger::SceneChange)
    }

    /// Per-frame driver: polls the open scene, fires interval sends and
    /// retries a completion flush that arrived mid-send.
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.tracker.poll(now);

        if self.in_flight.as_ref().is_some_and(|h| h.is_finished()) {
            self.in_flight = None;
        }

        if self.completion_pending && !self.pipeline.is_sending() {
            self.completion_pending = false;
            self.flush(FlushTrigger::SessionEnd);
        }

        let interval_due =
            now.duration_since(self.last_interval_send) >= self.config.send_interval();
        if self.config.send_on_interval && interval_due {
            self.last_interval_send = now;
            self.flush(FlushTrigger::Interval);
        }
    }

    /// Recomputes totals and hands a copy to the pipeline. Coalesced into a
    /// no-op when a delivery is already in flight.
    pub fn flush(&mut self, trigger: FlushTrigger) -> SendOutcome {
        self.tracker.poll(Instant::now());
        if self.pipeline.is_sending() {
            debug!(?trigger, "delivery in flight; flush coalesced");
            return SendOutcome::Coalesced;
        }

        let snapshot = self.session.outgoing(self.tracker.open_record());
        match self.pipeline.send(snapshot) {
            Some(handle) => {
                debug!(?trigger, session_id = %self.session.session_id(), "flush started");
                self.in_flight = Some(handle);
                SendOutcome::Started
            }
            None => SendOutcome::Coalesced,
        }
    }

    pub fn send_session(&mut self) -> SendOutcome {
        self.flush(FlushTrigger::Manual)
    }

    /// Closes the open scene, marks the session completed and sends it.
    /// If a delivery is in flight the send is retried from `tick` once it
    /// resolves.
    pub fn complete_session_and_send(&mut self) -> SendOutcome {
        self.session.finalize_open_scene(&mut self.tracker);
        self.session.mark_completed();
        let outcome = self.flush(FlushTrigger::SessionEnd);
        if outcome == SendOutcome::Coalesced {
            self.completion_pending = true;
        }
        outcome
    }

    /// Host paused or lost focus.
    pub fn on_suspend(&mut self) -> SendOutcome {
        if !self.config.send_on_session_end {
            return SendOutcome::Skipped;
        }
        self.flush(FlushTrigger::Suspend)
    }

    /// Waits for the delivery started by the last flush, if any.
    pub async fn wait_for_delivery(&mut self) -> Option<DeliveryOutcome> {
        let handle = self.in_flight.take()?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(error = %e, "delivery task failed");
                None
            }
        }
    }

    /// Stops replays, waits out whatever holds the delivery slot, then
    /// completes and sends the session when `send_on_session_end` is set.
    ///
    /// A completed session that still cannot get the slot goes straight to
    /// the offline queue.
    pub async fn shutdown(&mut self) -> Option<DeliveryOutcome> {
        self.replay_cancel.cancel();
        self.wait_for_delivery().await;
        self.pipeline.wait_idle().await;
        self.completion_pending = false;

        if !self.config.send_on_session_end {
            self.session.finalize_open_scene(&mut self.tracker);
            return None;
        }

        let outcome = match self.complete_session_and_send() {
            SendOutcome::Started => self.wait_for_delivery().await,
            _ => {
                self.completion_pending = false;
                let snapshot = self.session.outgoing(None);
                Some(self.pipeline.store_offline(snapshot, 0))
            }
        };
        info!(session_id = %self.session.session_id(), ?outcome, "session aggregator stopped");
        outcome
    }

    /// Startup replay: grace delay, probe, then drain the offline queue.
    pub fn start_replay(&self) -> JoinHandle<ReplayReport> {
        let pipeline = self.pipeline.clone();
        let grace = self.config.replay_grace();
        let cancel = self.replay_cancel.child_token();
        tokio::spawn(async move { pipeline.replay_when_online(grace, cancel).await })
    }

    /// Host-confirmed connectivity: drain the queue without probing.
    /// Stopped between entries by [`SessionAggregator::shutdown`].
    pub fn notify_connectivity_restored(&self) -> JoinHandle<ReplayReport> {
        let pipeline = self.pipeline.clone();
        let cancel = self.replay_cancel.child_token();
        tokio::spawn(async move { pipeline.replay_queue(&cancel).await })
    }

    /// Probes the active endpoint and logs remediation hints on failure.
    pub async fn test_connection(&self) -> Result<(), DeliveryError> {
        let endpoint = self.config.active_endpoint();
        info!(endpoint, "testing collector connection");
        match self.pipeline.probe().await {
            Ok(()) => {
                info!(endpoint, "collector reachable");
                Ok(())
            }
            Err(e) => {
                warn!(endpoint, error = %e, "collector connection failed");
                for hint in e.hints() {
                    warn!(hint, "connection troubleshooting");
                }
                Err(e)
            }
        }
    }

    /// Starts a fresh session for the current player. The open scene, if
    /// any, stays open and lands in the new session when it closes.
    pub fn reset_session(&mut self) {
        let player = self.session.snapshot().player_name.clone();
        self.session.initialize_session(&player);
        self.completion_pending = false;
        self.last_interval_send = Instant::now();
    }

    pub fn set_player_name(&mut self, name: &str) {
        self.session.set_player_name(name);
        self.config.player_name = name.to_string();
        if let Err(e) = self.store.set(PLAYER_NAME_KEY, name) {
            warn!(error = %e, "failed to persist player name");
        }
    }

    /// Manual counters for games without a provider. A registered provider
    /// overwrites these on its next poll.
    pub fn record_correct(&mut self, count: u32) {
        if let Some(record) = self.tracker.open_record_mut() {
            record.correct_answers = record.correct_answers.saturating_add(count);
        }
    }

    pub fn record_wrong(&mut self, count: u32) {
        if let Some(record) = self.tracker.open_record_mut() {
            record.wrong_answers = record.wrong_answers.saturating_add(count);
        }
    }

    pub fn add_score(&mut self, points: i64) {
        if let Some(record) = self.tracker.open_record_mut() {
            record.score = record.score.saturating_add(points);
        }
    }

    pub fn stats(&mut self) -> SessionStats {
        self.tracker.poll(Instant::now());
        let now = chrono::Utc::now();
        let current_scene = self.tracker.open_record().map(|record| SceneStats {
            scene_name: record.scene_name.clone(),
            correct_answers: record.correct_answers,
            wrong_answers: record.wrong_answers,
            score: record.score,
            elapsed_secs: (now - record.started_at).num_milliseconds().max(0) as f64 / 1000.0,
        });

        SessionStats {
            session_id: self.session.session_id(),
            current_scene,
            totals: self.session.recompute_totals(),
            queued_sessions: self.pipeline.queued(),
            delivery_attempts: self.pipeline.attempts_made(),
        }
    }

    pub fn log_stats(&mut self) {
        let stats = self.stats();
        if let Some(scene) = &stats.current_scene {
            info!(
                scene = %scene.scene_name,
                correct = scene.correct_answers,
                wrong = scene.wrong_answers,
                score = scene.score,
                elapsed_secs = scene.elapsed_secs,
                "current scene"
            );
        }
        info!(
            session_id = %stats.session_id,
            correct = stats.totals.correct_answers,
            wrong = stats.totals.wrong_answers,
            score = stats.totals.score,
            accuracy = stats.totals.accuracy,
            queued = stats.queued_sessions,
            attempts = stats.delivery_attempts,
            "session totals"
        );
    }
}

/// Configured name, then the persisted one, then a generated fallback.
fn resolve_player_name(config: &AggregatorConfig, store: &dyn KeyValueStore) -> String {
    if !config.player_name.trim().is_empty() {
        return config.player_name.clone();
    }
    match store.get(PLAYER_NAME_KEY) {
        Ok(Some(name)) if !name.trim().is_empty() => name,
        Ok(_) => generated_player_name(),
        Err(e) => {
            warn!(error = %e, "failed to read persisted player name");
            generated_player_name()
        }
    }
}

fn generated_player_name() -> String {
    let suffix = Uuid::new_v4().as_u128() % 9000 + 1000;
    format!("Player{suffix}")
}
