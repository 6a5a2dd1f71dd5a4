use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::delivery::wire::finite_or_zero;
use crate::providers::{MetricsProvider, MetricsReading, ProviderRegistry};

/// Counters and bounds for one scene visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub scene_name: String,
    pub correct_answers: u32,
    pub wrong_answers: u32,
    pub score: i64,
    pub time_spent: f64,
    pub started_at: DateTime<Utc>,
    /// `None` while the record is open.
    pub ended_at: Option<DateTime<Utc>>,
    pub completed: bool,
}

impl SceneRecord {
    pub fn open(scene_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            scene_name: scene_name.into(),
            correct_answers: 0,
            wrong_answers: 0,
            score: 0,
            time_spent: 0.0,
            started_at: now,
            ended_at: None,
            completed: false,
        }
    }

    /// Overwrites the counters with absolute values. Never adds.
    /// Time spent is kept finite and non-negative.
    pub fn apply(&mut self, reading: MetricsReading) {
        self.correct_answers = reading.correct;
        self.wrong_answers = reading.wrong;
        self.score = reading.score;
        self.time_spent = finite_or_zero(reading.time_spent).max(0.0);
    }

    /// Finalizes the record. The end timestamp never precedes the start.
    pub fn close(&mut self, now: DateTime<Utc>) {
        self.ended_at = Some(now.max(self.started_at));
        self.completed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.ended_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ProviderLookup {
    Bound,
    RetryAt(Instant),
    Abandoned,
}

struct OpenScene {
    record: SceneRecord,
    lookup: ProviderLookup,
}

/// Keeps exactly one open [`SceneRecord`] in step with the host's current scene.
pub struct SceneTracker {
    game_scenes: HashSet<String>,
    registry: ProviderRegistry,
    open: Option<OpenScene>,
    provider_retry_delay: Duration,
}

impl SceneTracker {
    pub fn new<I, S>(game_scenes: I, provider_retry_delay: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            game_scenes: game_scenes.into_iter().map(Into::into).collect(),
            registry: ProviderRegistry::new(),
            open: None,
            provider_retry_delay,
        }
    }

    pub fn is_game_scene(&self, name: &str) -> bool {
        self.game_scenes.contains(name)
    }

    pub fn register_provider(&mut self, scene: &str, provider: Arc<dyn MetricsProvider>) {
        self.registry.register(scene, provider);
        if let Some(open) = self.open.as_mut() {
            if open.record.scene_name == scene {
                open.lookup = ProviderLookup::Bound;
            }
        }
    }

    pub fn unregister_provider(&mut self, scene: &str) -> bool {
        self.registry.unregister(scene).is_some()
    }

    /// Handles scene entry. Returns the previously open record, closed, when
    /// a different scene was open; the caller owns upserting it.
    ///
    /// Re-entering the scene that is already open changes nothing. Names
    /// outside the game-scene set close the previous record but open nothing.
    pub fn enter(&mut self, name: &str, now: DateTime<Utc>, clock: Instant) -> Option<SceneRecord> {
        if self.open_scene_name() == Some(name) {
            return None;
        }

        let closed = self.close_open(now);

        if self.is_game_scene(name) {
            let lookup = if self.registry.contains(name) {
                ProviderLookup::Bound
            } else {
                ProviderLookup::RetryAt(clock + self.provider_retry_delay)
            };
            debug!(scene = name, "opened scene record");
            self.open = Some(OpenScene {
                record: SceneRecord::open(name, now),
                lookup,
            });
        }

        closed
    }

    /// Returns whether `name` is the open scene. The record stays open.
    pub fn exit(&self, name: &str) -> bool {
        self.open_scene_name() == Some(name)
    }

    /// Refreshes the open record from its provider, if any.
    pub fn poll(&mut self, clock: Instant) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        let scene = open.record.scene_name.as_str();

        if let Some(provider) = self.registry.get(scene) {
            open.record.apply(MetricsReading::read(provider.as_ref()));
            open.lookup = ProviderLookup::Bound;
            return;
        }

        if let ProviderLookup::RetryAt(at) = open.lookup {
            if clock >= at {
                warn!(
                    scene = %scene,
                    "no metrics provider registered; counters stay at last value"
                );
                open.lookup = ProviderLookup::Abandoned;
            }
        }
    }

    /// Final poll, close and hand over the open record.
    pub fn close_open(&mut self, now: DateTime<Utc>) -> Option<SceneRecord> {
        let mut open = self.open.take()?;
        if let Some(provider) = self.registry.get(&open.record.scene_name) {
            open.record.apply(MetricsReading::read(provider.as_ref()));
        }
        open.record.close(now);
        Some(open.record)
    }

    pub fn open_record(&self) -> Option<&SceneRecord> {
        self.open.as_ref().map(|o| &o.record)
    }

    pub fn open_record_mut(&mut self) -> Option<&mut SceneRecord> {
        self.open.as_mut().map(|o| &mut o.record)
    }

    pub fn open_scene_name(&self) -> Option<&str> {
        self.open.as_ref().map(|o| o.record.scene_name.as_str())
    }

    /// True once discovery for the open scene has given up.
    pub fn provider_abandoned(&self) -> bool {
        matches!(
            self.open.as_ref().map(|o| o.lookup),
            Some(ProviderLookup::Abandoned)
        )
    }
}
