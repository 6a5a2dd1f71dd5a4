use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::scene::{SceneRecord, SceneTracker};
use super::totals::{compute_totals, SessionTotals};

/// One play session: identity, closed scene records and derived totals.
///
/// Totals are only ever written by [`SessionSnapshot::recompute_totals`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub player_name: String,
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub game_version: String,
    pub completed: bool,
    scenes: Vec<SceneRecord>,
    totals: SessionTotals,
}

impl SessionSnapshot {
    pub fn new(
        player_name: impl Into<String>,
        game_version: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            player_name: player_name.into(),
            session_id: Uuid::new_v4(),
            started_at: now,
            ended_at: now,
            game_version: game_version.into(),
            completed: false,
            scenes: Vec::new(),
            totals: SessionTotals::default(),
        }
    }

    /// Inserts `record`, replacing any record with the same scene name.
    /// The replacement moves to the end (chronological order of closing).
    pub fn upsert_scene(&mut self, record: SceneRecord) {
        self.scenes.retain(|s| s.scene_name != record.scene_name);
        self.scenes.push(record);
    }

    pub fn recompute_totals(&mut self, now: DateTime<Utc>) -> &SessionTotals {
        self.totals = compute_totals(&self.scenes);
        self.ended_at = now.max(self.started_at);
        &self.totals
    }

    pub fn scenes(&self) -> &[SceneRecord] {
        &self.scenes
    }

    pub fn scene(&self, name: &str) -> Option<&SceneRecord> {
        self.scenes.iter().find(|s| s.scene_name == name)
    }

    pub fn totals(&self) -> &SessionTotals {
        &self.totals
    }
}

/// Owns the live [`SessionSnapshot`] for the current run.
pub struct SessionAccumulator {
    snapshot: SessionSnapshot,
}

impl SessionAccumulator {
    pub fn new(player_name: &str, game_version: &str) -> Self {
        Self {
            snapshot: SessionSnapshot::new(player_name, game_version, Utc::now()),
        }
    }

    /// Starts a fresh session: new id, new start time, no scenes.
    pub fn initialize_session(&mut self, player_name: &str) {
        let version = std::mem::take(&mut self.snapshot.game_version);
        self.snapshot = SessionSnapshot::new(player_name, version, Utc::now());
        info!(session_id = %self.snapshot.session_id, player = player_name, "started new session");
    }

    /// Closes the tracker's open record (final poll included) and upserts it.
    /// Returns false when nothing was open.
    pub fn finalize_open_scene(&mut self, tracker: &mut SceneTracker) -> bool {
        match tracker.close_open(Utc::now()) {
            Some(record) => {
                self.record_closed_scene(record);
                true
            }
            None => false,
        }
    }

    pub fn record_closed_scene(&mut self, record: SceneRecord) {
        debug_assert!(record.is_closed());
        info!(
            scene = %record.scene_name,
            correct = record.correct_answers,
            wrong = record.wrong_answers,
            score = record.score,
            "scene closed"
        );
        self.snapshot.upsert_scene(record);
    }

    /// Idempotent: a second call without new records yields the same totals.
    pub fn recompute_totals(&mut self) -> SessionTotals {
        *self.snapshot.recompute_totals(Utc::now())
    }

    /// Advisory only. Later scene records are still aggregated.
    pub fn mark_completed(&mut self) {
        self.snapshot.completed = true;
    }

    pub fn set_player_name(&mut self, name: &str) {
        self.snapshot.player_name = name.to_string();
    }

    /// Immutable copy for delivery. An open scene is included provisionally
    /// (not completed, end = now) without closing it in the tracker.
    pub fn outgoing(&mut self, open: Option<&SceneRecord>) -> SessionSnapshot {
        let now = Utc::now();
        self.snapshot.recompute_totals(now);

        let mut copy = self.snapshot.clone();
        if let Some(record) = open {
            let mut provisional = record.clone();
            provisional.ended_at = Some(now.max(provisional.started_at));
            copy.upsert_scene(provisional);
            copy.recompute_totals(now);
        }
        copy
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    pub fn session_id(&self) -> Uuid {
        self.snapshot.session_id
    }
}
