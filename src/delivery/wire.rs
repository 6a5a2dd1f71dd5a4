//! Outbound document posted to the collector.
//!
//! Every float goes through [`finite_or_zero`] before it is written, so the
//! document never carries NaN or infinities.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::kernel::scene::SceneRecord;
use crate::kernel::session::SessionSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSession {
    pub player_name: String,
    pub session_id: String,
    pub session_start_time: String,
    pub session_end_time: String,
    pub total_game_time: f64,
    pub total_correct_answers: u64,
    pub total_wrong_answers: u64,
    pub total_score: i64,
    pub overall_accuracy: f64,
    pub game_version: String,
    pub session_completed: bool,
    pub scene_data_list: Vec<WireScene>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireScene {
    pub scene_name: String,
    pub correct_answers: u32,
    pub wrong_answers: u32,
    pub time_spent: f64,
    pub score: i64,
    pub scene_start_time: String,
    pub scene_end_time: String,
    pub completed: bool,
}

impl From<&SessionSnapshot> for WireSession {
    fn from(session: &SessionSnapshot) -> Self {
        let totals = session.totals();
        Self {
            player_name: session.player_name.clone(),
            session_id: session.session_id.to_string(),
            session_start_time: timestamp(session.started_at),
            session_end_time: timestamp(session.ended_at),
            total_game_time: round2(totals.time_spent),
            total_correct_answers: totals.correct_answers,
            total_wrong_answers: totals.wrong_answers,
            total_score: totals.score,
            overall_accuracy: round2(totals.accuracy),
            game_version: session.game_version.clone(),
            session_completed: session.completed,
            scene_data_list: session.scenes().iter().map(WireScene::from).collect(),
        }
    }
}

impl From<&SceneRecord> for WireScene {
    fn from(record: &SceneRecord) -> Self {
        Self {
            scene_name: record.scene_name.clone(),
            correct_answers: record.correct_answers,
            wrong_answers: record.wrong_answers,
            time_spent: round2(record.time_spent),
            score: record.score,
            scene_start_time: timestamp(record.started_at),
            scene_end_time: timestamp(record.ended_at.unwrap_or(record.started_at)),
            completed: record.completed,
        }
    }
}

impl WireSession {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Two decimal places, sanitized.
pub fn round2(value: f64) -> f64 {
    let rounded = (finite_or_zero(value) * 100.0).round() / 100.0;
    finite_or_zero(rounded)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
