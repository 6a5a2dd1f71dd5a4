use serde::{Deserialize, Serialize};

/// Scene-transition signal reported by the host engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SceneEvent {
    Entered(String),
    Exited(String),
}

impl SceneEvent {
    pub fn entered(name: &str) -> Self {
        SceneEvent::Entered(name.to_string())
    }

    pub fn exited(name: &str) -> Self {
        SceneEvent::Exited(name.to_string())
    }

    pub fn scene(&self) -> &str {
        match self {
            SceneEvent::Entered(name) | SceneEvent::Exited(name) => name,
        }
    }
}

/// Why a session flush was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlushTrigger {
    /// Caller asked for a send.
    Manual,
    /// `send_interval_secs` elapsed.
    Interval,
    /// A game scene was exited.
    SceneChange,
    /// Session marked completed.
    SessionEnd,
    /// Host process paused or lost focus.
    Suspend,
}

/// What happened to a flush request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// A delivery task was spawned.
    Started,
    /// A delivery was already in flight; this request was a no-op.
    Coalesced,
    /// The trigger is disabled by config.
    Skipped,
}
