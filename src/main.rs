use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use playpulse::providers::PointsPerCorrect;
use playpulse::services::collector::HttpTransport;
use playpulse::storage::{FileStore, KeyValueStore};
use playpulse::{AggregatorConfig, SceneCounters, SceneEvent, SessionAggregator};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const FRAME_MS: u64 = 100;

/// Scripted host activity for the demo run.
enum Step {
    Scene(SceneEvent),
    Correct(&'static str),
    Wrong(&'static str),
    Score(&'static str, i64),
    /// Let the current scene run for this many frames.
    Play(u32),
    Complete,
}

/// Frames left to play in one scene.
struct PlayWindow {
    scene: &'static str,
    remaining: u32,
    elapsed: u32,
}

impl PlayWindow {
    /// `None` for an empty window.
    fn start(scene: &'static str, frames: u32) -> Option<Self> {
        (frames > 0).then_some(Self {
            scene,
            remaining: frames,
            elapsed: 0,
        })
    }

    /// Plays one frame. Returns false once the window is used up.
    fn advance(&mut self) -> bool {
        self.elapsed += 1;
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining > 0
    }

    fn elapsed_secs(&self, offset_frames: u32) -> f64 {
        f64::from(offset_frames + self.elapsed) * FRAME_MS as f64 / 1000.0
    }
}

fn demo_script() -> VecDeque<Step> {
    use Step::*;
    VecDeque::from(vec![
        Scene(SceneEvent::entered("MainMenu")),
        Scene(SceneEvent::exited("MainMenu")),
        Scene(SceneEvent::entered("MathGame")),
        Play(10),
        Correct("MathGame"),
        Score("MathGame", 10),
        Correct("MathGame"),
        Score("MathGame", 10),
        Wrong("MathGame"),
        Play(10),
        Correct("MathGame"),
        Score("MathGame", 10),
        Scene(SceneEvent::exited("MathGame")),
        Scene(SceneEvent::entered("WhackAMole")),
        Play(5),
        Correct("WhackAMole"),
        Score("WhackAMole", 5),
        Wrong("WhackAMole"),
        Play(5),
        Scene(SceneEvent::exited("WhackAMole")),
        Scene(SceneEvent::entered("PuzzleGame")),
        Play(8),
        Correct("PuzzleGame"),
        Scene(SceneEvent::exited("PuzzleGame")),
        Scene(SceneEvent::entered("MainMenu")),
        Complete,
    ])
}

fn load_config() -> Result<AggregatorConfig> {
    match std::env::args().nth(1) {
        Some(path) => AggregatorConfig::load(&PathBuf::from(path)),
        None => {
            let mut config = AggregatorConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config()?;
    tracing::info!(
        endpoint = config.active_endpoint(),
        store = %config.store_path.display(),
        "playpulse demo booting"
    );

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(config.store_path.clone())?);
    let transport = HttpTransport::new(config.active_endpoint(), config.connection_timeout());
    let mut aggregator = SessionAggregator::new(config, transport, store);
    let replay = aggregator.start_replay();

    // Each mini-game registers its own counters on startup.
    let mut games: HashMap<&'static str, SceneCounters> = HashMap::new();
    for scene in ["MathGame", "WhackAMole"] {
        let counters = SceneCounters::new();
        aggregator.register_metrics_provider(scene, Arc::new(counters.clone()));
        games.insert(scene, counters);
    }
    let puzzle = SceneCounters::new();
    let puzzle_provider = PointsPerCorrect::new(puzzle.clone(), 10);
    aggregator.register_metrics_provider("PuzzleGame", Arc::new(puzzle_provider));
    games.insert("PuzzleGame", puzzle);

    let mut script = demo_script();
    let mut playing: Option<PlayWindow> = None;
    let mut frames_in_scene = 0u32;

    let mut cadence = tokio::time::interval(Duration::from_millis(FRAME_MS));
    cadence.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!("demo session running; press Ctrl+C to stop early");

    loop {
        tokio::select! {
            _ = cadence.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                aggregator.on_suspend();
                break;
            }
        }

        aggregator.tick();

        if let Some(window) = playing.as_mut() {
            let more = window.advance();
            if let Some(counters) = games.get(window.scene) {
                counters.set_time_spent(window.elapsed_secs(frames_in_scene));
            }
            if !more {
                frames_in_scene += window.elapsed;
                playing = None;
            }
            continue;
        }

        let Some(step) = script.pop_front() else {
            break;
        };

        match step {
            Step::Scene(event) => {
                if let SceneEvent::Entered(name) = &event {
                    frames_in_scene = 0;
                    // Each visit starts from zero.
                    if let Some(counters) = games.get(name.as_str()) {
                        counters.reset();
                    }
                }
                aggregator.handle(event);
            }
            Step::Correct(scene) => {
                if let Some(counters) = games.get(scene) {
                    counters.record_correct();
                }
            }
            Step::Wrong(scene) => {
                if let Some(counters) = games.get(scene) {
                    counters.record_wrong();
                }
            }
            Step::Score(scene, points) => {
                if let Some(counters) = games.get(scene) {
                    counters.add_score(points);
                }
            }
            Step::Play(frames) => {
                if let Some(scene) = aggregator.tracker().open_scene_name() {
                    if let Some((name, _)) = games.get_key_value(scene) {
                        playing = PlayWindow::start(*name, frames);
                    }
                }
            }
            Step::Complete => {
                aggregator.log_stats();
                break;
            }
        }
    }

    let outcome = aggregator.shutdown().await;
    tracing::info!(?outcome, "final delivery resolved");

    replay.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_play_window_is_skipped() {
        assert!(PlayWindow::start("MathGame", 0).is_none());
    }

    #[test]
    fn test_play_window_counts_down() {
        let mut window = PlayWindow::start("MathGame", 2).unwrap();
        assert!(window.advance());
        assert!(!window.advance());
        assert!(!window.advance(), "stays exhausted");
        assert_eq!(window.remaining, 0);
        assert_eq!(window.elapsed_secs(0), 0.3);
    }
}
