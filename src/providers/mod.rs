//! Scene metrics providers.
//!
//! Each mini-game exposes its live counters through [`MetricsProvider`] and
//! registers itself by scene name. The aggregator only ever reads: it never
//! writes back into game state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Read-only view of one scene's current counters.
///
/// Values are absolute, not deltas. `time_spent` is seconds in the scene and
/// must not decrease while the scene is open.
pub trait MetricsProvider: Send + Sync {
    fn correct_answers(&self) -> u32;
    fn wrong_answers(&self) -> u32;
    fn score(&self) -> i64;
    fn time_spent(&self) -> f64;
}

/// Current counters read from a provider in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricsReading {
    pub correct: u32,
    pub wrong: u32,
    pub score: i64,
    pub time_spent: f64,
}

impl MetricsReading {
    pub fn read(provider: &dyn MetricsProvider) -> Self {
        Self {
            correct: provider.correct_answers(),
            wrong: provider.wrong_answers(),
            score: provider.score(),
            time_spent: provider.time_spent(),
        }
    }
}

/// Scene name -> provider lookup. At most one provider per scene.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn MetricsProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider` for `scene`, replacing any previous one.
    pub fn register(&mut self, scene: impl Into<String>, provider: Arc<dyn MetricsProvider>) {
        self.providers.insert(scene.into(), provider);
    }

    pub fn unregister(&mut self, scene: &str) -> Option<Arc<dyn MetricsProvider>> {
        self.providers.remove(scene)
    }

    pub fn get(&self, scene: &str) -> Option<&Arc<dyn MetricsProvider>> {
        self.providers.get(scene)
    }

    pub fn contains(&self, scene: &str) -> bool {
        self.providers.contains_key(scene)
    }
}

#[derive(Debug, Default)]
struct CounterCells {
    correct: AtomicU32,
    wrong: AtomicU32,
    score: AtomicI64,
    // f64 bits
    time_spent: AtomicU64,
}

/// Shared counter block a mini-game owns and bumps as the player plays.
///
/// Clones share the same cells, so the game keeps one handle and registers
/// another with the aggregator.
#[derive(Debug, Clone, Default)]
pub struct SceneCounters {
    cells: Arc<CounterCells>,
}

impl SceneCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_correct(&self) {
        self.cells.correct.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wrong(&self) {
        self.cells.wrong.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_score(&self, points: i64) {
        self.cells.score.fetch_add(points, Ordering::Relaxed);
    }

    /// Sets elapsed seconds. Smaller values than the current one are ignored.
    pub fn set_time_spent(&self, seconds: f64) {
        if !seconds.is_finite() {
            return;
        }
        let _ = self
            .cells
            .time_spent
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                (seconds > f64::from_bits(bits)).then(|| seconds.to_bits())
            });
    }

    pub fn reset(&self) {
        self.cells.correct.store(0, Ordering::Relaxed);
        self.cells.wrong.store(0, Ordering::Relaxed);
        self.cells.score.store(0, Ordering::Relaxed);
        self.cells.time_spent.store(0f64.to_bits(), Ordering::Relaxed);
    }
}

impl MetricsProvider for SceneCounters {
    fn correct_answers(&self) -> u32 {
        self.cells.correct.load(Ordering::Relaxed)
    }

    fn wrong_answers(&self) -> u32 {
        self.cells.wrong.load(Ordering::Relaxed)
    }

    fn score(&self) -> i64 {
        self.cells.score.load(Ordering::Relaxed)
    }

    fn time_spent(&self) -> f64 {
        f64::from_bits(self.cells.time_spent.load(Ordering::Relaxed))
    }
}

/// Adapter for games that only count answers: score is `correct * points`
/// and time spent is always reported as zero.
pub struct PointsPerCorrect<P> {
    inner: P,
    points: i64,
}

impl<P: MetricsProvider> PointsPerCorrect<P> {
    pub fn new(inner: P, points: i64) -> Self {
        Self { inner, points }
    }
}

impl<P: MetricsProvider> MetricsProvider for PointsPerCorrect<P> {
    fn correct_answers(&self) -> u32 {
        self.inner.correct_answers()
    }

    fn wrong_answers(&self) -> u32 {
        self.inner.wrong_answers()
    }

    fn score(&self) -> i64 {
        i64::from(self.inner.correct_answers()) * self.points
    }

    fn time_spent(&self) -> f64 {
        0.0
    }
}
