pub mod config;
pub mod delivery;
pub mod kernel;
pub mod providers;
pub mod services;
pub mod storage;

pub use config::AggregatorConfig;
pub use kernel::aggregator::SessionAggregator;
pub use kernel::event::{FlushTrigger, SceneEvent, SendOutcome};
pub use providers::{MetricsProvider, SceneCounters};
