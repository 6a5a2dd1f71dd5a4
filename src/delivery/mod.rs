//! Getting session snapshots to the remote collector.
//!
//! Delivery never fails loudly: exhausted retries land in the durable
//! offline queue, which is replayed when connectivity comes back.

pub mod error;
pub mod pipeline;
pub mod queue;
pub mod transport;
pub mod wire;

pub use error::DeliveryError;
pub use pipeline::{
    DeliveryOutcome, DeliveryPhase, DeliveryPipeline, DeliverySettings, ReplayReport, ReplayStop,
};
pub use queue::{OfflineQueue, PersistentQueue, OFFLINE_QUEUE_KEY};
pub use transport::Transport;
pub use wire::{WireScene, WireSession};
