//! Scene tracking and session accumulation.
//!
//! Nothing here touches the network directly: the aggregator hands
//! immutable snapshot copies to the delivery pipeline.

pub mod aggregator;
pub mod event;
pub mod scene;
pub mod session;
pub mod totals;
