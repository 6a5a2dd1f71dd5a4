use std::future::Future;

use super::error::DeliveryError;
use super::wire::WireSession;

/// Network seam of the delivery pipeline.
///
/// `deliver` resolves `Ok` only when the collector accepted the session
/// (2xx). Timeouts are applied by the pipeline around each call.
pub trait Transport: Send + Sync + 'static {
    fn deliver(
        &self,
        session: &WireSession,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;

    /// Lightweight reachability check against the collector.
    fn probe(&self) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}
