use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("collector unreachable: {0}")]
    Unreachable(String),
    #[error("http transport failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("collector rejected session with status {status}")]
    Rejected { status: u16 },
    #[error("could not encode session: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DeliveryError {
    /// True when the collector answered but refused the payload.
    pub fn is_rejection(&self) -> bool {
        matches!(self, DeliveryError::Rejected { .. })
    }

    /// Operator hints for a failed connection test.
    pub fn hints(&self) -> Vec<&'static str> {
        let mut hints = Vec::new();
        match self {
            DeliveryError::Http(e) if e.is_timeout() => {
                hints.push("the collector is slow to answer; raise connection_timeout_secs");
            }
            DeliveryError::Unreachable(_) => {
                hints.push("check the endpoint url and that the collector is running");
                hints.push("a firewall or proxy may be blocking outbound requests");
                hints.push("check network connectivity and DNS resolution");
            }
            DeliveryError::Timeout(_) => {
                hints.push("the collector is slow to answer; raise connection_timeout_secs");
            }
            DeliveryError::Rejected { status } if *status == 404 => {
                hints.push("the endpoint path is wrong; check endpoint_url");
            }
            DeliveryError::Rejected { status } if *status >= 500 => {
                hints.push("the collector is failing; sessions will be queued offline");
            }
            _ => {}
        }
        hints.push("keep save_offline_data enabled so sessions survive outages");
        hints
    }
}
