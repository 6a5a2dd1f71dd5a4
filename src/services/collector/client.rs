use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use tracing::debug;

use crate::delivery::{DeliveryError, Transport, WireSession};

/// Posts session documents to the collector over HTTP.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout) // Network-level bound; the pipeline adds its own.
                .build()
                .unwrap_or_default(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    async fn deliver(&self, session: &WireSession) -> Result<(), DeliveryError> {
        let body = session.to_json()?;
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %body, "collector accepted session");
        Ok(())
    }

    /// Any answer below 500 counts as reachable: collectors commonly refuse
    /// GET on a POST route.
    async fn probe(&self) -> Result<(), DeliveryError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(classify)?;
        let status = response.status();
        if !status.is_server_error() {
            Ok(())
        } else {
            Err(DeliveryError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

/// Connection-level failures mean the collector is not reachable at all.
fn classify(error: reqwest::Error) -> DeliveryError {
    if error.is_connect() {
        DeliveryError::Unreachable(error.to_string())
    } else {
        DeliveryError::Http(error)
    }
}
