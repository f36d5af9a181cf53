//! Outbound HTTP invocation
//!
//! One request per scenario per server. Any status in `[100, 599]` is a
//! captured result; only transport failures are errors.

use crate::config::HttpConfig;
use crate::error::TransportError;
use crate::generate::RenderedRequest;
use crate::types::{ScenarioCoordinates, ScenarioId};
use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::{Client, Method};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Status codes accepted as a captured response
pub const VALID_STATUS_RANGE: std::ops::RangeInclusive<u16> = 100..=599;

/// A concrete request, ready to send to one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundRequest {
    pub server: String,
    pub method: String,
    pub url: String,
    pub headers: IndexMap<String, String>,
}

impl OutboundRequest {
    pub fn new(server: &str, coordinates: &ScenarioCoordinates, rendered: &RenderedRequest) -> Self {
        Self {
            server: server.to_string(),
            method: coordinates.method.to_uppercase(),
            url: format!("{}{}", server, rendered.path),
            headers: rendered.headers.clone(),
        }
    }
}

/// Response observed for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedResponse {
    pub server: String,
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub body: String,
}

/// Captured responses per scenario, one per server in server order
pub type ResponseIndex = IndexMap<ScenarioId, Vec<CapturedResponse>>;

/// Sends scenario requests
#[async_trait]
pub trait RequestInvoker: Send + Sync {
    async fn invoke(&self, request: &OutboundRequest) -> Result<CapturedResponse, TransportError>;
}

fn map_transport_error(url: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
            message: error.to_string(),
        }
    } else if error.is_connect() {
        TransportError::Connect {
            url: url.to_string(),
            message: error.to_string(),
        }
    } else {
        TransportError::Request {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

/// `reqwest` backed invoker
#[derive(Debug, Clone)]
pub struct HttpInvoker {
    client: Client,
}

impl HttpInvoker {
    pub fn new(config: &HttpConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RequestInvoker for HttpInvoker {
    async fn invoke(&self, request: &OutboundRequest) -> Result<CapturedResponse, TransportError> {
        let method =
            Method::from_bytes(request.method.as_bytes()).map_err(|e| TransportError::Request {
                url: request.url.clone(),
                message: e.to_string(),
            })?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_transport_error(&request.url, e))?;

        let status = response.status().as_u16();
        if !VALID_STATUS_RANGE.contains(&status) {
            return Err(TransportError::InvalidStatus {
                url: request.url.clone(),
                status,
            });
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| map_transport_error(&request.url, e))?;

        debug!(url = %request.url, status, "Response captured");

        Ok(CapturedResponse {
            server: request.server.clone(),
            status,
            headers,
            body,
        })
    }
}
