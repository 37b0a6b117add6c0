//! Trading API client.
//!
//! One well-known endpoint per resource. Address-shaped path segments are
//! validated locally before anything goes on the wire.

use crate::error::{UpstreamError, UpstreamResult};
use perpline_core::types::is_full_address;
use perpline_core::{BoxFuture, PositionRecord};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

/// Source of raw position rows for an address.
pub trait PositionsApi: Send + Sync {
    fn fetch_positions<'a>(
        &'a self,
        address: &'a str,
    ) -> BoxFuture<'a, UpstreamResult<Vec<PositionRecord>>>;
}

/// HTTP client for `GET {base}/{version}/positions/{address}`.
pub struct TradingApiClient {
    client: Client,
    base_url: String,
    version: String,
}

impl TradingApiClient {
    /// Create a new client. Requests time out after `timeout` and are not retried.
    pub fn new(
        base_url: impl Into<String>,
        version: impl Into<String>,
        timeout: Duration,
    ) -> UpstreamResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            version: version.into().trim_matches('/').to_string(),
        })
    }

    /// URL for an address's positions.
    pub fn positions_url(&self, address: &str) -> UpstreamResult<String> {
        if !is_full_address(address) {
            return Err(UpstreamError::InvalidAddress(address.to_string()));
        }
        Ok(format!(
            "{}/{}/positions/{}",
            self.base_url, self.version, address
        ))
    }

    async fn get_positions(&self, address: &str) -> UpstreamResult<Vec<PositionRecord>> {
        let url = self.positions_url(address)?;
        debug!(%url, "Fetching positions");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(address, "No positions upstream");
                return Ok(Vec::new());
            }
            StatusCode::BAD_GATEWAY => return Err(UpstreamError::BadGateway),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(UpstreamError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            _ => {}
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::Malformed(format!("Failed to parse response: {e}")))?;
        let records = parse_positions_body(body)?;
        info!(address, count = records.len(), "Positions fetched");
        Ok(records)
    }
}

impl PositionsApi for TradingApiClient {
    fn fetch_positions<'a>(
        &'a self,
        address: &'a str,
    ) -> BoxFuture<'a, UpstreamResult<Vec<PositionRecord>>> {
        Box::pin(self.get_positions(address))
    }
}

/// Accepts a bare array or an object wrapping one under `positions`/`data`.
pub fn parse_positions_body(body: serde_json::Value) -> UpstreamResult<Vec<PositionRecord>> {
    let rows = match body {
        serde_json::Value::Array(rows) => rows,
        serde_json::Value::Object(mut map) => match map
            .remove("positions")
            .or_else(|| map.remove("data"))
        {
            Some(serde_json::Value::Array(rows)) => rows,
            Some(serde_json::Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(UpstreamError::Malformed(format!(
                    "positions is not an array: {other}"
                )))
            }
        },
        serde_json::Value::Null => Vec::new(),
        other => {
            return Err(UpstreamError::Malformed(format!(
                "unexpected positions body: {other}"
            )))
        }
    };

    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|e| UpstreamError::Malformed(format!("bad position row: {e}")))
        })
        .collect()
}
