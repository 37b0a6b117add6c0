//! History store client.
//!
//! Latest APR rows from the backing database's REST interface, used for
//! the `apr_rates` snapshot. Failures degrade to an empty list.

use crate::error::{UpstreamError, UpstreamResult};
use perpline_core::{AprRate, AprRecord, BoxFuture, Clock};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Source of recent APR observations.
pub trait AprHistorySource: Send + Sync {
    /// Newest first, at most `limit` rows. Never fails.
    fn latest_apr_rates(&self, limit: usize) -> BoxFuture<'_, Vec<AprRate>>;
}

/// `GET {rest_url}/apr_history?select=*&order=timestamp.desc&limit=N`.
pub struct RestHistoryStore {
    client: Client,
    rest_url: String,
    api_key: String,
    clock: Arc<dyn Clock>,
}

impl RestHistoryStore {
    pub fn new(
        rest_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> UpstreamResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            rest_url: rest_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            clock,
        })
    }

    /// Fetch the newest APR rows, surfacing errors.
    pub async fn try_latest_apr_rates(&self, limit: usize) -> UpstreamResult<Vec<AprRate>> {
        let url = format!("{}/apr_history", self.rest_url);
        let limit = limit.to_string();
        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .query(&[
                ("select", "*"),
                ("order", "timestamp.desc"),
                ("limit", limit.as_str()),
            ]);
        if !self.api_key.is_empty() {
            request = request
                .header("apikey", &self.api_key)
                .header(AUTHORIZATION, format!("Bearer {}", self.api_key));
        }

        let response = request.send().await.map_err(UpstreamError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<AprRecord> = response
            .json()
            .await
            .map_err(|e| UpstreamError::Malformed(format!("Failed to parse apr_history: {e}")))?;
        let now = self.clock.now_ms() as i64;
        let rates: Vec<AprRate> = rows.iter().filter_map(|r| r.to_rate(now)).collect();
        debug!(rows = rows.len(), rates = rates.len(), "APR history fetched");
        Ok(rates)
    }
}

impl AprHistorySource for RestHistoryStore {
    fn latest_apr_rates(&self, limit: usize) -> BoxFuture<'_, Vec<AprRate>> {
        Box::pin(async move {
            match self.try_latest_apr_rates(limit).await {
                Ok(rates) => rates,
                Err(e) => {
                    warn!(error = %e, "APR history unavailable, returning empty snapshot");
                    Vec::new()
                }
            }
        })
    }
}

/// History source used when no store is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHistory;

impl AprHistorySource for NoHistory {
    fn latest_apr_rates(&self, _limit: usize) -> BoxFuture<'_, Vec<AprRate>> {
        Box::pin(async { Vec::new() })
    }
}
