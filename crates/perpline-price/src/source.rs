//! Upstream price sources.
//!
//! The aggregator talks to a `PriceSource`, a batched quote-by-id lookup
//! returning USD prices keyed by feed identifier. `HttpPriceSource` is the
//! production implementation; `MockPriceSource` records calls for tests.

use crate::error::{PriceError, PriceResult};
use parking_lot::Mutex;
use perpline_core::{parse_decimal, BoxFuture, FeedId};
use reqwest::header::ACCEPT;
use reqwest::Client;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Batched USD quote lookup.
pub trait PriceSource: Send + Sync {
    /// Fetch USD prices for the given feed ids in one request.
    ///
    /// Ids the upstream has no price for are absent from the result.
    fn fetch<'a>(&'a self, ids: &'a [FeedId]) -> BoxFuture<'a, PriceResult<HashMap<FeedId, Decimal>>>;
}

/// HTTP quote source speaking `GET {base}/simple/price?ids=..&vs_currencies=usd`.
///
/// Response shape is `{feedId: {usd: number}}`.
pub struct HttpPriceSource {
    client: Client,
    base_url: String,
}

impl HttpPriceSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> PriceResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PriceError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_inner(&self, ids: &[FeedId]) -> PriceResult<HashMap<FeedId, Decimal>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let joined = ids
            .iter()
            .map(FeedId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/simple/price", self.base_url);
        debug!(%url, ids = %joined, "Fetching prices");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .query(&[("ids", joined.as_str()), ("vs_currencies", "usd")])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PriceError::Timeout(e.to_string())
                } else {
                    PriceError::Http(format!("HTTP request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PriceError::Http(format!("HTTP {status}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PriceError::Malformed(format!("Failed to parse response: {e}")))?;

        parse_quote_body(&body)
    }
}

impl PriceSource for HttpPriceSource {
    fn fetch<'a>(&'a self, ids: &'a [FeedId]) -> BoxFuture<'a, PriceResult<HashMap<FeedId, Decimal>>> {
        Box::pin(self.fetch_inner(ids))
    }
}

/// Parse a `{feedId: {usd: number}}` body.
///
/// Entries without a usable positive `usd` value are skipped.
pub fn parse_quote_body(body: &serde_json::Value) -> PriceResult<HashMap<FeedId, Decimal>> {
    let object = body
        .as_object()
        .ok_or_else(|| PriceError::Malformed("price response is not an object".to_string()))?;

    let mut prices = HashMap::with_capacity(object.len());
    for (id, entry) in object {
        let usd = entry
            .get("usd")
            .and_then(|v| parse_decimal(v).ok().flatten());
        match usd {
            Some(price) if price > Decimal::ZERO => {
                prices.insert(FeedId::new(id.as_str()), price);
            }
            _ => debug!(feed_id = %id, "Skipping quote without usd price"),
        }
    }
    Ok(prices)
}

/// In-memory price source for tests.
#[derive(Debug, Default)]
pub struct MockPriceSource {
    prices: Mutex<HashMap<FeedId, Decimal>>,
    fail: Mutex<bool>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<FeedId>>>,
}

impl MockPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the price returned for a feed id.
    pub fn set_price(&self, id: &str, price: Decimal) {
        self.prices.lock().insert(FeedId::new(id), price);
    }

    /// Make subsequent fetches fail.
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    /// Number of fetches performed.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Feed ids requested by each fetch, in call order.
    pub fn requests(&self) -> Vec<Vec<FeedId>> {
        self.requests.lock().clone()
    }
}

impl PriceSource for MockPriceSource {
    fn fetch<'a>(&'a self, ids: &'a [FeedId]) -> BoxFuture<'a, PriceResult<HashMap<FeedId, Decimal>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push(ids.to_vec());
            if *self.fail.lock() {
                return Err(PriceError::Http("HTTP 500 Internal Server Error".to_string()));
            }
            let prices = self.prices.lock();
            Ok(ids
                .iter()
                .filter_map(|id| prices.get(id).map(|p| (id.clone(), *p)))
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_parse_quote_body() {
        let body = json!({
            "aptos": {"usd": 8.5},
            "bitcoin": {"usd": "65000.25"},
            "dead": {},
            "zero": {"usd": 0}
        });
        let prices = parse_quote_body(&body).unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[&FeedId::new("aptos")], dec!(8.5));
        assert_eq!(prices[&FeedId::new("bitcoin")], dec!(65000.25));
    }

    #[test]
    fn test_parse_quote_body_rejects_non_object() {
        let err = parse_quote_body(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, PriceError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_http_source_empty_ids_skips_request() {
        let source =
            HttpPriceSource::new("http://127.0.0.1:1", Duration::from_millis(100)).unwrap();
        let prices = source.fetch(&[]).await.unwrap();
        assert!(prices.is_empty());
    }

    #[tokio::test]
    async fn test_http_source_connection_failure_is_error() {
        let source =
            HttpPriceSource::new("http://127.0.0.1:1", Duration::from_millis(500)).unwrap();
        let ids = vec![FeedId::new("aptos")];
        assert!(source.fetch(&ids).await.is_err());
    }
}
