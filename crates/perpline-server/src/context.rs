//! Process context.
//!
//! Every long-lived component is built once here and shared by `Arc`.
//! Tests build a fresh context per case from substitute collaborators.

use crate::config::AppConfig;
use crate::error::AppResult;
use perpline_bridge::ChangeFeedBridge;
use perpline_core::Clock;
use perpline_gateway::Gateway;
use perpline_price::{AssetIdentityMapping, HttpPriceSource, PriceAggregator, PriceSource};
use perpline_risk::RiskEngine;
use perpline_upstream::{
    AprHistorySource, NoHistory, PortfolioService, PositionsApi, RestHistoryStore,
    TradingApiClient,
};
use std::sync::Arc;
use std::time::Duration;

pub struct AppContext {
    pub config: AppConfig,
    pub clock: Arc<dyn Clock>,
    pub prices: Arc<PriceAggregator>,
    pub risk: Arc<RiskEngine>,
    pub portfolio: Arc<PortfolioService>,
    pub history: Arc<dyn AprHistorySource>,
    /// `None` when the change feed is disabled.
    pub bridge: Option<Arc<ChangeFeedBridge>>,
    pub gateway: Arc<Gateway>,
}

impl AppContext {
    /// Build with the HTTP collaborators named in `config`.
    pub fn new(config: AppConfig, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let price_source: Arc<dyn PriceSource> = Arc::new(HttpPriceSource::new(
            config.price.base_url.clone(),
            Duration::from_millis(config.price.timeout_ms),
        )?);
        let positions: Arc<dyn PositionsApi> = Arc::new(TradingApiClient::new(
            config.upstream.api_base_url.clone(),
            config.upstream.api_version.clone(),
            Duration::from_millis(config.upstream.timeout_ms),
        )?);
        let history: Arc<dyn AprHistorySource> = if config.history.enabled() {
            Arc::new(RestHistoryStore::new(
                config.history.rest_url.clone(),
                config.history.api_key.clone(),
                Duration::from_millis(config.history.timeout_ms),
                clock.clone(),
            )?)
        } else {
            Arc::new(NoHistory)
        };
        Self::from_parts(config, clock, price_source, positions, history)
    }

    /// Build around the given collaborators.
    pub fn from_parts(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        price_source: Arc<dyn PriceSource>,
        positions: Arc<dyn PositionsApi>,
        history: Arc<dyn AprHistorySource>,
    ) -> AppResult<Self> {
        let mapping = AssetIdentityMapping::from_entries(&config.price.assets)?;
        let prices = Arc::new(PriceAggregator::new(
            mapping,
            price_source,
            config.price.ttl_ms,
            clock.clone(),
        ));
        let risk = Arc::new(RiskEngine::new(&config.risk, clock.clone()));
        let portfolio = Arc::new(PortfolioService::new(positions, clock.clone()));
        let gateway = Arc::new(Gateway::new(
            config.gateway.clone(),
            prices.clone(),
            portfolio.clone(),
            history.clone(),
            clock.clone(),
        ));
        let bridge = config
            .change_feed
            .enabled
            .then(|| Arc::new(ChangeFeedBridge::new(config.change_feed.clone(), clock.clone())));

        Ok(Self {
            config,
            clock,
            prices,
            risk,
            portfolio,
            history,
            bridge,
            gateway,
        })
    }
}
