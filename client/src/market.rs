//! Price and cluster-state service client.
//!
//! The dapp backend publishes asset prices and per-asset cluster ratios. This
//! module defines the [`MarketData`] seam, the [`PriceBook`] lookup used for
//! valuation and [`MarketDataClient`], the HTTP implementation.

use crate::assets::{AssetName, AssetRegistry};
use crate::config::LendingConfig;
use crate::conversion::ClusterStates;
use crate::decimal;
use crate::error::{LendingError, Result};
use crate::retry::RetryStrategy;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One entry of the price feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    /// Asset resource address
    pub asset: String,
    /// Price in the quote currency
    pub price: Decimal,
}

/// Prices keyed by asset resource address
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceBook(HashMap<String, Decimal>);

impl PriceBook {
    /// Build from feed entries; later entries win
    pub fn new(entries: Vec<PriceEntry>) -> Self {
        Self(
            entries
                .into_iter()
                .map(|entry| (entry.asset, entry.price))
                .collect(),
        )
    }

    /// Price of a listed asset; missing or non-positive prices are unavailable
    pub fn price_of(&self, registry: &AssetRegistry, label: AssetName) -> Result<Decimal> {
        let address = registry.address_of(label)?;
        match self.0.get(address) {
            Some(price) if *price > Decimal::ZERO => Ok(*price),
            Some(price) => Err(LendingError::PriceUnavailable(format!(
                "price for {} is not positive: {}",
                label, price
            ))),
            None => Err(LendingError::PriceUnavailable(format!(
                "no price for {} ({})",
                label, address
            ))),
        }
    }

    /// Quote value of an amount of a listed asset
    pub fn value_of(
        &self,
        registry: &AssetRegistry,
        label: AssetName,
        amount: Decimal,
    ) -> Result<Decimal> {
        decimal::mul(amount, self.price_of(registry, label)?)
    }

    /// Number of priced assets
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no asset is priced
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Read access to prices and cluster ratios
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Current asset prices
    async fn prices(&self) -> Result<PriceBook>;

    /// Current cluster ratios
    async fn cluster_states(&self) -> Result<ClusterStates>;
}

/// HTTP client for the price/cluster service
#[derive(Clone)]
pub struct MarketDataClient {
    /// HTTP client
    client: Client,
    /// Base URL of the service
    base_url: String,
    /// Retry strategy
    retry_strategy: RetryStrategy,
}

impl MarketDataClient {
    /// Create a new market data client
    pub fn new(config: Arc<LendingConfig>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(LendingError::NetworkError)?;

        Ok(Self {
            client,
            base_url: config.market_api_url.trim_end_matches('/').to_string(),
            retry_strategy: RetryStrategy::from_config(&config),
        })
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        self.retry_strategy
            .retry(|| async {
                let response = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .map_err(LendingError::NetworkError)?;

                let status = response.status();
                if status.is_success() {
                    response
                        .json::<Value>()
                        .await
                        .map_err(|e| LendingError::InvalidResponse(e.to_string()))
                } else {
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    Err(LendingError::MarketDataError(format!(
                        "Status {}: {}",
                        status, error_text
                    )))
                }
            })
            .await
    }
}

#[async_trait]
impl MarketData for MarketDataClient {
    async fn prices(&self) -> Result<PriceBook> {
        info!("Fetching asset prices");

        let body = self
            .get("/assets/prices")
            .await
            .map_err(|e| LendingError::PriceUnavailable(e.to_string()))?;

        // Either a bare array or wrapped as {"prices": [...]}
        let entries = match body {
            Value::Array(_) => body,
            Value::Object(mut map) => map.remove("prices").unwrap_or(Value::Null),
            _ => Value::Null,
        };
        if !entries.is_array() {
            warn!("Unexpected price data format: prices is not an array");
            return Err(LendingError::PriceUnavailable(
                "price feed is not an array".to_string(),
            ));
        }

        let entries: Vec<PriceEntry> = serde_json::from_value(entries)?;
        debug!("Received {} prices", entries.len());
        Ok(PriceBook::new(entries))
    }

    async fn cluster_states(&self) -> Result<ClusterStates> {
        info!("Fetching cluster states");

        let body = self
            .get("/assets/clusters")
            .await
            .map_err(|e| LendingError::ClusterStateUnavailable(e.to_string()))?;

        let clusters: ClusterStates = serde_json::from_value(body)?;
        debug!("Received {} cluster states", clusters.len());
        Ok(clusters)
    }
}
