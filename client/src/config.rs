//! Network and protocol configuration.
//!
//! This module provides configuration for connecting to Radix networks
//! (Stokenet, Mainnet or custom endpoints), the price/cluster service, the
//! deployed market component and the solvency parameters of the market.

use crate::assets::{stokenet_assets, AssetConfig, AssetRegistry};
use crate::error::{LendingError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default minimum health factor below which borrow and withdraw are blocked
pub const DEFAULT_MINIMUM_HEALTH_FACTOR: Decimal = dec!(1.5);

/// Default buffer added on top of repay amounts to cover interest accrued
/// between preview and commit
pub const DEFAULT_REPAY_SLIPPAGE: Decimal = dec!(0.001);

/// Network type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    /// Radix public test network
    Stokenet,
    /// Radix main network
    Mainnet,
    /// Custom network with user-defined endpoints
    Custom,
}

impl Network {
    /// Get the default Gateway URL for this network
    pub fn default_gateway_url(&self) -> &'static str {
        match self {
            Network::Stokenet => "https://stokenet.radixdlt.com",
            Network::Mainnet => "https://mainnet.radixdlt.com",
            Network::Custom => "",
        }
    }
}

/// Protocol addresses as published in the dapp's `config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolAddresses {
    /// Market component address
    pub market_component: String,
    /// Position badge resource address
    #[serde(rename = "borrowerBadgeAddr")]
    pub borrower_badge: String,
}

impl ProtocolAddresses {
    /// Parse the dapp's `config.json`
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Configuration for the lending client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LendingConfig {
    /// Network to connect to
    pub network: Network,

    /// Gateway API endpoint URL
    pub gateway_url: String,

    /// Base URL of the price/cluster service (`.../assets/prices`, `.../assets/clusters`)
    pub market_api_url: String,

    /// Market component address
    pub market_component: String,

    /// Position badge resource address
    pub position_badge_address: String,

    /// Listed assets
    pub assets: Vec<AssetConfig>,

    /// Minimum health factor for borrow and withdraw
    pub minimum_health_factor: Decimal,

    /// Fraction added on top of repay amounts
    pub repay_slippage: Decimal,

    /// HTTP request timeout
    pub request_timeout: Duration,

    /// Maximum number of retries for failed requests
    pub max_retries: usize,

    /// Initial retry delay (in milliseconds)
    pub retry_initial_delay_ms: u64,

    /// Maximum retry delay (in milliseconds)
    pub retry_max_delay_ms: u64,

    /// Retry backoff multiplier
    pub retry_multiplier: f64,

    /// Whether to wait for the transaction to commit after submission
    pub wait_for_commit: bool,

    /// Transaction status polling interval (in milliseconds)
    pub tx_poll_interval_ms: u64,

    /// Transaction timeout (in seconds)
    pub tx_timeout_secs: u64,
}

impl LendingConfig {
    /// Create a new configuration for the specified network
    pub fn new(network: Network) -> Self {
        let assets = match network {
            Network::Stokenet => stokenet_assets(),
            Network::Mainnet | Network::Custom => Vec::new(),
        };

        Self {
            network,
            gateway_url: network.default_gateway_url().to_string(),
            market_api_url: "http://localhost:3000/api".to_string(),
            market_component: String::new(),
            position_badge_address: String::new(),
            assets,
            minimum_health_factor: DEFAULT_MINIMUM_HEALTH_FACTOR,
            repay_slippage: DEFAULT_REPAY_SLIPPAGE,
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_initial_delay_ms: 100,
            retry_max_delay_ms: 5000,
            retry_multiplier: 2.0,
            wait_for_commit: false,
            tx_poll_interval_ms: 1000,
            tx_timeout_secs: 60,
        }
    }

    /// Create configuration for Stokenet
    pub fn stokenet() -> Self {
        Self::new(Network::Stokenet)
    }

    /// Create configuration for Mainnet
    pub fn mainnet() -> Self {
        Self::new(Network::Mainnet)
    }

    /// Create a custom configuration
    pub fn custom(
        gateway_url: String,
        market_api_url: String,
        assets: Vec<AssetConfig>,
    ) -> Result<Self> {
        if gateway_url.is_empty() {
            return Err(LendingError::ConfigError(
                "Gateway URL cannot be empty".to_string(),
            ));
        }
        if market_api_url.is_empty() {
            return Err(LendingError::ConfigError(
                "Market API URL cannot be empty".to_string(),
            ));
        }

        let mut config = Self::new(Network::Custom);
        config.gateway_url = gateway_url;
        config.market_api_url = market_api_url;
        config.assets = assets;
        Ok(config)
    }

    /// Set market component and position badge addresses
    pub fn with_protocol(
        mut self,
        market_component: impl Into<String>,
        position_badge_address: impl Into<String>,
    ) -> Self {
        self.market_component = market_component.into();
        self.position_badge_address = position_badge_address.into();
        self
    }

    /// Set protocol addresses from the dapp's `config.json`
    pub fn with_protocol_addresses(self, addresses: ProtocolAddresses) -> Self {
        self.with_protocol(addresses.market_component, addresses.borrower_badge)
    }

    /// Set the price/cluster service URL
    pub fn with_market_api_url(mut self, url: impl Into<String>) -> Self {
        self.market_api_url = url.into();
        self
    }

    /// Replace the listed assets
    pub fn with_assets(mut self, assets: Vec<AssetConfig>) -> Self {
        self.assets = assets;
        self
    }

    /// Set solvency parameters
    pub fn with_solvency(mut self, minimum_health_factor: Decimal, repay_slippage: Decimal) -> Self {
        self.minimum_health_factor = minimum_health_factor;
        self.repay_slippage = repay_slippage;
        self
    }

    /// Set request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set maximum retries
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set retry delays
    pub fn with_retry_config(
        mut self,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: f64,
    ) -> Self {
        self.retry_initial_delay_ms = initial_delay_ms;
        self.retry_max_delay_ms = max_delay_ms;
        self.retry_multiplier = multiplier;
        self
    }

    /// Wait for commit after submission, polling with the given interval and timeout
    pub fn with_commit_wait(mut self, poll_interval_ms: u64, timeout_secs: u64) -> Self {
        self.wait_for_commit = true;
        self.tx_poll_interval_ms = poll_interval_ms;
        self.tx_timeout_secs = timeout_secs;
        self
    }

    /// Build the asset registry described by this configuration
    pub fn asset_registry(&self) -> Result<AssetRegistry> {
        AssetRegistry::new(self.assets.clone())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.gateway_url).map_err(|e| {
            LendingError::ConfigError(format!("Invalid gateway URL '{}': {}", self.gateway_url, e))
        })?;
        Url::parse(&self.market_api_url).map_err(|e| {
            LendingError::ConfigError(format!(
                "Invalid market API URL '{}': {}",
                self.market_api_url, e
            ))
        })?;
        if self.market_component.is_empty() {
            return Err(LendingError::ConfigError(
                "Market component address cannot be empty".to_string(),
            ));
        }
        if self.position_badge_address.is_empty() {
            return Err(LendingError::ConfigError(
                "Position badge address cannot be empty".to_string(),
            ));
        }
        if self.assets.is_empty() {
            return Err(LendingError::ConfigError(
                "At least one asset must be listed".to_string(),
            ));
        }
        self.asset_registry()?;
        if self.minimum_health_factor <= Decimal::ONE {
            return Err(LendingError::ConfigError(
                "Minimum health factor must be greater than 1".to_string(),
            ));
        }
        if self.repay_slippage < Decimal::ZERO || self.repay_slippage >= dec!(0.1) {
            return Err(LendingError::ConfigError(
                "Repay slippage must be within [0, 0.1)".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(LendingError::ConfigError(
                "Max retries must be greater than 0".to_string(),
            ));
        }
        if self.retry_initial_delay_ms == 0 {
            return Err(LendingError::ConfigError(
                "Retry initial delay must be greater than 0".to_string(),
            ));
        }
        if self.retry_multiplier <= 1.0 {
            return Err(LendingError::ConfigError(
                "Retry multiplier must be greater than 1.0".to_string(),
            ));
        }
        if self.tx_poll_interval_ms == 0 {
            return Err(LendingError::ConfigError(
                "Transaction poll interval must be greater than 0".to_string(),
            ));
        }
        if self.tx_timeout_secs == 0 {
            return Err(LendingError::ConfigError(
                "Transaction timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self::stokenet()
    }
}
