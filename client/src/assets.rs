//! Asset registry for the lending market.
//!
//! The market lists a fixed set of assets. Each label maps to exactly one
//! ledger resource address and every address maps back to exactly one label;
//! [`AssetRegistry::new`] refuses configurations that break either direction.

use crate::error::{LendingError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Assets listed by the market
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssetName {
    /// Native Radix token
    #[serde(rename = "XRD")]
    Xrd,
    /// Instabridge-wrapped USDT
    #[serde(rename = "xUSDT")]
    XUsdt,
    /// HUG meme token
    #[serde(rename = "HUG")]
    Hug,
}

impl AssetName {
    /// Every listed asset, in display order
    pub const ALL: [AssetName; 3] = [AssetName::Xrd, AssetName::XUsdt, AssetName::Hug];

    /// Ticker as shown to users
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetName::Xrd => "XRD",
            AssetName::XUsdt => "xUSDT",
            AssetName::Hug => "HUG",
        }
    }
}

impl fmt::Display for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetName {
    type Err = LendingError;

    fn from_str(s: &str) -> Result<Self> {
        AssetName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| LendingError::UnknownAsset(s.to_string()))
    }
}

/// Static configuration of one listed asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Asset label
    pub label: AssetName,
    /// Ledger resource address
    pub address: String,
    /// Resource address of the supply-unit token (empty until known)
    #[serde(default)]
    pub pool_unit_address: String,
    /// Annual supply rate in percent
    pub supply_apr: Decimal,
    /// Annual borrow rate in percent
    pub borrow_apr: Decimal,
}

impl AssetConfig {
    /// Create an asset config
    pub fn new(label: AssetName, address: impl Into<String>) -> Self {
        Self {
            label,
            address: address.into(),
            pool_unit_address: String::new(),
            supply_apr: Decimal::ZERO,
            borrow_apr: Decimal::ZERO,
        }
    }

    /// Set the supply-unit resource address
    pub fn with_pool_unit(mut self, pool_unit_address: impl Into<String>) -> Self {
        self.pool_unit_address = pool_unit_address.into();
        self
    }

    /// Set supply and borrow rates (annual percent)
    pub fn with_rates(mut self, supply_apr: Decimal, borrow_apr: Decimal) -> Self {
        self.supply_apr = supply_apr;
        self.borrow_apr = borrow_apr;
        self
    }
}

/// Listed assets on Stokenet
pub fn stokenet_assets() -> Vec<AssetConfig> {
    vec![
        AssetConfig::new(
            AssetName::Xrd,
            "resource_tdx_2_1tknxxxxxxxxxradxrdxxxxxxxxx009923554798xxxxxxxxxtfd2jc",
        )
        .with_pool_unit("resource_tdx_2_1thmmatuusc0ufqz9xzc5cs2462nfkzpuassg5uh4ugv2g0d2zdv92l")
        .with_rates(dec!(5), dec!(10)),
        AssetConfig::new(
            AssetName::XUsdt,
            "resource_tdx_2_1t57e50rm28cyqwn26jn336qyhu8nkt8cknacq8rnsn5kul2l3zvjut",
        )
        .with_pool_unit("resource_tdx_2_1tkxp4c4uenlnkaakflgfm9dgesudvuq4dmddxl946p3sf7cl4d058s")
        .with_rates(dec!(5), dec!(10)),
        AssetConfig::new(
            AssetName::Hug,
            "resource_tdx_2_1tkuj2rqsa63f8ygkzezgt27trj50srht5e666jaz28j5ss8fasg5kl",
        )
        .with_pool_unit("resource_tdx_2_1t44agt87t8drq86hcg3fj3xpn39vtuhc4h04azcnjqa33gxzkf4gs3")
        .with_rates(dec!(5), dec!(10)),
    ]
}

/// An asset as presented to the user: identity, wallet balance and the amount
/// staged for the current action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Ledger resource address
    pub address: String,
    /// Asset label
    pub label: AssetName,
    /// Amount held in the user's own account
    pub wallet_balance: Decimal,
    /// Amount staged for the current action
    pub selected_amount: Decimal,
    /// Annual supply rate in percent
    pub supply_rate: Decimal,
    /// Annual borrow rate in percent
    pub borrow_rate: Decimal,
    /// Supply-unit token address (empty until known)
    pub pool_unit_address: String,
}

impl Asset {
    /// Stage an amount for the next action
    pub fn with_selected_amount(mut self, amount: Decimal) -> Self {
        self.selected_amount = amount;
        self
    }
}

/// Bidirectional label ⇄ address lookup
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    by_label: BTreeMap<AssetName, AssetConfig>,
    by_address: HashMap<String, AssetName>,
}

impl AssetRegistry {
    /// Build a registry, rejecting duplicate labels or addresses
    pub fn new(configs: Vec<AssetConfig>) -> Result<Self> {
        let mut by_label = BTreeMap::new();
        let mut by_address = HashMap::new();

        for config in configs {
            if config.address.is_empty() {
                return Err(LendingError::ConfigError(format!(
                    "asset {} has an empty address",
                    config.label
                )));
            }
            if let Some(other) = by_address.insert(config.address.clone(), config.label) {
                return Err(LendingError::ConfigError(format!(
                    "address {} is shared by {} and {}",
                    config.address, other, config.label
                )));
            }
            let label = config.label;
            if by_label.insert(label, config).is_some() {
                return Err(LendingError::ConfigError(format!(
                    "asset {} is listed twice",
                    label
                )));
            }
        }

        Ok(Self {
            by_label,
            by_address,
        })
    }

    /// Configuration of a listed asset
    pub fn config(&self, label: AssetName) -> Result<&AssetConfig> {
        self.by_label
            .get(&label)
            .ok_or_else(|| LendingError::UnknownAsset(label.to_string()))
    }

    /// Resource address of a listed asset
    pub fn address_of(&self, label: AssetName) -> Result<&str> {
        self.config(label).map(|config| config.address.as_str())
    }

    /// Label for a resource address, if listed
    pub fn label_of(&self, address: &str) -> Option<AssetName> {
        self.by_address.get(address).copied()
    }

    /// Listed assets in label order
    pub fn iter(&self) -> impl Iterator<Item = &AssetConfig> {
        self.by_label.values()
    }

    /// Number of listed assets
    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    /// Whether no asset is listed
    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }

    /// Build the user-facing [`Asset`] for a label
    pub fn asset(&self, label: AssetName, wallet_balance: Decimal) -> Result<Asset> {
        let config = self.config(label)?;
        Ok(Asset {
            address: config.address.clone(),
            label,
            wallet_balance,
            selected_amount: Decimal::ZERO,
            supply_rate: config.supply_apr,
            borrow_rate: config.borrow_apr,
            pool_unit_address: config.pool_unit_address.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_asset_name_round_trip() {
        for name in AssetName::ALL {
            assert_eq!(name.as_str().parse::<AssetName>().unwrap(), name);
        }
        assert_matches!("BTC".parse::<AssetName>(), Err(LendingError::UnknownAsset(_)));
    }

    #[test]
    fn test_asset_name_serde() {
        let json = serde_json::to_string(&AssetName::XUsdt).unwrap();
        assert_eq!(json, "\"xUSDT\"");
        let name: AssetName = serde_json::from_str("\"HUG\"").unwrap();
        assert_eq!(name, AssetName::Hug);
    }

    #[test]
    fn test_stokenet_registry_is_bidirectional() {
        let registry = AssetRegistry::new(stokenet_assets()).unwrap();
        assert_eq!(registry.len(), 3);

        for config in registry.iter() {
            assert_eq!(registry.label_of(&config.address), Some(config.label));
            assert_eq!(registry.address_of(config.label).unwrap(), config.address);
        }
        assert_eq!(registry.label_of("resource_unknown"), None);
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let result = AssetRegistry::new(vec![
            AssetConfig::new(AssetName::Xrd, "resource_a"),
            AssetConfig::new(AssetName::Hug, "resource_a"),
        ]);
        assert_matches!(result, Err(LendingError::ConfigError(_)));
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let result = AssetRegistry::new(vec![
            AssetConfig::new(AssetName::Xrd, "resource_a"),
            AssetConfig::new(AssetName::Xrd, "resource_b"),
        ]);
        assert_matches!(result, Err(LendingError::ConfigError(_)));
    }

    #[test]
    fn test_unlisted_label() {
        let registry =
            AssetRegistry::new(vec![AssetConfig::new(AssetName::Xrd, "resource_a")]).unwrap();
        assert_matches!(
            registry.address_of(AssetName::Hug),
            Err(LendingError::UnknownAsset(_))
        );
    }

    #[test]
    fn test_asset_view() {
        let registry = AssetRegistry::new(stokenet_assets()).unwrap();
        let asset = registry
            .asset(AssetName::Xrd, dec!(250))
            .unwrap()
            .with_selected_amount(dec!(10));

        assert_eq!(asset.label, AssetName::Xrd);
        assert_eq!(asset.wallet_balance, dec!(250));
        assert_eq!(asset.selected_amount, dec!(10));
        assert_eq!(asset.supply_rate, dec!(5));
        assert_eq!(asset.borrow_rate, dec!(10));
        assert!(!asset.pool_unit_address.is_empty());
    }
}
