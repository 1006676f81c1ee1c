//! Position badge resolution.
//!
//! A user's lending position lives on a non-fungible badge whose data carries
//! two maps, `supply` and `borrow`, from asset address to position units.
//! [`PositionResolver`] reads the badge, converts units to native amounts with
//! the current cluster ratios, values them with live prices and returns a
//! [`PortfolioSnapshot`].

use crate::assets::{Asset, AssetName, AssetRegistry};
use crate::conversion::UnitConverter;
use crate::decimal;
use crate::error::Result;
use crate::gateway::LedgerQuery;
use crate::market::{MarketData, PriceBook};
use crate::solvency::HealthFactor;
use crate::types::{AccountAddress, AccountState, NonFungibleData};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which side of a position an amount belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PositionSide {
    /// Collateral supplied to the market
    Supply,
    /// Debt owed to the market
    Borrow,
}

impl PositionSide {
    /// Side stored under a badge data field, if the field is a position map
    pub fn from_field_name(name: &str) -> Option<Self> {
        match name {
            "supply" => Some(PositionSide::Supply),
            "borrow" => Some(PositionSide::Borrow),
            _ => None,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Supply => write!(f, "supply"),
            PositionSide::Borrow => write!(f, "borrow"),
        }
    }
}

/// The non-fungible identifying a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionBadge {
    /// Badge resource address
    pub resource: String,
    /// Local id of the badge
    pub local_id: String,
}

/// Unit balances recorded on a badge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Badge holding the balances
    pub badge: PositionBadge,
    /// Supply units by asset address
    pub supply: BTreeMap<String, Decimal>,
    /// Debt units by asset address
    pub borrow: BTreeMap<String, Decimal>,
}

impl Position {
    /// Parse badge data. Fields other than `supply` and `borrow` are ignored.
    pub fn from_data(badge: PositionBadge, data: &NonFungibleData) -> Result<Self> {
        let mut position = Position {
            badge,
            supply: BTreeMap::new(),
            borrow: BTreeMap::new(),
        };

        for field in &data.fields {
            let Some(side) = PositionSide::from_field_name(&field.name) else {
                continue;
            };
            let map = position.side_mut(side);
            for entry in &field.entries {
                let units = decimal::parse(&entry.value)?;
                let total = map.entry(entry.key.clone()).or_insert(Decimal::ZERO);
                *total = decimal::add(*total, units)?;
            }
        }

        Ok(position)
    }

    /// Unit balances for one side
    pub fn side(&self, side: PositionSide) -> &BTreeMap<String, Decimal> {
        match side {
            PositionSide::Supply => &self.supply,
            PositionSide::Borrow => &self.borrow,
        }
    }

    fn side_mut(&mut self, side: PositionSide) -> &mut BTreeMap<String, Decimal> {
        match side {
            PositionSide::Supply => &mut self.supply,
            PositionSide::Borrow => &mut self.borrow,
        }
    }
}

/// Whether the account has opened a position
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionState {
    /// No badge in the account
    NoBadge,
    /// A badge is present, possibly with empty maps
    Open(Position),
}

/// One priced line of a portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEntry {
    /// The asset, with `selected_amount` set to the native position amount
    pub asset: Asset,
    /// Side of the position
    pub side: PositionSide,
    /// Position units
    pub units: Decimal,
    /// Native asset amount
    pub amount: Decimal,
    /// Quote value
    pub value: Decimal,
}

/// Priced view of an account's position at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// Account the snapshot was resolved for
    pub account: AccountAddress,
    /// Badge, `None` when no position is open
    pub badge: Option<PositionBadge>,
    /// Supply entries in asset order
    pub supply: Vec<PositionEntry>,
    /// Borrow entries in asset order
    pub borrow: Vec<PositionEntry>,
    /// Sum of supply values
    pub total_supply_value: Decimal,
    /// Sum of borrow values
    pub total_borrow_value: Decimal,
    /// Health factor of the totals
    pub health_factor: HealthFactor,
    /// When the snapshot was resolved
    pub resolved_at: DateTime<Utc>,
}

impl PortfolioSnapshot {
    /// Snapshot of an account with no position
    pub fn empty(account: impl Into<AccountAddress>) -> Self {
        Self {
            account: account.into(),
            badge: None,
            supply: Vec::new(),
            borrow: Vec::new(),
            total_supply_value: Decimal::ZERO,
            total_borrow_value: Decimal::ZERO,
            health_factor: HealthFactor::Unbounded,
            resolved_at: Utc::now(),
        }
    }

    /// Entries of one side
    pub fn entries(&self, side: PositionSide) -> &[PositionEntry] {
        match side {
            PositionSide::Supply => &self.supply,
            PositionSide::Borrow => &self.borrow,
        }
    }

    fn entry(&self, side: PositionSide, label: AssetName) -> Option<&PositionEntry> {
        self.entries(side)
            .iter()
            .find(|entry| entry.asset.label == label)
    }

    /// Native amount supplied of an asset
    pub fn supplied_amount(&self, label: AssetName) -> Decimal {
        self.entry(PositionSide::Supply, label)
            .map(|entry| entry.amount)
            .unwrap_or(Decimal::ZERO)
    }

    /// Native amount owed of an asset
    pub fn borrowed_amount(&self, label: AssetName) -> Decimal {
        self.entry(PositionSide::Borrow, label)
            .map(|entry| entry.amount)
            .unwrap_or(Decimal::ZERO)
    }

    /// Position units held of an asset
    pub fn units(&self, side: PositionSide, label: AssetName) -> Decimal {
        self.entry(side, label)
            .map(|entry| entry.units)
            .unwrap_or(Decimal::ZERO)
    }

    /// Supply value minus borrow value
    pub fn net_worth(&self) -> Result<Decimal> {
        decimal::sub(self.total_supply_value, self.total_borrow_value)
    }

    /// Value-weighted average annual rate of one side, zero when empty
    pub fn average_rate(&self, side: PositionSide) -> Result<Decimal> {
        let entries = self.entries(side);
        let total = decimal::sum(entries.iter().map(|entry| entry.value))?;
        if total <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }

        let mut weighted = Decimal::ZERO;
        for entry in entries {
            let rate = match side {
                PositionSide::Supply => entry.asset.supply_rate,
                PositionSide::Borrow => entry.asset.borrow_rate,
            };
            weighted = decimal::add(weighted, decimal::mul(entry.value, rate)?)?;
        }
        decimal::div(weighted, total).map(decimal::round_to_protocol)
    }
}

/// Everything one resolution fetched, kept so an action can be planned
/// against exactly the data the snapshot was computed from
#[derive(Debug, Clone)]
pub struct ResolvedPortfolio {
    /// Wallet balances and badges
    pub account_state: AccountState,
    /// Parsed badge
    pub position: PositionState,
    /// Converter over the fetched cluster ratios
    pub converter: UnitConverter,
    /// Fetched prices
    pub prices: PriceBook,
    /// Priced snapshot
    pub snapshot: PortfolioSnapshot,
}

/// Reads and prices an account's position
#[derive(Clone)]
pub struct PositionResolver {
    ledger: Arc<dyn LedgerQuery>,
    market: Arc<dyn MarketData>,
    registry: Arc<AssetRegistry>,
    badge_resource: String,
}

impl PositionResolver {
    /// Create a resolver for badges of `badge_resource`
    pub fn new(
        ledger: Arc<dyn LedgerQuery>,
        market: Arc<dyn MarketData>,
        registry: Arc<AssetRegistry>,
        badge_resource: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            market,
            registry,
            badge_resource: badge_resource.into(),
        }
    }

    /// Resolve an account's position into a priced snapshot
    pub async fn resolve(&self, account: &str) -> Result<ResolvedPortfolio> {
        info!("Resolving position for: {}", account);

        let (account_state, clusters, prices) = futures::try_join!(
            self.ledger.get_account_state(account),
            self.market.cluster_states(),
            self.market.prices(),
        )?;

        let position = self.read_position(&account_state).await?;
        let converter = UnitConverter::new(self.registry.clone(), clusters);
        let snapshot = self.price_position(account, &position, &account_state, &converter, &prices)?;

        debug!(
            "Resolved {}: supply {} borrow {} health {}",
            account, snapshot.total_supply_value, snapshot.total_borrow_value, snapshot.health_factor
        );

        Ok(ResolvedPortfolio {
            account_state,
            position,
            converter,
            prices,
            snapshot,
        })
    }

    async fn read_position(&self, account_state: &AccountState) -> Result<PositionState> {
        let Some(local_id) = account_state.first_non_fungible(&self.badge_resource) else {
            debug!("No position badge in {}", account_state.address);
            return Ok(PositionState::NoBadge);
        };

        let data = self
            .ledger
            .get_non_fungible_data(&self.badge_resource, local_id)
            .await?;
        let badge = PositionBadge {
            resource: self.badge_resource.clone(),
            local_id: local_id.to_string(),
        };
        Ok(PositionState::Open(Position::from_data(badge, &data)?))
    }

    fn price_position(
        &self,
        account: &str,
        position: &PositionState,
        account_state: &AccountState,
        converter: &UnitConverter,
        prices: &PriceBook,
    ) -> Result<PortfolioSnapshot> {
        let position = match position {
            PositionState::NoBadge => return Ok(PortfolioSnapshot::empty(account)),
            PositionState::Open(position) => position,
        };

        let supply = self.price_side(position, PositionSide::Supply, account_state, converter, prices)?;
        let borrow = self.price_side(position, PositionSide::Borrow, account_state, converter, prices)?;
        let total_supply_value = decimal::sum(supply.iter().map(|entry| entry.value))?;
        let total_borrow_value = decimal::sum(borrow.iter().map(|entry| entry.value))?;

        Ok(PortfolioSnapshot {
            account: account.to_string(),
            badge: Some(position.badge.clone()),
            supply,
            borrow,
            total_supply_value,
            total_borrow_value,
            health_factor: HealthFactor::compute(total_supply_value, total_borrow_value)?,
            resolved_at: Utc::now(),
        })
    }

    fn price_side(
        &self,
        position: &Position,
        side: PositionSide,
        account_state: &AccountState,
        converter: &UnitConverter,
        prices: &PriceBook,
    ) -> Result<Vec<PositionEntry>> {
        let mut entries = Vec::new();

        for (address, units) in position.side(side) {
            let Some(label) = self.registry.label_of(address) else {
                warn!("Dropping {} entry for unlisted asset {}", side, address);
                continue;
            };
            if units.is_zero() {
                continue;
            }

            let amount = converter.units_to_amount(side, label, *units)?;
            let value = prices
                .value_of(&self.registry, label, amount)
                .map(decimal::round_to_protocol)?;
            let asset = self
                .registry
                .asset(label, account_state.balance_of(address))?
                .with_selected_amount(amount);

            entries.push(PositionEntry {
                asset,
                side,
                units: *units,
                amount,
                value,
            });
        }

        entries.sort_by_key(|entry| entry.asset.label);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::stokenet_assets;
    use crate::conversion::{ClusterState, ClusterStates};
    use crate::error::LendingError;
    use crate::market::PriceEntry;
    use crate::types::{DataField, FieldEntry, TransactionStatus};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    const ACCOUNT: &str = "account_tdx_2_1user";
    const BADGE: &str = "resource_tdx_2_1badge";

    struct StaticLedger {
        state: AccountState,
        data: Option<NonFungibleData>,
    }

    #[async_trait]
    impl LedgerQuery for StaticLedger {
        async fn get_account_state(&self, _address: &str) -> Result<AccountState> {
            Ok(self.state.clone())
        }

        async fn get_non_fungible_data(
            &self,
            resource: &str,
            local_id: &str,
        ) -> Result<NonFungibleData> {
            self.data
                .clone()
                .ok_or_else(|| LendingError::GatewayError(format!("{} {}", resource, local_id)))
        }

        async fn get_transaction_status(&self, _intent_hash: &str) -> Result<TransactionStatus> {
            Ok(TransactionStatus::Unknown)
        }
    }

    struct StaticMarket {
        prices: Vec<PriceEntry>,
        clusters: ClusterStates,
    }

    #[async_trait]
    impl MarketData for StaticMarket {
        async fn prices(&self) -> Result<PriceBook> {
            Ok(PriceBook::new(self.prices.clone()))
        }

        async fn cluster_states(&self) -> Result<ClusterStates> {
            Ok(self.clusters.clone())
        }
    }

    fn registry() -> Arc<AssetRegistry> {
        Arc::new(AssetRegistry::new(stokenet_assets()).unwrap())
    }

    fn address(label: AssetName) -> String {
        registry().address_of(label).unwrap().to_string()
    }

    fn market() -> StaticMarket {
        let registry = registry();
        StaticMarket {
            prices: vec![
                PriceEntry {
                    asset: address(AssetName::Xrd),
                    price: dec!(2),
                },
                PriceEntry {
                    asset: address(AssetName::XUsdt),
                    price: dec!(1),
                },
            ],
            clusters: registry
                .iter()
                .map(|config| {
                    (
                        config.address.clone(),
                        ClusterState {
                            supply_ratio: dec!(0.5),
                            debt_ratio: dec!(1),
                        },
                    )
                })
                .collect(),
        }
    }

    fn badge_data(supply: Vec<(String, &str)>, borrow: Vec<(String, &str)>) -> NonFungibleData {
        let entries = |items: Vec<(String, &str)>| {
            items
                .into_iter()
                .map(|(key, value)| FieldEntry {
                    key,
                    value: value.to_string(),
                })
                .collect()
        };
        NonFungibleData {
            resource: BADGE.to_string(),
            local_id: "#1#".to_string(),
            fields: vec![
                DataField {
                    name: "supply".to_string(),
                    entries: entries(supply),
                },
                DataField {
                    name: "borrow".to_string(),
                    entries: entries(borrow),
                },
                DataField {
                    name: "opened_at".to_string(),
                    entries: Vec::new(),
                },
            ],
        }
    }

    fn account_with_badge() -> AccountState {
        let mut state = AccountState {
            address: ACCOUNT.to_string(),
            ..Default::default()
        };
        state
            .non_fungible_positions
            .insert(BADGE.to_string(), vec!["#1#".to_string()]);
        state
            .fungible_balances
            .insert(address(AssetName::Xrd), dec!(250));
        state
    }

    fn resolver(ledger: StaticLedger, market: StaticMarket) -> PositionResolver {
        PositionResolver::new(Arc::new(ledger), Arc::new(market), registry(), BADGE)
    }

    #[test]
    fn test_position_side_from_field_name() {
        assert_eq!(PositionSide::from_field_name("supply"), Some(PositionSide::Supply));
        assert_eq!(PositionSide::from_field_name("borrow"), Some(PositionSide::Borrow));
        assert_eq!(PositionSide::from_field_name("opened_at"), None);
        assert_eq!(PositionSide::Borrow.to_string(), "borrow");
    }

    #[test]
    fn test_position_from_data() {
        let data = badge_data(vec![("resource_a".to_string(), "12.5")], vec![]);
        let badge = PositionBadge {
            resource: BADGE.to_string(),
            local_id: "#1#".to_string(),
        };
        let position = Position::from_data(badge, &data).unwrap();
        assert_eq!(position.supply.get("resource_a"), Some(&dec!(12.5)));
        assert!(position.borrow.is_empty());
    }

    #[test]
    fn test_position_rejects_malformed_units() {
        let data = badge_data(vec![("resource_a".to_string(), "lots")], vec![]);
        let badge = PositionBadge {
            resource: BADGE.to_string(),
            local_id: "#1#".to_string(),
        };
        assert_matches!(
            Position::from_data(badge, &data),
            Err(LendingError::InvalidResponse(_))
        );
    }

    #[tokio::test]
    async fn test_no_badge_resolves_to_empty_snapshot() {
        let ledger = StaticLedger {
            state: AccountState {
                address: ACCOUNT.to_string(),
                ..Default::default()
            },
            data: None,
        };
        let resolved = resolver(ledger, market()).resolve(ACCOUNT).await.unwrap();

        assert_eq!(resolved.position, PositionState::NoBadge);
        let snapshot = resolved.snapshot;
        assert!(snapshot.badge.is_none());
        assert!(snapshot.supply.is_empty() && snapshot.borrow.is_empty());
        assert_eq!(snapshot.total_supply_value, Decimal::ZERO);
        assert_eq!(snapshot.total_borrow_value, Decimal::ZERO);
        assert_eq!(snapshot.health_factor, HealthFactor::Unbounded);
    }

    #[tokio::test]
    async fn test_badge_with_empty_maps_is_open() {
        let ledger = StaticLedger {
            state: account_with_badge(),
            data: Some(badge_data(vec![], vec![])),
        };
        let resolved = resolver(ledger, market()).resolve(ACCOUNT).await.unwrap();

        assert_matches!(resolved.position, PositionState::Open(_));
        assert!(resolved.snapshot.badge.is_some());
        assert_eq!(resolved.snapshot.health_factor, HealthFactor::Unbounded);
    }

    #[tokio::test]
    async fn test_snapshot_prices_entries() {
        let ledger = StaticLedger {
            state: account_with_badge(),
            data: Some(badge_data(
                vec![
                    (address(AssetName::Xrd), "250"),
                    ("resource_tdx_2_1delisted".to_string(), "99"),
                ],
                vec![(address(AssetName::XUsdt), "250")],
            )),
        };
        let snapshot = resolver(ledger, market())
            .resolve(ACCOUNT)
            .await
            .unwrap()
            .snapshot;

        // 250 units / 0.5 = 500 XRD at 2 = 1000
        assert_eq!(snapshot.supply.len(), 1);
        assert_eq!(snapshot.supplied_amount(AssetName::Xrd), dec!(500));
        assert_eq!(snapshot.units(PositionSide::Supply, AssetName::Xrd), dec!(250));
        assert_eq!(snapshot.supply[0].asset.wallet_balance, dec!(250));
        assert_eq!(snapshot.total_supply_value, dec!(1000));

        // 250 units / 1 = 250 xUSDT at 1 = 250
        assert_eq!(snapshot.borrowed_amount(AssetName::XUsdt), dec!(250));
        assert_eq!(snapshot.total_borrow_value, dec!(250));
        assert_eq!(snapshot.health_factor, HealthFactor::Finite(dec!(4)));
        assert_eq!(snapshot.net_worth().unwrap(), dec!(750));
    }

    #[tokio::test]
    async fn test_missing_price_fails_resolution() {
        let ledger = StaticLedger {
            state: account_with_badge(),
            data: Some(badge_data(vec![(address(AssetName::Hug), "1")], vec![])),
        };
        let result = resolver(ledger, market()).resolve(ACCOUNT).await;
        assert_matches!(result, Err(LendingError::PriceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_missing_cluster_fails_resolution() {
        let ledger = StaticLedger {
            state: account_with_badge(),
            data: Some(badge_data(vec![(address(AssetName::Xrd), "1")], vec![])),
        };
        let market = StaticMarket {
            clusters: ClusterStates::new(HashMap::new()),
            ..market()
        };
        let result = resolver(ledger, market).resolve(ACCOUNT).await;
        assert_matches!(result, Err(LendingError::ClusterStateUnavailable(_)));
    }

    #[test]
    fn test_average_rate_is_value_weighted() {
        let registry = registry();
        let entry = |label: AssetName, rate: Decimal, value: Decimal| {
            let mut asset = registry.asset(label, Decimal::ZERO).unwrap();
            asset.supply_rate = rate;
            PositionEntry {
                asset,
                side: PositionSide::Supply,
                units: value,
                amount: value,
                value,
            }
        };

        let mut snapshot = PortfolioSnapshot::empty(ACCOUNT);
        snapshot.supply = vec![
            entry(AssetName::Xrd, dec!(4), dec!(300)),
            entry(AssetName::Hug, dec!(8), dec!(100)),
        ];
        assert_eq!(snapshot.average_rate(PositionSide::Supply).unwrap(), dec!(5));
        assert_eq!(snapshot.average_rate(PositionSide::Borrow).unwrap(), Decimal::ZERO);
    }
}
