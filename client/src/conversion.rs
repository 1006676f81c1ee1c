//! Conversion between native asset amounts and position units.
//!
//! Every listed asset has a liquidity cluster whose supply and debt ratios
//! (units per native amount) drift as interest accrues. The cluster service
//! owns the authoritative ratios; this module holds a read-only snapshot of
//! them and converts with a single terminal rounding step.

use crate::assets::{AssetName, AssetRegistry};
use crate::decimal;
use crate::error::{LendingError, Result};
use crate::position::PositionSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Ratio snapshot of one asset's liquidity cluster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterState {
    /// Supply units per native amount
    #[serde(alias = "supplyRatio")]
    pub supply_ratio: Decimal,
    /// Debt units per native amount
    #[serde(alias = "debtRatio")]
    pub debt_ratio: Decimal,
}

impl ClusterState {
    /// Ratio used for a position side
    pub fn ratio(&self, side: PositionSide) -> Decimal {
        match side {
            PositionSide::Supply => self.supply_ratio,
            PositionSide::Borrow => self.debt_ratio,
        }
    }
}

/// Cluster states keyed by asset resource address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterStates(HashMap<String, ClusterState>);

impl ClusterStates {
    /// Wrap a map of address → cluster state
    pub fn new(states: HashMap<String, ClusterState>) -> Self {
        Self(states)
    }

    /// Cluster state for an asset address
    pub fn get(&self, address: &str) -> Option<&ClusterState> {
        self.0.get(address)
    }

    /// Number of known clusters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no cluster is known
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, ClusterState)> for ClusterStates {
    fn from_iter<I: IntoIterator<Item = (String, ClusterState)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Converts between native amounts and position units for listed assets
#[derive(Debug, Clone)]
pub struct UnitConverter {
    registry: Arc<AssetRegistry>,
    clusters: ClusterStates,
}

impl UnitConverter {
    /// Create a converter over a cluster snapshot
    pub fn new(registry: Arc<AssetRegistry>, clusters: ClusterStates) -> Self {
        Self { registry, clusters }
    }

    /// The cluster snapshot backing this converter
    pub fn clusters(&self) -> &ClusterStates {
        &self.clusters
    }

    /// Loaded, strictly positive ratio for an asset and side
    pub fn ratio(&self, side: PositionSide, label: AssetName) -> Result<Decimal> {
        let address = self.registry.address_of(label)?;
        let cluster = self.clusters.get(address).ok_or_else(|| {
            LendingError::ClusterStateUnavailable(format!(
                "no cluster state for {} ({})",
                label, address
            ))
        })?;

        let ratio = cluster.ratio(side);
        if ratio <= Decimal::ZERO {
            return Err(LendingError::ClusterStateUnavailable(format!(
                "{} ratio for {} is not positive: {}",
                side, label, ratio
            )));
        }
        Ok(ratio)
    }

    /// `units / ratio`, rounded once to protocol precision
    pub fn units_to_amount(
        &self,
        side: PositionSide,
        label: AssetName,
        units: Decimal,
    ) -> Result<Decimal> {
        let ratio = self.ratio(side, label)?;
        decimal::div(units, ratio).map(decimal::round_to_protocol)
    }

    /// `amount * ratio`, rounded once to protocol precision
    pub fn amount_to_units(
        &self,
        side: PositionSide,
        label: AssetName,
        amount: Decimal,
    ) -> Result<Decimal> {
        let ratio = self.ratio(side, label)?;
        decimal::mul(amount, ratio).map(decimal::round_to_protocol)
    }

    /// `units / ratio` rounded down, for post-conditions the ledger must meet
    pub fn units_to_amount_floor(
        &self,
        side: PositionSide,
        label: AssetName,
        units: Decimal,
    ) -> Result<Decimal> {
        let ratio = self.ratio(side, label)?;
        decimal::div(units, ratio).map(decimal::floor_to_protocol)
    }
}
