//! Action planning.
//!
//! [`ActionPlanner`] validates a user request against a resolved portfolio,
//! projects its effect on the health factor and builds the manifest. Nothing
//! is submitted here; a request that fails validation never produces a
//! manifest.

use crate::assets::{AssetName, AssetRegistry};
use crate::config::LendingConfig;
use crate::decimal;
use crate::error::{LendingError, Result};
use crate::manifest::{ActionKind, Intent, IntentBuilder, ResourceAmount, TransactionManifest};
use crate::position::{PositionSide, ResolvedPortfolio};
use crate::solvency::{HealthProjection, PendingDelta, SolvencyCalculator};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserAction {
    /// Add collateral, opening a position if needed
    Supply,
    /// Borrow against collateral
    Borrow,
    /// Take collateral back
    Withdraw,
    /// Pay back debt
    Repay,
}

impl fmt::Display for UserAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserAction::Supply => write!(f, "supply"),
            UserAction::Borrow => write!(f, "borrow"),
            UserAction::Withdraw => write!(f, "withdraw"),
            UserAction::Repay => write!(f, "repay"),
        }
    }
}

/// An amount of a listed asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAmount {
    /// Asset label
    pub label: AssetName,
    /// Native amount
    pub amount: Decimal,
}

impl AssetAmount {
    /// Create a new asset amount
    pub fn new(label: AssetName, amount: Decimal) -> Self {
        Self { label, amount }
    }
}

/// A user request for one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Requested action
    pub action: UserAction,
    /// Assets and amounts
    pub assets: Vec<AssetAmount>,
}

impl ActionRequest {
    /// Request with several assets
    pub fn new(action: UserAction, assets: Vec<AssetAmount>) -> Self {
        Self { action, assets }
    }

    /// Supply one asset
    pub fn supply(label: AssetName, amount: Decimal) -> Self {
        Self::new(UserAction::Supply, vec![AssetAmount::new(label, amount)])
    }

    /// Borrow one asset
    pub fn borrow(label: AssetName, amount: Decimal) -> Self {
        Self::new(UserAction::Borrow, vec![AssetAmount::new(label, amount)])
    }

    /// Withdraw one asset
    pub fn withdraw(label: AssetName, amount: Decimal) -> Self {
        Self::new(UserAction::Withdraw, vec![AssetAmount::new(label, amount)])
    }

    /// Repay one asset
    pub fn repay(label: AssetName, amount: Decimal) -> Self {
        Self::new(UserAction::Repay, vec![AssetAmount::new(label, amount)])
    }
}

/// A validated, ready-to-submit action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionPlan {
    /// Requested action
    pub action: UserAction,
    /// Ledger operation chosen for it
    pub kind: ActionKind,
    /// Health before and after
    pub projection: HealthProjection,
    /// Manifest to submit
    pub manifest: TransactionManifest,
}

/// Validates requests and builds their manifests
#[derive(Debug, Clone)]
pub struct ActionPlanner {
    registry: Arc<AssetRegistry>,
    calculator: SolvencyCalculator,
    repay_slippage: Decimal,
    component: String,
    badge_resource: String,
}

impl ActionPlanner {
    /// Create a planner from the client configuration
    pub fn from_config(config: &LendingConfig, registry: Arc<AssetRegistry>) -> Self {
        Self {
            registry,
            calculator: SolvencyCalculator::new(config.minimum_health_factor),
            repay_slippage: config.repay_slippage,
            component: config.market_component.clone(),
            badge_resource: config.position_badge_address.clone(),
        }
    }

    /// Solvency calculator used for gating
    pub fn calculator(&self) -> &SolvencyCalculator {
        &self.calculator
    }

    /// Validate a request against a resolved portfolio and build its manifest
    pub fn plan(
        &self,
        account: &str,
        resolved: &ResolvedPortfolio,
        request: &ActionRequest,
    ) -> Result<ActionPlan> {
        validate_request(request)?;

        let (intent, delta) = match request.action {
            UserAction::Supply => self.plan_supply(resolved, request)?,
            UserAction::Borrow => self.plan_borrow(resolved, request)?,
            UserAction::Withdraw => self.plan_withdraw(resolved, request)?,
            UserAction::Repay => self.plan_repay(resolved, request)?,
        };

        let kind = intent.kind();
        let snapshot = &resolved.snapshot;
        let projection = self.calculator.project(
            snapshot.total_supply_value,
            snapshot.total_borrow_value,
            Some(delta),
        )?;
        self.calculator.validate(kind, &projection)?;

        let builder = IntentBuilder::new(&self.component, account, &self.badge_resource);
        let manifest = builder.build(&intent)?;

        info!(
            "Planned {} for {}: health {} -> {}",
            kind, account, projection.current, projection.projected
        );
        Ok(ActionPlan {
            action: request.action,
            kind,
            projection,
            manifest,
        })
    }

    fn badge_id(resolved: &ResolvedPortfolio) -> Option<String> {
        resolved
            .snapshot
            .badge
            .as_ref()
            .map(|badge| badge.local_id.clone())
    }

    fn value_of(&self, resolved: &ResolvedPortfolio, label: AssetName, amount: Decimal) -> Result<Decimal> {
        resolved
            .prices
            .value_of(&self.registry, label, amount)
            .map(decimal::round_to_protocol)
    }

    fn total_value(&self, resolved: &ResolvedPortfolio, assets: &[AssetAmount]) -> Result<Decimal> {
        let mut total = Decimal::ZERO;
        for asset in assets {
            total = decimal::add(total, self.value_of(resolved, asset.label, asset.amount)?)?;
        }
        Ok(total)
    }

    fn resource_amounts(&self, assets: &[AssetAmount]) -> Result<Vec<ResourceAmount>> {
        assets
            .iter()
            .map(|asset| {
                Ok(ResourceAmount::new(
                    self.registry.address_of(asset.label)?,
                    asset.amount,
                ))
            })
            .collect()
    }

    fn plan_supply(
        &self,
        resolved: &ResolvedPortfolio,
        request: &ActionRequest,
    ) -> Result<(Intent, PendingDelta)> {
        for asset in &request.assets {
            let wallet = resolved
                .account_state
                .balance_of(self.registry.address_of(asset.label)?);
            ensure_available(asset, wallet)?;
        }

        let assets = self.resource_amounts(&request.assets)?;
        let intent = match Self::badge_id(resolved) {
            None => {
                debug!("No position badge; supplying through open_position");
                Intent::OpenPosition { assets }
            }
            badge_id => Intent::Supply { badge_id, assets },
        };
        let value = self.total_value(resolved, &request.assets)?;
        Ok((intent, PendingDelta::Supply(value)))
    }

    fn plan_borrow(
        &self,
        resolved: &ResolvedPortfolio,
        request: &ActionRequest,
    ) -> Result<(Intent, PendingDelta)> {
        let badge_id = Self::badge_id(resolved);
        if badge_id.is_none() {
            return Err(LendingError::InvalidIntent(
                "borrowing requires an open position".to_string(),
            ));
        }
        let intent = Intent::Borrow {
            badge_id,
            assets: self.resource_amounts(&request.assets)?,
        };
        let value = self.total_value(resolved, &request.assets)?;
        Ok((intent, PendingDelta::Borrow(value)))
    }

    fn plan_withdraw(
        &self,
        resolved: &ResolvedPortfolio,
        request: &ActionRequest,
    ) -> Result<(Intent, PendingDelta)> {
        let asset = single_asset(request)?;
        let snapshot = &resolved.snapshot;
        let supplied = snapshot.supplied_amount(asset.label);
        ensure_available(asset, supplied)?;

        // Badge units carry more places than the ledger's Decimal
        let held_units =
            decimal::floor_to_protocol(snapshot.units(PositionSide::Supply, asset.label));
        let units = if asset.amount == supplied {
            held_units
        } else {
            resolved
                .converter
                .amount_to_units(PositionSide::Supply, asset.label, asset.amount)?
                .min(held_units)
        };
        let expected = resolved
            .converter
            .units_to_amount_floor(PositionSide::Supply, asset.label, units)?;

        let config = self.registry.config(asset.label)?;
        if config.pool_unit_address.is_empty() {
            return Err(LendingError::InvalidIntent(format!(
                "no pool-unit resource configured for {}",
                asset.label
            )));
        }
        let wallet_units = resolved.account_state.balance_of(&config.pool_unit_address);
        if units > wallet_units {
            return Err(LendingError::InsufficientBalance {
                asset: format!("{} pool units", asset.label),
                requested: units,
                available: wallet_units,
            });
        }

        let intent = Intent::Withdraw {
            badge_id: Self::badge_id(resolved),
            pool_units: ResourceAmount::new(config.pool_unit_address.clone(), units),
            expected: ResourceAmount::new(config.address.clone(), expected),
        };
        let value = self.value_of(resolved, asset.label, asset.amount)?;
        Ok((intent, PendingDelta::Supply(-value)))
    }

    fn plan_repay(
        &self,
        resolved: &ResolvedPortfolio,
        request: &ActionRequest,
    ) -> Result<(Intent, PendingDelta)> {
        let asset = single_asset(request)?;
        let address = self.registry.address_of(asset.label)?;
        ensure_available(asset, resolved.snapshot.borrowed_amount(asset.label))?;
        let wallet = resolved.account_state.balance_of(address);
        ensure_available(asset, wallet)?;

        // Interest accrues between planning and commit; the excess comes back via deposit_batch
        let with_slippage = decimal::mul(
            asset.amount,
            decimal::add(Decimal::ONE, self.repay_slippage)?,
        )?;
        let sent = decimal::round_to_protocol(with_slippage.min(wallet));

        let intent = Intent::Repay {
            badge_id: Self::badge_id(resolved),
            asset: ResourceAmount::new(address, sent),
        };
        let value = self.value_of(resolved, asset.label, asset.amount)?;
        Ok((intent, PendingDelta::Borrow(-value)))
    }
}

fn validate_request(request: &ActionRequest) -> Result<()> {
    if request.assets.is_empty() {
        return Err(LendingError::InvalidIntent(format!(
            "{} request names no asset",
            request.action
        )));
    }
    let mut seen = HashSet::new();
    for asset in &request.assets {
        if asset.amount <= Decimal::ZERO {
            return Err(LendingError::InvalidIntent(format!(
                "{} amount for {} must be positive, got {}",
                request.action, asset.label, asset.amount
            )));
        }
        if !decimal::fits_protocol(asset.amount) {
            return Err(LendingError::InvalidIntent(format!(
                "{} amount for {} has more than {} decimal places: {}",
                request.action,
                asset.label,
                decimal::PROTOCOL_DECIMALS,
                asset.amount
            )));
        }
        if !seen.insert(asset.label) {
            return Err(LendingError::InvalidIntent(format!(
                "{} request lists {} more than once",
                request.action, asset.label
            )));
        }
    }
    Ok(())
}

fn single_asset(request: &ActionRequest) -> Result<&AssetAmount> {
    match request.assets.as_slice() {
        [asset] => Ok(asset),
        _ => Err(LendingError::InvalidIntent(format!(
            "{} takes exactly one asset, got {}",
            request.action,
            request.assets.len()
        ))),
    }
}

fn ensure_available(asset: &AssetAmount, available: Decimal) -> Result<()> {
    if asset.amount > available {
        return Err(LendingError::InsufficientBalance {
            asset: asset.label.to_string(),
            requested: asset.amount,
            available,
        });
    }
    Ok(())
}
