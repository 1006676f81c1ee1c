//! Transaction intent construction.
//!
//! [`IntentBuilder`] turns a validated [`Intent`] into a [`TransactionManifest`]:
//! an ordered list of ledger [`Instruction`]s rendered as Radix transaction
//! manifest text. Building is pure; nothing here touches the network.
//!
//! Every sequence ends with `deposit_batch Expression("ENTIRE_WORKTOP")`, so
//! the position badge and any leftover resources always return to the account.

use crate::decimal;
use crate::error::{LendingError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Bucket name the position badge is taken into
pub const BADGE_BUCKET: &str = "position_badge";

/// Ledger operation an intent performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Mint a position badge with an initial supply
    OpenPosition,
    /// Add collateral to an existing position
    Supply,
    /// Borrow against the position
    Borrow,
    /// Redeem supplied collateral
    Withdraw,
    /// Pay back debt
    Repay,
}

impl ActionKind {
    /// Market component method the intent calls
    pub fn component_method(&self) -> &'static str {
        match self {
            ActionKind::OpenPosition => "open_position",
            ActionKind::Supply => "position_supply",
            ActionKind::Borrow => "position_borrow",
            ActionKind::Withdraw => "position_withdraw",
            ActionKind::Repay => "position_repay",
        }
    }

    /// Whether the action can lower the health factor
    pub fn is_health_gated(&self) -> bool {
        matches!(self, ActionKind::Borrow | ActionKind::Withdraw)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.component_method())
    }
}

/// An amount of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAmount {
    /// Resource address
    pub address: String,
    /// Amount
    pub amount: Decimal,
}

impl ResourceAmount {
    /// Create a new resource amount
    pub fn new(address: impl Into<String>, amount: Decimal) -> Self {
        Self {
            address: address.into(),
            amount,
        }
    }
}

/// A typed manifest argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestValue {
    /// `Address("...")`
    Address(String),
    /// `Decimal("...")`
    Decimal(Decimal),
    /// `Bucket("...")`
    Bucket(String),
    /// `Array<Bucket>(...)`
    BucketArray(Vec<String>),
    /// `Array<NonFungibleLocalId>(...)`
    NonFungibleIds(Vec<String>),
    /// `Map<Address, Decimal>(...)`
    AmountMap(Vec<ResourceAmount>),
    /// `Expression("...")`
    Expression(String),
}

impl fmt::Display for ManifestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestValue::Address(address) => write!(f, "Address(\"{}\")", address),
            ManifestValue::Decimal(value) => {
                write!(f, "Decimal(\"{}\")", decimal::to_manifest_string(*value))
            }
            ManifestValue::Bucket(name) => write!(f, "Bucket(\"{}\")", name),
            ManifestValue::BucketArray(names) => {
                let buckets: Vec<String> = names
                    .iter()
                    .map(|name| format!("Bucket(\"{}\")", name))
                    .collect();
                write!(f, "Array<Bucket>({})", buckets.join(", "))
            }
            ManifestValue::NonFungibleIds(ids) => {
                let ids: Vec<String> = ids
                    .iter()
                    .map(|id| format!("NonFungibleLocalId(\"{}\")", id))
                    .collect();
                write!(f, "Array<NonFungibleLocalId>({})", ids.join(", "))
            }
            ManifestValue::AmountMap(entries) => {
                let entries: Vec<String> = entries
                    .iter()
                    .map(|entry| {
                        format!(
                            "Address(\"{}\") => Decimal(\"{}\")",
                            entry.address,
                            decimal::to_manifest_string(entry.amount)
                        )
                    })
                    .collect();
                write!(f, "Map<Address, Decimal>({})", entries.join(", "))
            }
            ManifestValue::Expression(expression) => write!(f, "Expression(\"{}\")", expression),
        }
    }
}

/// One manifest instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Call a method on a component or account
    CallMethod {
        /// Target address
        address: String,
        /// Method name
        method: String,
        /// Positional arguments
        args: Vec<ManifestValue>,
    },
    /// Move a fungible amount from the worktop into a named bucket
    TakeFromWorktop {
        /// Resource address
        resource: String,
        /// Amount
        amount: Decimal,
        /// Bucket name
        bucket: String,
    },
    /// Move specific non-fungibles from the worktop into a named bucket
    TakeNonFungiblesFromWorktop {
        /// Resource address
        resource: String,
        /// Local ids
        ids: Vec<String>,
        /// Bucket name
        bucket: String,
    },
    /// Abort unless the worktop holds at least this amount
    AssertWorktopContains {
        /// Resource address
        resource: String,
        /// Minimum amount
        amount: Decimal,
    },
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::CallMethod {
                address,
                method,
                args,
            } => {
                write!(f, "CALL_METHOD Address(\"{}\") \"{}\"", address, method)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ";")
            }
            Instruction::TakeFromWorktop {
                resource,
                amount,
                bucket,
            } => write!(
                f,
                "TAKE_FROM_WORKTOP Address(\"{}\") {} Bucket(\"{}\");",
                resource,
                ManifestValue::Decimal(*amount),
                bucket
            ),
            Instruction::TakeNonFungiblesFromWorktop {
                resource,
                ids,
                bucket,
            } => write!(
                f,
                "TAKE_NON_FUNGIBLES_FROM_WORKTOP Address(\"{}\") {} Bucket(\"{}\");",
                resource,
                ManifestValue::NonFungibleIds(ids.clone()),
                bucket
            ),
            Instruction::AssertWorktopContains { resource, amount } => write!(
                f,
                "ASSERT_WORKTOP_CONTAINS Address(\"{}\") {};",
                resource,
                ManifestValue::Decimal(*amount)
            ),
        }
    }
}

/// Ordered instruction sequence for one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionManifest {
    /// Action the manifest performs
    pub kind: ActionKind,
    /// Instructions in execution order
    pub instructions: Vec<Instruction>,
}

impl TransactionManifest {
    /// Whether the manifest carries a worktop assertion
    pub fn has_assertion(&self) -> bool {
        self.instructions
            .iter()
            .any(|instruction| matches!(instruction, Instruction::AssertWorktopContains { .. }))
    }
}

impl fmt::Display for TransactionManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in &self.instructions {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}

/// A validated request for one ledger action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Mint a badge with an initial supply
    OpenPosition {
        /// Assets to supply
        assets: Vec<ResourceAmount>,
    },
    /// Supply more collateral
    Supply {
        /// Badge local id
        badge_id: Option<String>,
        /// Assets to supply
        assets: Vec<ResourceAmount>,
    },
    /// Borrow assets
    Borrow {
        /// Badge local id
        badge_id: Option<String>,
        /// Assets to borrow
        assets: Vec<ResourceAmount>,
    },
    /// Redeem pool units for the underlying asset
    Withdraw {
        /// Badge local id
        badge_id: Option<String>,
        /// Pool-unit tokens to hand in
        pool_units: ResourceAmount,
        /// Minimum underlying amount that must come back
        expected: ResourceAmount,
    },
    /// Repay debt
    Repay {
        /// Badge local id
        badge_id: Option<String>,
        /// Asset and amount to send
        asset: ResourceAmount,
    },
}

impl Intent {
    /// Ledger operation this intent performs
    pub fn kind(&self) -> ActionKind {
        match self {
            Intent::OpenPosition { .. } => ActionKind::OpenPosition,
            Intent::Supply { .. } => ActionKind::Supply,
            Intent::Borrow { .. } => ActionKind::Borrow,
            Intent::Withdraw { .. } => ActionKind::Withdraw,
            Intent::Repay { .. } => ActionKind::Repay,
        }
    }
}

/// Builds manifests for one account against the market component
#[derive(Debug, Clone)]
pub struct IntentBuilder {
    component: String,
    account: String,
    badge_resource: String,
}

impl IntentBuilder {
    /// Create a builder
    pub fn new(
        component: impl Into<String>,
        account: impl Into<String>,
        badge_resource: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            account: account.into(),
            badge_resource: badge_resource.into(),
        }
    }

    /// Build the instruction sequence for an intent
    pub fn build(&self, intent: &Intent) -> Result<TransactionManifest> {
        let kind = intent.kind();
        let mut instructions = Vec::new();

        match intent {
            Intent::OpenPosition { assets } => {
                validate_assets(kind, assets)?;
                let buckets = self.take_assets(&mut instructions, assets);
                instructions.push(self.call_component(
                    kind,
                    vec![ManifestValue::BucketArray(buckets)],
                ));
            }
            Intent::Supply { badge_id, assets } => {
                let badge_id = require_badge(kind, badge_id)?;
                validate_assets(kind, assets)?;
                self.take_badge(&mut instructions, badge_id);
                let buckets = self.take_assets(&mut instructions, assets);
                instructions.push(self.call_component(
                    kind,
                    vec![
                        ManifestValue::Bucket(BADGE_BUCKET.to_string()),
                        ManifestValue::BucketArray(buckets),
                    ],
                ));
            }
            Intent::Borrow { badge_id, assets } => {
                let badge_id = require_badge(kind, badge_id)?;
                validate_assets(kind, assets)?;
                self.take_badge(&mut instructions, badge_id);
                instructions.push(self.call_component(
                    kind,
                    vec![
                        ManifestValue::Bucket(BADGE_BUCKET.to_string()),
                        ManifestValue::AmountMap(assets.clone()),
                    ],
                ));
            }
            Intent::Withdraw {
                badge_id,
                pool_units,
                expected,
            } => {
                let badge_id = require_badge(kind, badge_id)?;
                if pool_units.address.is_empty() {
                    return Err(LendingError::InvalidIntent(
                        "pool-unit address is not resolved".to_string(),
                    ));
                }
                validate_amount(kind, pool_units)?;
                validate_amount(kind, expected)?;
                self.take_badge(&mut instructions, badge_id);
                let buckets = self.take_assets(&mut instructions, std::slice::from_ref(pool_units));
                instructions.push(self.call_component(
                    kind,
                    vec![
                        ManifestValue::Bucket(BADGE_BUCKET.to_string()),
                        ManifestValue::Bucket(bucket_arg(buckets)?),
                    ],
                ));
                instructions.push(Instruction::AssertWorktopContains {
                    resource: expected.address.clone(),
                    amount: expected.amount,
                });
            }
            Intent::Repay { badge_id, asset } => {
                let badge_id = require_badge(kind, badge_id)?;
                validate_amount(kind, asset)?;
                self.take_badge(&mut instructions, badge_id);
                let buckets = self.take_assets(&mut instructions, std::slice::from_ref(asset));
                instructions.push(self.call_component(
                    kind,
                    vec![
                        ManifestValue::Bucket(BADGE_BUCKET.to_string()),
                        ManifestValue::Bucket(bucket_arg(buckets)?),
                    ],
                ));
            }
        }

        instructions.push(Instruction::CallMethod {
            address: self.account.clone(),
            method: "deposit_batch".to_string(),
            args: vec![ManifestValue::Expression("ENTIRE_WORKTOP".to_string())],
        });

        debug!("Built {} manifest with {} instructions", kind, instructions.len());
        Ok(TransactionManifest { kind, instructions })
    }

    fn take_badge(&self, instructions: &mut Vec<Instruction>, badge_id: &str) {
        instructions.push(Instruction::CallMethod {
            address: self.account.clone(),
            method: "withdraw_non_fungibles".to_string(),
            args: vec![
                ManifestValue::Address(self.badge_resource.clone()),
                ManifestValue::NonFungibleIds(vec![badge_id.to_string()]),
            ],
        });
        instructions.push(Instruction::TakeNonFungiblesFromWorktop {
            resource: self.badge_resource.clone(),
            ids: vec![badge_id.to_string()],
            bucket: BADGE_BUCKET.to_string(),
        });
    }

    /// Withdraw each asset from the account into `bucket_1..=bucket_n`
    fn take_assets(
        &self,
        instructions: &mut Vec<Instruction>,
        assets: &[ResourceAmount],
    ) -> Vec<String> {
        let mut buckets = Vec::with_capacity(assets.len());
        for (index, asset) in assets.iter().enumerate() {
            let bucket = format!("bucket_{}", index + 1);
            instructions.push(Instruction::CallMethod {
                address: self.account.clone(),
                method: "withdraw".to_string(),
                args: vec![
                    ManifestValue::Address(asset.address.clone()),
                    ManifestValue::Decimal(asset.amount),
                ],
            });
            instructions.push(Instruction::TakeFromWorktop {
                resource: asset.address.clone(),
                amount: asset.amount,
                bucket: bucket.clone(),
            });
            buckets.push(bucket);
        }
        buckets
    }

    fn call_component(&self, kind: ActionKind, args: Vec<ManifestValue>) -> Instruction {
        Instruction::CallMethod {
            address: self.component.clone(),
            method: kind.component_method().to_string(),
            args,
        }
    }
}

fn require_badge(kind: ActionKind, badge_id: &Option<String>) -> Result<&str> {
    match badge_id.as_deref() {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(LendingError::InvalidIntent(format!(
            "{} requires a position badge",
            kind
        ))),
    }
}

fn validate_amount(kind: ActionKind, asset: &ResourceAmount) -> Result<()> {
    if asset.address.is_empty() {
        return Err(LendingError::InvalidIntent(format!(
            "{} references an empty resource address",
            kind
        )));
    }
    if asset.amount <= Decimal::ZERO {
        return Err(LendingError::InvalidIntent(format!(
            "{} amount for {} must be positive, got {}",
            kind, asset.address, asset.amount
        )));
    }
    if !decimal::fits_protocol(asset.amount) {
        return Err(LendingError::InvalidIntent(format!(
            "{} amount for {} has more than {} decimal places: {}",
            kind,
            asset.address,
            decimal::PROTOCOL_DECIMALS,
            asset.amount
        )));
    }
    Ok(())
}

fn validate_assets(kind: ActionKind, assets: &[ResourceAmount]) -> Result<()> {
    if assets.is_empty() {
        return Err(LendingError::InvalidIntent(format!(
            "{} requires at least one asset",
            kind
        )));
    }
    let mut seen = HashSet::new();
    for asset in assets {
        validate_amount(kind, asset)?;
        if !seen.insert(asset.address.as_str()) {
            return Err(LendingError::InvalidIntent(format!(
                "{} lists {} more than once",
                kind, asset.address
            )));
        }
    }
    Ok(())
}

fn bucket_arg(buckets: Vec<String>) -> Result<String> {
    buckets
        .into_iter()
        .next()
        .ok_or_else(|| LendingError::InvalidIntent("no bucket was taken".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    const ACCOUNT: &str = "account_tdx_2_1user";
    const COMPONENT: &str = "component_tdx_2_1market";
    const BADGE: &str = "resource_tdx_2_1badge";
    const XRD: &str = "resource_tdx_2_1xrd";
    const HUG: &str = "resource_tdx_2_1hug";
    const XRD_POOL_UNIT: &str = "resource_tdx_2_1xrdpu";

    fn builder() -> IntentBuilder {
        IntentBuilder::new(COMPONENT, ACCOUNT, BADGE)
    }

    fn badge() -> Option<String> {
        Some("#1#".to_string())
    }

    #[test]
    fn test_repay_manifest_text() {
        let manifest = builder()
            .build(&Intent::Repay {
                badge_id: badge(),
                asset: ResourceAmount::new(XRD, dec!(100.5)),
            })
            .unwrap();

        let expected = "\
CALL_METHOD Address(\"account_tdx_2_1user\") \"withdraw_non_fungibles\" Address(\"resource_tdx_2_1badge\") Array<NonFungibleLocalId>(NonFungibleLocalId(\"#1#\"));
TAKE_NON_FUNGIBLES_FROM_WORKTOP Address(\"resource_tdx_2_1badge\") Array<NonFungibleLocalId>(NonFungibleLocalId(\"#1#\")) Bucket(\"position_badge\");
CALL_METHOD Address(\"account_tdx_2_1user\") \"withdraw\" Address(\"resource_tdx_2_1xrd\") Decimal(\"100.5\");
TAKE_FROM_WORKTOP Address(\"resource_tdx_2_1xrd\") Decimal(\"100.5\") Bucket(\"bucket_1\");
CALL_METHOD Address(\"component_tdx_2_1market\") \"position_repay\" Bucket(\"position_badge\") Bucket(\"bucket_1\");
CALL_METHOD Address(\"account_tdx_2_1user\") \"deposit_batch\" Expression(\"ENTIRE_WORKTOP\");
";
        assert_eq!(manifest.to_string(), expected);
        assert_eq!(manifest.kind, ActionKind::Repay);
    }

    #[test]
    fn test_open_position_takes_every_asset() {
        let manifest = builder()
            .build(&Intent::OpenPosition {
                assets: vec![
                    ResourceAmount::new(XRD, dec!(10)),
                    ResourceAmount::new(HUG, dec!(20)),
                ],
            })
            .unwrap();

        let text = manifest.to_string();
        assert!(!text.contains("withdraw_non_fungibles"));
        assert!(text.contains(
            "\"open_position\" Array<Bucket>(Bucket(\"bucket_1\"), Bucket(\"bucket_2\"));"
        ));
        assert_eq!(manifest.instructions.len(), 6);
    }

    #[test]
    fn test_supply_passes_badge_and_buckets() {
        let manifest = builder()
            .build(&Intent::Supply {
                badge_id: badge(),
                assets: vec![ResourceAmount::new(XRD, dec!(10))],
            })
            .unwrap();
        assert!(manifest.to_string().contains(
            "\"position_supply\" Bucket(\"position_badge\") Array<Bucket>(Bucket(\"bucket_1\"));"
        ));
    }

    #[test]
    fn test_borrow_passes_amount_map() {
        let manifest = builder()
            .build(&Intent::Borrow {
                badge_id: badge(),
                assets: vec![
                    ResourceAmount::new(XRD, dec!(1.50)),
                    ResourceAmount::new(HUG, dec!(3)),
                ],
            })
            .unwrap();

        let text = manifest.to_string();
        assert!(text.contains(
            "\"position_borrow\" Bucket(\"position_badge\") Map<Address, Decimal>(Address(\"resource_tdx_2_1xrd\") => Decimal(\"1.5\"), Address(\"resource_tdx_2_1hug\") => Decimal(\"3\"));"
        ));
        assert!(!text.contains("\"withdraw\""));
    }

    #[test]
    fn test_withdraw_appends_assertion() {
        let manifest = builder()
            .build(&Intent::Withdraw {
                badge_id: badge(),
                pool_units: ResourceAmount::new(XRD_POOL_UNIT, dec!(95)),
                expected: ResourceAmount::new(XRD, dec!(100)),
            })
            .unwrap();

        assert!(manifest.has_assertion());
        let lines: Vec<String> = manifest
            .instructions
            .iter()
            .map(|instruction| instruction.to_string())
            .collect();
        assert_eq!(
            lines[4],
            "CALL_METHOD Address(\"component_tdx_2_1market\") \"position_withdraw\" Bucket(\"position_badge\") Bucket(\"bucket_1\");"
        );
        assert_eq!(
            lines[5],
            "ASSERT_WORKTOP_CONTAINS Address(\"resource_tdx_2_1xrd\") Decimal(\"100\");"
        );
    }

    #[test]
    fn test_every_sequence_ends_with_deposit_batch() {
        let intents = vec![
            Intent::OpenPosition {
                assets: vec![ResourceAmount::new(XRD, dec!(1))],
            },
            Intent::Supply {
                badge_id: badge(),
                assets: vec![ResourceAmount::new(XRD, dec!(1))],
            },
            Intent::Borrow {
                badge_id: badge(),
                assets: vec![ResourceAmount::new(XRD, dec!(1))],
            },
            Intent::Withdraw {
                badge_id: badge(),
                pool_units: ResourceAmount::new(XRD_POOL_UNIT, dec!(1)),
                expected: ResourceAmount::new(XRD, dec!(1)),
            },
            Intent::Repay {
                badge_id: badge(),
                asset: ResourceAmount::new(XRD, dec!(1)),
            },
        ];

        for intent in intents {
            let manifest = builder().build(&intent).unwrap();
            assert_eq!(
                manifest.instructions.last().unwrap().to_string(),
                "CALL_METHOD Address(\"account_tdx_2_1user\") \"deposit_batch\" Expression(\"ENTIRE_WORKTOP\");"
            );
        }
    }

    #[test]
    fn test_withdraw_zero_is_invalid() {
        let result = builder().build(&Intent::Withdraw {
            badge_id: badge(),
            pool_units: ResourceAmount::new(XRD_POOL_UNIT, Decimal::ZERO),
            expected: ResourceAmount::new(XRD, Decimal::ZERO),
        });
        assert_matches!(result, Err(LendingError::InvalidIntent(_)));
    }

    #[test]
    fn test_withdraw_requires_pool_unit_address() {
        let result = builder().build(&Intent::Withdraw {
            badge_id: badge(),
            pool_units: ResourceAmount::new("", dec!(1)),
            expected: ResourceAmount::new(XRD, dec!(1)),
        });
        assert_matches!(result, Err(LendingError::InvalidIntent(msg)) if msg.contains("pool-unit"));
    }

    #[test]
    fn test_amount_beyond_ledger_precision_is_invalid() {
        let result = builder().build(&Intent::Supply {
            badge_id: badge(),
            assets: vec![ResourceAmount::new(XRD, dec!(1.00000000000000000001))],
        });
        assert_matches!(result, Err(LendingError::InvalidIntent(msg)) if msg.contains("decimal places"));

        let result = builder().build(&Intent::Withdraw {
            badge_id: badge(),
            pool_units: ResourceAmount::new(XRD_POOL_UNIT, dec!(95.12345678901234567890123457)),
            expected: ResourceAmount::new(XRD, dec!(95)),
        });
        assert_matches!(result, Err(LendingError::InvalidIntent(_)));
    }

    #[test]
    fn test_missing_badge_is_invalid() {
        for badge_id in [None, Some(String::new())] {
            let result = builder().build(&Intent::Borrow {
                badge_id,
                assets: vec![ResourceAmount::new(XRD, dec!(1))],
            });
            assert_matches!(result, Err(LendingError::InvalidIntent(_)));
        }
    }

    #[test]
    fn test_asset_list_validation() {
        assert_matches!(
            builder().build(&Intent::OpenPosition { assets: vec![] }),
            Err(LendingError::InvalidIntent(_))
        );
        assert_matches!(
            builder().build(&Intent::Supply {
                badge_id: badge(),
                assets: vec![
                    ResourceAmount::new(XRD, dec!(1)),
                    ResourceAmount::new(XRD, dec!(2)),
                ],
            }),
            Err(LendingError::InvalidIntent(_))
        );
        assert_matches!(
            builder().build(&Intent::Repay {
                badge_id: badge(),
                asset: ResourceAmount::new(XRD, dec!(-1)),
            }),
            Err(LendingError::InvalidIntent(_))
        );
    }
}
