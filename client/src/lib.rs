//! Lattic3 Lending Client
//!
//! This library implements the position accounting and transaction-intent
//! engine of a client for the Lattic3 collateralized lending market on Radix.
//! It reads a user's position badge through the Radix Gateway, converts
//! position units to asset amounts with the market's cluster ratios, computes
//! the health factor, and builds the transaction manifests for supply, borrow,
//! withdraw and repay.
//!
//! # Features
//!
//! - **Exact Decimal Math**: All amounts, ratios and prices use `rust_decimal` at 18 dp
//! - **Position Resolution**: Badge data, wallet balances, cluster ratios and prices joined into a snapshot
//! - **Solvency Gating**: Borrow and withdraw are rejected before any manifest exists when they would break the minimum health factor
//! - **Manifest Building**: Radix transaction manifest text for every action
//! - **Action Guard**: At most one mutating action per account
//! - **Transaction Monitoring**: Optional commit polling after submission
//! - **Retry Logic**: Exponential backoff for transient gateway and price-service errors
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use lattic3_client::{LendingClient, LendingConfig, SigningTransport};
//! use std::sync::Arc;
//!
//! # async fn run(transport: Arc<dyn SigningTransport>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(
//!     LendingConfig::stokenet().with_protocol("component_tdx_2_1...", "resource_tdx_2_1..."),
//! );
//! let client = LendingClient::connect(config, transport)?;
//!
//! let snapshot = client.resolve_portfolio("account_tdx_2_1...").await?;
//! println!("Health factor: {}", snapshot.health_factor);
//! # Ok(())
//! # }
//! ```
//!
//! # Examples
//!
//! ## Borrow against a position
//!
//! ```rust,no_run
//! use lattic3_client::{AssetName, LendingClient};
//! use rust_decimal_macros::dec;
//!
//! # async fn run(client: LendingClient) -> Result<(), Box<dyn std::error::Error>> {
//! let outcome = client
//!     .borrow("account_tdx_2_1...", AssetName::XUsdt, dec!(25))
//!     .await?;
//!
//! if outcome.is_committed() {
//!     println!("New health factor: {:?}", outcome.snapshot.map(|s| s.health_factor));
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

// Re-export main types and modules
pub mod actions;
pub mod assets;
pub mod config;
pub mod conversion;
pub mod decimal;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod manifest;
pub mod market;
pub mod monitor;
pub mod position;
pub mod retry;
pub mod solvency;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use actions::{ActionPlan, ActionPlanner, ActionRequest, AssetAmount, UserAction};
pub use assets::{Asset, AssetConfig, AssetName, AssetRegistry};
pub use config::{LendingConfig, Network, ProtocolAddresses};
pub use conversion::{ClusterState, ClusterStates, UnitConverter};
pub use error::{LendingError, Result};
pub use gateway::{GatewayClient, LedgerQuery};
pub use guard::{ActionGuard, ActionPermit};
pub use manifest::{ActionKind, Instruction, Intent, IntentBuilder, TransactionManifest};
pub use market::{MarketData, MarketDataClient, PriceBook};
pub use monitor::{MonitorOptions, MonitorResult, TransactionMonitor};
pub use position::{
    PortfolioSnapshot, Position, PositionEntry, PositionResolver, PositionSide, PositionState,
};
pub use retry::RetryStrategy;
pub use solvency::{HealthFactor, HealthProjection, SolvencyCalculator};
pub use transport::SigningTransport;
pub use types::{AccountAddress, AccountState, SubmissionReceipt, TransactionStatus};

use std::sync::Arc;
use tracing::{error, info, warn};

/// How a submission attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// Accepted by the transport (and committed, when waiting for commit)
    Succeeded(SubmissionReceipt),
    /// Rejected, failed on ledger, or produced no result in time
    Failed {
        /// Receipt, when the transport accepted the manifest before it failed
        receipt: Option<SubmissionReceipt>,
        /// What went wrong
        reason: String,
    },
}

/// Result of an executed action
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    /// The plan that was submitted
    pub plan: ActionPlan,
    /// How submission ended
    pub submission: SubmissionOutcome,
    /// Position re-resolved after submission, `None` if that refresh failed
    pub snapshot: Option<PortfolioSnapshot>,
}

impl ActionOutcome {
    /// Whether submission succeeded
    pub fn is_committed(&self) -> bool {
        matches!(self.submission, SubmissionOutcome::Succeeded(_))
    }

    /// Turn a failed submission into [`LendingError::LedgerSubmissionFailed`]
    pub fn into_result(self) -> Result<Self> {
        match &self.submission {
            SubmissionOutcome::Succeeded(_) => Ok(self),
            SubmissionOutcome::Failed { reason, .. } => {
                Err(LendingError::LedgerSubmissionFailed(reason.clone()))
            }
        }
    }
}

/// Main lending client tying position resolution, planning, submission and
/// monitoring together.
///
/// Collaborators are injected, so the same client runs against the real
/// gateway or in-process doubles.
#[derive(Clone)]
pub struct LendingClient {
    /// Configuration
    config: Arc<LendingConfig>,
    /// Asset registry
    registry: Arc<AssetRegistry>,
    /// Ledger query service
    ledger: Arc<dyn LedgerQuery>,
    /// Signing transport
    transport: Arc<dyn SigningTransport>,
    /// Position resolver
    resolver: PositionResolver,
    /// Action planner
    planner: ActionPlanner,
    /// Per-account action guard
    guard: ActionGuard,
    /// Commit monitor, when waiting for commit
    monitor: Option<TransactionMonitor>,
}

impl LendingClient {
    /// Create a lending client from explicit collaborators
    ///
    /// # Arguments
    ///
    /// * `config` - Client configuration
    /// * `ledger` - Ledger query service
    /// * `market` - Price and cluster service
    /// * `transport` - Signing transport
    pub fn new(
        config: Arc<LendingConfig>,
        ledger: Arc<dyn LedgerQuery>,
        market: Arc<dyn MarketData>,
        transport: Arc<dyn SigningTransport>,
    ) -> Result<Self> {
        // Validate configuration
        config.validate()?;

        info!("Initializing lending client for network: {:?}", config.network);

        let registry = Arc::new(config.asset_registry()?);
        let resolver = PositionResolver::new(
            ledger.clone(),
            market,
            registry.clone(),
            config.position_badge_address.clone(),
        );
        let planner = ActionPlanner::from_config(&config, registry.clone());
        let monitor = config.wait_for_commit.then(|| {
            TransactionMonitor::new(ledger.clone(), MonitorOptions::from_config(&config))
        });

        Ok(Self {
            config,
            registry,
            ledger,
            transport,
            resolver,
            planner,
            guard: ActionGuard::new(),
            monitor,
        })
    }

    /// Create a lending client talking to the configured gateway and price service
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use lattic3_client::{LendingClient, LendingConfig, SigningTransport};
    /// use std::sync::Arc;
    ///
    /// # fn run(transport: Arc<dyn SigningTransport>) {
    /// let config = Arc::new(
    ///     LendingConfig::stokenet().with_protocol("component_tdx_2_1...", "resource_tdx_2_1..."),
    /// );
    /// let client = LendingClient::connect(config, transport).unwrap();
    /// # }
    /// ```
    pub fn connect(config: Arc<LendingConfig>, transport: Arc<dyn SigningTransport>) -> Result<Self> {
        let ledger = Arc::new(GatewayClient::new(config.clone())?);
        let market = Arc::new(MarketDataClient::new(config.clone())?);
        Self::new(config, ledger, market, transport)
    }

    /// Get configuration
    pub fn config(&self) -> &LendingConfig {
        &self.config
    }

    /// Get the asset registry
    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    /// Resolve an account's position into a priced snapshot
    pub async fn resolve_portfolio(&self, account: &str) -> Result<PortfolioSnapshot> {
        Ok(self.resolver.resolve(account).await?.snapshot)
    }

    /// Listed assets with the account's wallet balances
    pub async fn available_assets(&self, account: &str) -> Result<Vec<Asset>> {
        let state = self.ledger.get_account_state(account).await?;
        self.registry
            .iter()
            .map(|config| self.registry.asset(config.label, state.balance_of(&config.address)))
            .collect()
    }

    /// Validate a request and build its manifest without submitting
    pub async fn preview(&self, account: &str, request: &ActionRequest) -> Result<ActionPlan> {
        let resolved = self.resolver.resolve(account).await?;
        self.planner.plan(account, &resolved, request)
    }

    /// Execute an action: resolve, validate, build, submit, then re-resolve
    ///
    /// Validation errors are returned before anything is submitted. Once a
    /// manifest was handed to the transport the position is always
    /// re-resolved, and submission failures are reported in the outcome.
    pub async fn execute(&self, account: &str, request: &ActionRequest) -> Result<ActionOutcome> {
        let _permit = self.guard.try_begin(account)?;

        let resolved = self.resolver.resolve(account).await?;
        let plan = self.planner.plan(account, &resolved, request)?;

        info!("Submitting {} for {}", plan.kind, account);
        let submission = self.submit(&plan.manifest).await;

        let snapshot = match self.resolver.resolve(account).await {
            Ok(resolved) => Some(resolved.snapshot),
            Err(e) => {
                error!("Failed to refresh position for {} after submission: {}", account, e);
                None
            }
        };

        Ok(ActionOutcome {
            plan,
            submission,
            snapshot,
        })
    }

    async fn submit(&self, manifest: &TransactionManifest) -> SubmissionOutcome {
        let receipt = match self.transport.submit(manifest).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!("Submission failed: {}", e);
                return SubmissionOutcome::Failed {
                    receipt: None,
                    reason: e.to_string(),
                };
            }
        };

        let Some(monitor) = &self.monitor else {
            return SubmissionOutcome::Succeeded(receipt);
        };

        match monitor.monitor(&receipt.intent_hash, monitor.options()).await {
            MonitorResult::Committed => SubmissionOutcome::Succeeded(receipt),
            MonitorResult::Failed(status) => SubmissionOutcome::Failed {
                reason: format!("transaction {} ended as {}", receipt.intent_hash, status),
                receipt: Some(receipt),
            },
            MonitorResult::Timeout => SubmissionOutcome::Failed {
                reason: format!("transaction {} did not commit in time", receipt.intent_hash),
                receipt: Some(receipt),
            },
        }
    }

    /// Supply one asset
    pub async fn supply(
        &self,
        account: &str,
        label: AssetName,
        amount: rust_decimal::Decimal,
    ) -> Result<ActionOutcome> {
        self.execute(account, &ActionRequest::supply(label, amount))
            .await
    }

    /// Borrow one asset
    pub async fn borrow(
        &self,
        account: &str,
        label: AssetName,
        amount: rust_decimal::Decimal,
    ) -> Result<ActionOutcome> {
        self.execute(account, &ActionRequest::borrow(label, amount))
            .await
    }

    /// Withdraw one supplied asset
    pub async fn withdraw(
        &self,
        account: &str,
        label: AssetName,
        amount: rust_decimal::Decimal,
    ) -> Result<ActionOutcome> {
        self.execute(account, &ActionRequest::withdraw(label, amount))
            .await
    }

    /// Repay one borrowed asset
    pub async fn repay(
        &self,
        account: &str,
        label: AssetName,
        amount: rust_decimal::Decimal,
    ) -> Result<ActionOutcome> {
        self.execute(account, &ActionRequest::repay(label, amount))
            .await
    }
}
