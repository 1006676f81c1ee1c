//! Transaction monitoring and status tracking.
//!
//! After the signing transport accepts a manifest, the client can poll the
//! gateway until the intent commits, fails or the wait times out.

use crate::config::LendingConfig;
use crate::gateway::LedgerQuery;
use crate::types::TransactionStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Transaction monitor for tracking commit status
#[derive(Clone)]
pub struct TransactionMonitor {
    /// Ledger query service
    ledger: Arc<dyn LedgerQuery>,
    /// Default polling options
    options: MonitorOptions,
}

/// Monitoring options
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Poll interval (in milliseconds)
    pub poll_interval_ms: u64,
    /// Timeout (in seconds)
    pub timeout_secs: u64,
}

impl MonitorOptions {
    /// Create from client config
    pub fn from_config(config: &LendingConfig) -> Self {
        Self {
            poll_interval_ms: config.tx_poll_interval_ms,
            timeout_secs: config.tx_timeout_secs,
        }
    }

    /// Set custom poll interval
    pub fn with_poll_interval(mut self, interval_ms: u64) -> Self {
        self.poll_interval_ms = interval_ms;
        self
    }

    /// Set custom timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Transaction monitoring result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorResult {
    /// Intent committed successfully
    Committed,
    /// Intent committed with a failure or was rejected
    Failed(TransactionStatus),
    /// No final status before the timeout
    Timeout,
}

impl TransactionMonitor {
    /// Create a new transaction monitor
    pub fn new(ledger: Arc<dyn LedgerQuery>, options: MonitorOptions) -> Self {
        Self { ledger, options }
    }

    /// Poll an intent until it reaches a final status or times out
    pub async fn monitor(&self, intent_hash: &str, options: &MonitorOptions) -> MonitorResult {
        info!(
            "Monitoring transaction: {} (timeout: {}s)",
            intent_hash, options.timeout_secs
        );

        let start = Instant::now();
        let timeout = Duration::from_secs(options.timeout_secs);
        let poll_interval = Duration::from_millis(options.poll_interval_ms);

        loop {
            if start.elapsed() >= timeout {
                warn!("Transaction monitoring timed out: {}", intent_hash);
                return MonitorResult::Timeout;
            }

            match self.ledger.get_transaction_status(intent_hash).await {
                Ok(TransactionStatus::CommittedSuccess) => {
                    info!("Transaction committed: {}", intent_hash);
                    return MonitorResult::Committed;
                }
                Ok(status) if status.is_final() => {
                    warn!("Transaction {} ended as {}", intent_hash, status);
                    return MonitorResult::Failed(status);
                }
                Ok(status) => {
                    debug!("Transaction {} still {}", intent_hash, status);
                }
                Err(e) => {
                    // Keep polling; the status endpoint lags behind submission
                    debug!("Error fetching transaction status: {:?}", e);
                }
            }

            sleep(poll_interval).await;
        }
    }

    /// Wait for commit with the default options
    ///
    /// Returns true if the intent committed successfully, false if it failed or timed out
    pub async fn wait_for_commit(&self, intent_hash: &str) -> bool {
        self.monitor(intent_hash, &self.options).await == MonitorResult::Committed
    }

    /// Default polling options
    pub fn options(&self) -> &MonitorOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LendingError, Result};
    use crate::types::{AccountState, NonFungibleData};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a fixed sequence of statuses, repeating the last one
    struct ScriptedLedger {
        statuses: Mutex<Vec<Result<TransactionStatus>>>,
    }

    impl ScriptedLedger {
        fn new(statuses: Vec<Result<TransactionStatus>>) -> Arc<Self> {
            Arc::new(Self {
                statuses: Mutex::new(statuses),
            })
        }
    }

    #[async_trait]
    impl LedgerQuery for ScriptedLedger {
        async fn get_account_state(&self, address: &str) -> Result<AccountState> {
            Err(LendingError::AccountNotFound(address.to_string()))
        }

        async fn get_non_fungible_data(
            &self,
            resource: &str,
            _local_id: &str,
        ) -> Result<NonFungibleData> {
            Err(LendingError::GatewayError(resource.to_string()))
        }

        async fn get_transaction_status(&self, _intent_hash: &str) -> Result<TransactionStatus> {
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                statuses.remove(0)
            } else {
                match &statuses[0] {
                    Ok(status) => Ok(*status),
                    Err(e) => Err(LendingError::GatewayError(e.to_string())),
                }
            }
        }
    }

    fn fast_options() -> MonitorOptions {
        MonitorOptions::from_config(&LendingConfig::stokenet())
            .with_poll_interval(5)
            .with_timeout(1)
    }

    #[test]
    fn test_monitor_options_from_config() {
        let config = LendingConfig::stokenet().with_commit_wait(250, 30);
        let options = MonitorOptions::from_config(&config);
        assert_eq!(options.poll_interval_ms, 250);
        assert_eq!(options.timeout_secs, 30);
    }

    #[test]
    fn test_monitor_options_builder() {
        let options = MonitorOptions::from_config(&LendingConfig::stokenet())
            .with_poll_interval(500)
            .with_timeout(120);

        assert_eq!(options.poll_interval_ms, 500);
        assert_eq!(options.timeout_secs, 120);
    }

    #[tokio::test]
    async fn test_monitor_waits_through_pending() {
        let ledger = ScriptedLedger::new(vec![
            Err(LendingError::GatewayError("Status 404: not yet".to_string())),
            Ok(TransactionStatus::Unknown),
            Ok(TransactionStatus::Pending),
            Ok(TransactionStatus::CommittedSuccess),
        ]);
        let monitor = TransactionMonitor::new(ledger, fast_options());
        assert!(monitor.wait_for_commit("txid_tdx_2_1abc").await);
    }

    #[tokio::test]
    async fn test_monitor_reports_failure() {
        let ledger = ScriptedLedger::new(vec![Ok(TransactionStatus::CommittedFailure)]);
        let monitor = TransactionMonitor::new(ledger, fast_options());
        assert_eq!(
            monitor.monitor("txid_tdx_2_1abc", &fast_options()).await,
            MonitorResult::Failed(TransactionStatus::CommittedFailure)
        );
    }

    #[tokio::test]
    async fn test_monitor_times_out() {
        let ledger = ScriptedLedger::new(vec![Ok(TransactionStatus::Pending)]);
        let monitor = TransactionMonitor::new(ledger, fast_options());
        let options = fast_options().with_timeout(0);
        assert_eq!(
            monitor.monitor("txid_tdx_2_1abc", &options).await,
            MonitorResult::Timeout
        );
        assert!(!monitor.wait_for_commit("txid_tdx_2_1abc").await);
    }
}
