//! Error types for the lending client.
//!
//! This module defines every error that can occur while resolving a position,
//! validating an action, building a transaction manifest or talking to the
//! gateway, price service and signing transport.

use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for lending client operations
#[derive(Error, Debug)]
pub enum LendingError {
    /// Invalid decimal operation (division by a non-positive divisor, overflow)
    #[error("Arithmetic error: {0}")]
    ArithmeticError(String),

    /// Cluster ratios are missing or not strictly positive
    #[error("Cluster state unavailable: {0}")]
    ClusterStateUnavailable(String),

    /// No usable price for an asset
    #[error("Price unavailable: {0}")]
    PriceUnavailable(String),

    /// Requested amount exceeds what the account or position holds
    #[error("Insufficient balance for {asset}: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Asset label
        asset: String,
        /// Requested amount
        requested: Decimal,
        /// Amount actually available
        available: Decimal,
    },

    /// The action would push the health factor under the protocol minimum
    #[error("Health factor {projected} would fall below minimum {minimum}")]
    HealthFactorViolation {
        /// Projected health factor after the action
        projected: Decimal,
        /// Minimum health factor
        minimum: Decimal,
    },

    /// The intent builder was handed an inconsistent intent
    #[error("Invalid intent: {0}")]
    InvalidIntent(String),

    /// Another mutating action is already running for this account
    #[error("Action already in progress for account {0}")]
    ActionInProgress(String),

    /// Submission failed or produced no result
    #[error("Ledger submission failed: {0}")]
    LedgerSubmissionFailed(String),

    /// Asset label or address not present in the registry
    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    /// Error returned by the gateway API
    #[error("Gateway API error: {0}")]
    GatewayError(String),

    /// Error returned by the price/cluster service
    #[error("Market data error: {0}")]
    MarketDataError(String),

    /// Network communication error
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {0} seconds")]
    RateLimitExceeded(u64),

    /// Max retries exceeded
    #[error("Max retries ({0}) exceeded")]
    MaxRetriesExceeded(usize),

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(String),
}

/// Result type alias for lending client operations
pub type Result<T> = std::result::Result<T, LendingError>;

/// Error context for retryable operations
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Number of attempts made
    pub attempts: usize,
    /// Last error encountered
    pub last_error: String,
    /// Total time spent retrying (in milliseconds)
    pub total_time_ms: u64,
}

impl RetryContext {
    /// Create a new retry context
    pub fn new() -> Self {
        Self {
            attempts: 0,
            last_error: String::new(),
            total_time_ms: 0,
        }
    }

    /// Record an attempt
    pub fn record_attempt(&mut self, error: &str, duration_ms: u64) {
        self.attempts += 1;
        self.last_error = error.to_string();
        self.total_time_ms += duration_ms;
    }
}

impl Default for RetryContext {
    fn default() -> Self {
        Self::new()
    }
}
