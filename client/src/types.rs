//! Common types used across the lending client.
//!
//! This module defines the ledger-facing data structures returned by the
//! gateway and the receipts handed back by the signing transport.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Account address type
pub type AccountAddress = String;

/// Resource address type
pub type ResourceAddress = String;

/// Transaction intent hash type
pub type IntentHash = String;

/// Fungible balances and non-fungible holdings of one account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    /// Account address
    pub address: AccountAddress,
    /// Fungible balances keyed by resource address
    pub fungible_balances: HashMap<ResourceAddress, Decimal>,
    /// Non-fungible local ids keyed by resource address
    pub non_fungible_positions: HashMap<ResourceAddress, Vec<String>>,
}

impl AccountState {
    /// Balance of a fungible resource, zero when the account holds none
    pub fn balance_of(&self, resource: &str) -> Decimal {
        self.fungible_balances
            .get(resource)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// First local id held for a non-fungible resource
    pub fn first_non_fungible(&self, resource: &str) -> Option<&str> {
        self.non_fungible_positions
            .get(resource)
            .and_then(|ids| ids.first())
            .map(String::as_str)
    }
}

/// One key/value entry of a non-fungible data field map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldEntry {
    /// Entry key (a resource address for position maps)
    pub key: String,
    /// Entry value (a decimal string for position maps)
    pub value: String,
}

/// A named field of non-fungible data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataField {
    /// Field name
    pub name: String,
    /// Map entries (empty for scalar fields)
    pub entries: Vec<FieldEntry>,
}

/// Data attached to one non-fungible
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonFungibleData {
    /// Non-fungible resource address
    pub resource: ResourceAddress,
    /// Local id
    pub local_id: String,
    /// Top-level data fields
    pub fields: Vec<DataField>,
}

/// Commit status of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Not yet seen by the network
    Unknown,
    /// Seen, not yet committed
    Pending,
    /// Committed and succeeded
    CommittedSuccess,
    /// Committed but failed
    CommittedFailure,
    /// Rejected before commit
    Rejected,
}

impl TransactionStatus {
    /// Whether the status will not change anymore
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            TransactionStatus::CommittedSuccess
                | TransactionStatus::CommittedFailure
                | TransactionStatus::Rejected
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Unknown => write!(f, "Unknown"),
            TransactionStatus::Pending => write!(f, "Pending"),
            TransactionStatus::CommittedSuccess => write!(f, "CommittedSuccess"),
            TransactionStatus::CommittedFailure => write!(f, "CommittedFailure"),
            TransactionStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Receipt returned by the signing transport once a manifest was submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// Transaction intent hash
    pub intent_hash: IntentHash,
    /// When the transport accepted the manifest
    pub submitted_at: DateTime<Utc>,
}

impl SubmissionReceipt {
    /// Receipt stamped with the current time
    pub fn new(intent_hash: impl Into<IntentHash>) -> Self {
        Self {
            intent_hash: intent_hash.into(),
            submitted_at: Utc::now(),
        }
    }
}
