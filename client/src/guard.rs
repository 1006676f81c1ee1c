//! Per-account in-flight guard.
//!
//! At most one mutating action runs per account. A second attempt while one
//! is outstanding fails fast with [`LendingError::ActionInProgress`]; the slot
//! frees when the first action's [`ActionPermit`] is dropped.

use crate::error::{LendingError, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Tracks accounts with an action in flight
#[derive(Debug, Clone, Default)]
pub struct ActionGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl ActionGuard {
    /// Create an empty guard
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the account, failing if an action is already running on it
    pub fn try_begin(&self, account: &str) -> Result<ActionPermit> {
        if !self.lock().insert(account.to_string()) {
            debug!("Action already in flight for {}", account);
            return Err(LendingError::ActionInProgress(account.to_string()));
        }
        Ok(ActionPermit {
            guard: self.clone(),
            account: account.to_string(),
        })
    }

    /// Whether an action is running for the account
    pub fn is_busy(&self, account: &str) -> bool {
        self.lock().contains(account)
    }
}

/// Exclusive claim on one account; released on drop
#[derive(Debug)]
pub struct ActionPermit {
    guard: ActionGuard,
    account: String,
}

impl ActionPermit {
    /// Account this permit holds
    pub fn account(&self) -> &str {
        &self.account
    }
}

impl Drop for ActionPermit {
    fn drop(&mut self) {
        self.guard.lock().remove(&self.account);
    }
}
