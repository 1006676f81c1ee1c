//! Signing transport seam.
//!
//! The wallet that signs and submits manifests is outside this crate; the
//! client only needs to hand it a manifest and learn whether it was accepted.

use crate::error::Result;
use crate::manifest::TransactionManifest;
use crate::types::SubmissionReceipt;
use async_trait::async_trait;

/// Signs and submits a transaction manifest
#[async_trait]
pub trait SigningTransport: Send + Sync {
    /// Submit a manifest, returning the intent hash once the wallet accepted it
    async fn submit(&self, manifest: &TransactionManifest) -> Result<SubmissionReceipt>;
}
