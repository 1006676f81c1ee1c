//! Example: Preview an action
//!
//! Validates an action against the live position, prints the health factor
//! before and after, and prints the manifest that would be signed. With
//! `LATTIC3_SUBMIT=1` the manifest is handed to a dry-run transport instead.
//!
//! ```text
//! LATTIC3_ACCOUNT=account_tdx_2_1... \
//! LATTIC3_DAPP_CONFIG=path/to/config.json \
//! cargo run --example preview_action -- borrow xUSDT 25
//! ```

use anyhow::{bail, Context};
use async_trait::async_trait;
use lattic3_client::{
    ActionRequest, AssetName, LendingClient, LendingConfig, LendingError, ProtocolAddresses,
    SigningTransport, SubmissionReceipt, TransactionManifest,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Prints the manifest instead of signing it
struct DryRunTransport;

#[async_trait]
impl SigningTransport for DryRunTransport {
    async fn submit(&self, manifest: &TransactionManifest) -> lattic3_client::Result<SubmissionReceipt> {
        info!("Dry run: {} instructions", manifest.instructions.len());
        println!("--- dry-run submission ---\n{}", manifest);
        Ok(SubmissionReceipt::new("txid_dry_run"))
    }
}

fn parse_request(args: &[String]) -> anyhow::Result<ActionRequest> {
    let [action, asset, amount] = args else {
        bail!("usage: preview_action <supply|borrow|withdraw|repay> <XRD|xUSDT|HUG> <amount>");
    };
    let label = AssetName::from_str(asset)?;
    let amount = Decimal::from_str(amount).with_context(|| format!("invalid amount {}", amount))?;

    Ok(match action.as_str() {
        "supply" => ActionRequest::supply(label, amount),
        "borrow" => ActionRequest::borrow(label, amount),
        "withdraw" => ActionRequest::withdraw(label, amount),
        "repay" => ActionRequest::repay(label, amount),
        other => bail!("unknown action {}", other),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lattic3_client=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let request = parse_request(&args)?;

    let account = std::env::var("LATTIC3_ACCOUNT").context("LATTIC3_ACCOUNT is not set")?;
    let dapp_config_path =
        std::env::var("LATTIC3_DAPP_CONFIG").unwrap_or_else(|_| "config.json".to_string());
    let dapp_config = std::fs::read_to_string(&dapp_config_path)
        .with_context(|| format!("reading {}", dapp_config_path))?;

    let config = LendingConfig::stokenet()
        .with_protocol_addresses(ProtocolAddresses::from_json(&dapp_config)?);
    let client = LendingClient::connect(Arc::new(config), Arc::new(DryRunTransport))?;

    println!("=== Lattic3 Action Preview ===\n");
    let plan = match client.preview(&account, &request).await {
        Ok(plan) => plan,
        Err(LendingError::HealthFactorViolation { projected, minimum }) => {
            eprintln!(
                "✗ Rejected: health factor would drop to {:.2} (minimum {})",
                projected, minimum
            );
            return Ok(());
        }
        Err(LendingError::InsufficientBalance {
            asset,
            requested,
            available,
        }) => {
            eprintln!(
                "✗ Rejected: {} {} requested, only {} available",
                requested, asset, available
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("Action:        {} ({})", request.action, plan.kind);
    println!("Health factor: {} -> {}", plan.projection.current, plan.projection.projected);
    println!();
    println!("{}", plan.manifest);

    if std::env::var("LATTIC3_SUBMIT").as_deref() == Ok("1") {
        let outcome = client.execute(&account, &request).await?.into_result()?;
        if let Some(snapshot) = outcome.snapshot {
            println!("✓ Health factor after refresh: {}", snapshot.health_factor);
        }
    }

    Ok(())
}
