//! Example: Portfolio overview
//!
//! Resolves an account's lending position on Stokenet and prints supply,
//! borrow, health factor and wallet balances.
//!
//! ```text
//! LATTIC3_ACCOUNT=account_tdx_2_1... \
//! LATTIC3_DAPP_CONFIG=path/to/config.json \
//! cargo run --example portfolio_overview
//! ```

use anyhow::Context;
use async_trait::async_trait;
use lattic3_client::decimal::to_display;
use lattic3_client::{
    LendingClient, LendingConfig, PositionSide, ProtocolAddresses, SigningTransport,
    SubmissionReceipt, TransactionManifest,
};
use std::sync::Arc;

/// Read-only example: nothing is ever submitted
struct ReadOnlyTransport;

#[async_trait]
impl SigningTransport for ReadOnlyTransport {
    async fn submit(&self, _manifest: &TransactionManifest) -> lattic3_client::Result<SubmissionReceipt> {
        Err(lattic3_client::LendingError::LedgerSubmissionFailed(
            "read-only transport".to_string(),
        ))
    }
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

    println!("=== Lattic3 Portfolio Overview ===\n");

    let account = std::env::var("LATTIC3_ACCOUNT").context("LATTIC3_ACCOUNT is not set")?;
    let dapp_config_path =
        std::env::var("LATTIC3_DAPP_CONFIG").unwrap_or_else(|_| "config.json".to_string());
    let dapp_config = std::fs::read_to_string(&dapp_config_path)
        .with_context(|| format!("reading {}", dapp_config_path))?;

    let mut config = LendingConfig::stokenet()
        .with_protocol_addresses(ProtocolAddresses::from_json(&dapp_config)?);
    if let Ok(url) = std::env::var("LATTIC3_MARKET_API") {
        config = config.with_market_api_url(url);
    }
    println!("Network: {:?}", config.network);
    println!("Gateway URL: {}", config.gateway_url);
    println!("Market API URL: {}\n", config.market_api_url);

    let client = LendingClient::connect(Arc::new(config), Arc::new(ReadOnlyTransport))?;
    println!("✓ Lending client initialized\n");

    let snapshot = client.resolve_portfolio(&account).await?;
    match &snapshot.badge {
        Some(badge) => println!("Position badge: {} {}", badge.resource, badge.local_id),
        None => println!("No position opened yet"),
    }
    println!();

    for side in [PositionSide::Supply, PositionSide::Borrow] {
        println!("{}:", side);
        for entry in snapshot.entries(side) {
            println!(
                "  - {:<6} {:>18.6} (value {:>12.2}, units {})",
                entry.asset.label,
                to_display(entry.amount),
                to_display(entry.value),
                entry.units
            );
        }
        println!(
            "  average rate: {:.2}%",
            to_display(snapshot.average_rate(side)?)
        );
    }
    println!();

    println!("Total supplied: {:.2}", to_display(snapshot.total_supply_value));
    println!("Total borrowed: {:.2}", to_display(snapshot.total_borrow_value));
    println!("Net worth:      {:.2}", to_display(snapshot.net_worth()?));
    println!("Health factor:  {}", snapshot.health_factor);
    println!();

    println!("Wallet:");
    for asset in client.available_assets(&account).await? {
        println!(
            "  - {:<6} {:>18.6}",
            asset.label,
            to_display(asset.wallet_balance)
        );
    }

    Ok(())
}
