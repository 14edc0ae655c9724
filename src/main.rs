//! Axiom Ledger service
//!
//! Serves the compliance trackers over HTTP. All configuration comes from the
//! environment; see `LedgerConfig` for the variables.

use anyhow::{Context, Result};
use tracing::info;

use axiom_ledger::{run_server, telemetry, LedgerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    telemetry::init().context("Failed to initialise logging")?;

    let config = LedgerConfig::from_env();
    info!(
        "Starting axiom ledger v{} (data dir: {})",
        env!("CARGO_PKG_VERSION"),
        config.data_dir.display()
    );

    run_server(config).await.context("Ledger server failed")?;
    Ok(())
}
