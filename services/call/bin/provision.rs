//! Conversation provisioning entrypoint.
//!
//! Creates the skin doctor persona and a conversation with the configured replica,
//! then prints the URL to join. Takes no arguments; `TAVUS_API_KEY` and `RUST_LOG`
//! come from the environment (or a `.env` file).

use anyhow::Context;
use skin_doctor_call::config::Config;
use skin_doctor_core::{
    persona::PersonaConfig,
    provisioning::{TavusClient, provision_conversation},
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Provisioning conversation...");

    // --- 3. Provision ---
    let client = TavusClient::new(config.api_base.clone(), config.api_key);
    let persona = PersonaConfig::skin_doctor().context("Failed to build persona document")?;
    let url = provision_conversation(&client, &persona, &config.replica_id)
        .await
        .context("Failed to create call")?;

    info!(%url, "Conversation ready");
    println!("{url}");
    Ok(())
}
