use anyhow::{Context, Result};
use std::sync::Arc;

use odc_gee::auth::{GoogleCredentialProvider, SessionContext};
use odc_gee::config::Config;
use odc_gee::engine::EarthEngineClient;
use odc_gee::loader::AuthenticatedLoader;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    // Logs go to stderr so stdout carries only the dataset
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("odc-gee {} starting...", env!("CARGO_PKG_VERSION"));
    tracing::debug!(
        api_url = %config.api_url,
        project = %config.project,
        "Earth Engine endpoint"
    );

    let auth_client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(config.http_connect_timeout))
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")?;
    let provider = GoogleCredentialProvider::new(auth_client, config.oauth_settings());

    let engine = EarthEngineClient::new(config.engine_settings())?;
    let session = Arc::new(SessionContext::new());

    tracing::info!("Initializing authentication...");
    let loader = AuthenticatedLoader::connect(
        engine,
        &provider,
        &config.credential_source(),
        session,
        config.loader_settings(),
    )
    .await
    .context("Authentication failed")?;

    let query = config.query();
    tracing::info!("Loading {}...", query.collection);
    let dataset = loader.load(&query).await?;

    match dataset.time_extent() {
        Some((start, end)) => tracing::info!(
            "Loaded {} images ({} .. {})",
            dataset.len(),
            start.to_rfc3339(),
            end.to_rfc3339()
        ),
        None => tracing::info!("Loaded {} images", dataset.len()),
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&dataset).context("Failed to serialize dataset")?
    );

    Ok(())
}
