use tracing_subscriber::{fmt, EnvFilter};

use visionvault::services::ServiceConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;

    // RUST_LOG 优先，其次由 VERBOSE 决定
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    fmt().with_env_filter(filter).with_target(true).compact().init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        verbose = config.verbose,
        custom_model = config.model.use_custom_model,
        strategy = %config.model.strategy,
        "visionvault starting"
    );

    if let Err(err) = visionvault::run(config).await {
        tracing::error!(error = %err, "Startup failed");
        return Err(err);
    }
    Ok(())
}
