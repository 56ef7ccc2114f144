//! Talkbox sync entry point.

mod app;
mod config;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let config = config::Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        memo = %config.memo_path.display(),
        "starting Talkbox sync"
    );

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(app::run(config))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
