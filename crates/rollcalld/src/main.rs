use anyhow::Result;
use rollcall_store::SqliteStore;
use rollcalld::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::load()?;
    let store = SqliteStore::open(&config.db_path, &config.images_dir, config.record_timeout())?;
    let counts = store.counts()?;
    tracing::info!(
        employees = counts.employees,
        events = counts.events,
        threshold = config.threshold,
        metric = ?config.metric,
        "store ready"
    );

    // TODO: load the deployment's detector/extractor model backends and
    // call engine::spawn_engine with a second store handle for writes.

    tracing::info!("rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
