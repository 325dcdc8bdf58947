//! Composer daemon entrypoint: loads configuration, wires the blueprint
//! store / package catalog / compose queue, and serves the REST API on a
//! Unix domain socket while the compose worker runs in the background.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use composer::api::{self, AppState};
use composer::catalog::fixture::FixtureBackend;
use composer::catalog::PackageCatalog;
use composer::config::Config;
use composer::errors::Result;
use composer::queue::{worker, ComposeQueue};
use composer::store::BlueprintStore;
use tokio::net::UnixListener;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "composerd", about = "Compose OS images from declarative blueprints")]
struct Args {
    /// Path to the INI-style configuration file.
    #[arg(long, default_value = "/etc/composer/composer.conf")]
    config: PathBuf,

    /// Emit logs as JSON instead of the default compact text format.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = Arc::new(Config::load(&args.config)?);
    tracing::info!(socket = %config.socket_path.display(), "composer starting up");

    let store = Arc::new(BlueprintStore::open(config.blueprints_dir.clone())?);
    let backend = FixtureBackend::open(&config.share_dir.join("repos"))?;
    let catalog = Arc::new(PackageCatalog::new(Box::new(backend)));
    let queue = Arc::new(ComposeQueue::open(config.clone())?);

    tokio::spawn(worker::run(queue.clone()));
    tokio::spawn(monitor_new_dir(queue.clone()));

    let state = AppState { store, catalog, queue, config: config.clone() };
    let app = api::router(state);

    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(&config.socket_path)?;
    tracing::info!(socket = %config.socket_path.display(), "listening");

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Periodically rescan `queue/new/` for build directories dropped there by
/// another process (rather than through `submit`), and wake the worker so
/// it picks them up. The worker's own index only learns of a directory
/// once this monitor (or `submit`) notices it.
async fn monitor_new_dir(queue: Arc<ComposeQueue>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(5));
    loop {
        ticker.tick().await;
        if let Err(e) = queue.rescan_new() {
            tracing::warn!(error = %e, "queue directory monitor rescan failed");
            continue;
        }
        queue.wake_worker();
    }
}
