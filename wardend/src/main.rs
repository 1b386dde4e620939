//! Warden daemon binary.
//!
//! # Usage
//!
//! ```bash
//! # In-memory store, stub broker
//! wardend
//!
//! # Durable store (requires the sqlite feature)
//! WARDEN_STORE_PATH=/var/lib/warden/positions.db wardend
//! ```
//!
//! # Environment Variables
//!
//! - `WARDEN_ENV`: test, development, production (default: development)
//! - `WARDEN_API_HOST` / `WARDEN_API_PORT`: gateway bind (default 0.0.0.0:8080)
//! - `WARDEN_CADENCE_SECS`: supervisor cadence (default: 10)
//! - `WARDEN_PENDING_STALE_HOURS`: listing freshness window (default: 24)
//! - `WARDEN_BROKER_TIMEOUT_SECS` / `WARDEN_STORE_TIMEOUT_SECS`: per-call
//!   timeouts (default: 10)
//! - `WARDEN_STORE_PATH`: SQLite file path; in-memory when unset

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wardend::{Config, Daemon};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("wardend=info".parse()?))
        .init();

    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        "warden daemon"
    );

    #[cfg(feature = "sqlite")]
    if let Some(path) = config.store.path.clone() {
        info!(%path, "using sqlite store");
        let broker = std::sync::Arc::new(warden_broker::ScriptedBroker::new());
        let store = std::sync::Arc::new(warden_store::SqliteStore::connect(&path).await?);
        let daemon = Daemon::new(config, broker, store);
        daemon.run().await?;
        return Ok(());
    }

    #[cfg(not(feature = "sqlite"))]
    if config.store.path.is_some() {
        anyhow::bail!("WARDEN_STORE_PATH is set but this build lacks the sqlite feature");
    }

    info!("using in-memory store");
    let daemon = Daemon::new_stub(config);
    daemon.run().await?;

    Ok(())
}
