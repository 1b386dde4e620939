//! Daemon: runtime orchestrator.
//!
//! Ties together the planner, supervisor, recovery, and HTTP gateway:
//!
//! 1. Restore non-terminal records from the store
//! 2. Start the API server
//! 3. Start the supervisor's reconciliation loop
//! 4. Block until SIGINT, then shut down: the supervisor finishes its
//!    current pass, no new passes start, and a later start resumes via
//!    recovery.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use warden_broker::{BrokerPort, ScriptedBroker};
use warden_store::{MemoryStore, PositionStore};

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::planner::Planner;
use crate::recovery;
use crate::supervisor::Supervisor;

/// The warden daemon.
pub struct Daemon<B: BrokerPort + 'static, S: PositionStore + 'static> {
    config: Config,
    planner: Arc<Planner<B, S>>,
    supervisor: Arc<Supervisor<B, S>>,
    store: Arc<S>,
}

impl Daemon<ScriptedBroker, MemoryStore> {
    /// Daemon over stub components, for development and tests.
    pub fn new_stub(config: Config) -> Self {
        let broker = Arc::new(ScriptedBroker::new());
        let store = Arc::new(MemoryStore::new());
        Self::new(config, broker, store)
    }
}

impl<B: BrokerPort + 'static, S: PositionStore + 'static> Daemon<B, S> {
    /// Daemon over the given broker and store.
    pub fn new(config: Config, broker: Arc<B>, store: Arc<S>) -> Self {
        let planner = Arc::new(Planner::new(Arc::clone(&broker), Arc::clone(&store)));
        let supervisor =
            Arc::new(Supervisor::new(broker, Arc::clone(&store), config.supervisor.clone()));

        Self { config, planner, supervisor, store }
    }

    /// Run until shutdown is requested.
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            "starting warden daemon"
        );

        let shutdown = CancellationToken::new();

        // 1. Recovery seeds the working set before anything can mutate.
        let restored = recovery::restore_working_set(self.store.as_ref()).await?;
        self.supervisor.restore(restored).await;

        // 2. API server.
        let api_addr = self.start_api_server().await?;
        info!(%api_addr, "gateway listening");

        // 3. Supervisor loop.
        let supervisor_handle = tokio::spawn(
            Arc::clone(&self.supervisor).run(shutdown.clone()),
        );

        // 4. Ctrl-c initiates orderly shutdown.
        let ctrl_c_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                error!("failed to install ctrl-c handler");
            }
            info!("received ctrl-c, initiating shutdown");
            ctrl_c_shutdown.cancel();
        });

        shutdown.cancelled().await;

        // Let the supervisor finish its current pass.
        let _ = tokio::time::timeout(std::time::Duration::from_secs(30), supervisor_handle).await;

        info!("shutdown complete");
        Ok(())
    }

    /// Bind and spawn the API server, returning the bound address.
    pub async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let state = Arc::new(ApiState {
            planner: Arc::clone(&self.planner),
            supervisor: Arc::clone(&self.supervisor),
            store: Arc::clone(&self.store),
            stale_window: self.config.supervisor.stale_window(),
        });
        let router = create_router(state);

        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| DaemonError::Config(format!("failed to bind {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| DaemonError::Config(format!("failed to read local address: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "gateway server error");
            }
        });

        Ok(local_addr)
    }

    /// The supervisor, for tests that drive passes directly.
    pub fn supervisor(&self) -> Arc<Supervisor<B, S>> {
        Arc::clone(&self.supervisor)
    }
}

// =============================================================================
// Tests
// =============================================================================
