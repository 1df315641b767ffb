//! Server startup, background load and shutdown
//!
//! Binds the HTTP surface, runs the load generator against the same router,
//! and drains in-flight transactions on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use fnb_loadgen::{LoadGenerator, SystemClock};
use fnb_router::RouterError;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::routes::{self, AppState};

/// Server instance that can be started
pub struct Server {
    config: Arc<AppConfig>,
    state: AppState,
    router: Router,
}

impl Server {
    /// Create a new server instance with the given configuration
    pub fn new(config: AppConfig) -> Result<Self, RouterError> {
        Ok(Self::from_state(AppState::new(Arc::new(config))?))
    }

    /// Create a server around prepared state, e.g. one with metrics attached
    pub fn from_state(state: AppState) -> Self {
        let router = routes::build_router(state.clone());
        Self {
            config: state.config.clone(),
            state,
            router,
        }
    }

    /// Get the socket address the server will bind to
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.config.socket_addr().parse()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Bind the configured address and serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let addr = self
            .socket_addr()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let listener = TcpListener::bind(addr).await?;
        self.run_with_listener(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    ///
    /// Useful for tests that bind port 0 to get a free port.
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!(%addr, "Server listening");

        let loadgen = self.spawn_loadgen(shutdown.child_token());

        axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .await?;

        info!("HTTP surface stopped, draining transactions");
        if let Some(handle) = loadgen {
            if let Err(err) = handle.await {
                warn!(error = %err, "Load generator task ended abnormally");
            }
        }
        self.drain().await;
        Ok(())
    }

    fn spawn_loadgen(&self, token: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.config.loadgen.enabled {
            info!("Load generator disabled");
            return None;
        }
        let generator = LoadGenerator::new(
            self.state.router.clone(),
            SystemClock,
            &self.config.loadgen,
            self.state.fork_rng(),
        )
        .with_stats(self.state.loadgen.clone());
        Some(tokio::spawn(generator.run(token)))
    }

    /// Refuse new work, then wait for in-flight transactions. Anything still
    /// running after the shutdown timeout is cancelled.
    async fn drain(&self) {
        let router = &self.state.router;
        router.close();

        let settled = async {
            while router.in_flight() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        if tokio::time::timeout(timeout, settled).await.is_err() {
            let cancelled = router.cancel_all();
            warn!(cancelled, "Shutdown timeout reached, cancelled in-flight transactions");
        }
        info!(counters = ?router.counters(), "Server stopped");
    }
}

/// Cancel `token` on Ctrl-C or SIGTERM.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = token.cancelled() => return,
    }
    info!("Shutdown signal received");
    token.cancel();
}
