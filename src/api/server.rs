//! API server lifecycle

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::router::{AppState, create_router};
use crate::config::Config;
use crate::{Error, Result};

/// CoCDB API server
pub struct Server {
    /// Configuration
    config: Config,
    /// Shared state, owner of the document cache
    state: Arc<AppState>,
}

impl Server {
    /// Create a server and start its cache.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        let state = Arc::new(AppState::new(&config)?);
        Ok(Self { config, state })
    }

    /// Shared state (cache, loader)
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let listener = TcpListener::bind(self.config.addr()).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    ///
    /// In-flight requests get `server.shutdown_timeout` to drain; the cache is
    /// closed once serving stops, whichever way it stops.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let local_addr = listener.local_addr()?;
        let app = create_router(Arc::clone(&self.state))
            .into_make_service_with_connect_info::<SocketAddr>();

        info!("============================================================");
        info!("CoCDB API v{}", self.state.version);
        info!("============================================================");
        info!(addr = %local_addr, environment = %self.config.app.environment, "Listening");
        info!(data_dir = %self.state.loader.base_dir().display(), "Serving data");
        info!(
            ttl = ?self.state.cache.ttl(),
            sweep_interval = ?self.state.cache.sweep_interval(),
            "Document cache ready"
        );

        let (drain_tx, mut drain_rx) = watch::channel(false);
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = drain_rx.wait_for(|draining| *draining).await;
                })
                .await
        });

        let outcome = tokio::select! {
            joined = &mut server => flatten(joined),
            () = shutdown => {
                info!("Shutdown signal received, draining connections");
                let _ = drain_tx.send(true);
                match tokio::time::timeout(self.config.server.shutdown_timeout, &mut server).await {
                    Ok(joined) => flatten(joined),
                    Err(_) => {
                        warn!(
                            timeout = ?self.config.server.shutdown_timeout,
                            "Graceful shutdown timed out, aborting open connections"
                        );
                        server.abort();
                        Ok(())
                    }
                }
            }
        };

        self.state.cache.close();
        match &outcome {
            Ok(()) => info!("Server stopped gracefully"),
            Err(e) => error!(error = %e, "Server stopped with error"),
        }
        outcome
    }
}

fn flatten(
    joined: std::result::Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    match joined {
        Ok(result) => result.map_err(Error::from),
        Err(e) => Err(Error::Internal(format!("server task failed: {e}"))),
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
