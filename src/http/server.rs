//! HTTP server implementation.

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::routes::{router, AppState};
use crate::error::{GateError, Result};
use crate::ratelimit::Clock;

/// HTTP server for the generation gate API.
pub struct HttpServer<C: Clock + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    state: AppState<C>,
}

impl<C: Clock + 'static> HttpServer<C> {
    pub fn new(addr: SocketAddr, state: AppState<C>) -> Self {
        Self { addr, state }
    }

    /// Serve until `signal` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "Starting HTTP server for generation gate");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                GateError::Server(e.to_string())
            })
    }
}
