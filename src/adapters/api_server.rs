use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::error::{ModexoError, Result};

/// Serve the API until the shutdown watch flips to `true`
pub async fn start_api_server(
    state: AppState,
    host: &str,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| ModexoError::Validation(format!("invalid listen address {}:{}: {}", host, port, e)))?;

    let app = create_router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
            info!("API server shutting down");
        })
        .await?;

    Ok(())
}
