//! multiserver web API
//!
//! JSON endpoints for registering managed services and running their
//! lifecycle actions.

pub mod api;
pub mod error;

pub use api::router;
pub use error::ApiError;

use multiserver_controller::Panel;
use std::net::SocketAddr;
use tracing::info;

/// Serve the API until the listener fails
pub async fn serve(addr: SocketAddr, panel: Panel) -> anyhow::Result<()> {
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(panel)).await?;

    Ok(())
}
