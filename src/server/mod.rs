//! HTTP signaling server
//!
//! | Method | Path       | Purpose                                   |
//! |--------|------------|-------------------------------------------|
//! | GET    | `/`        | viewer page from the static directory     |
//! | GET    | `/offer`   | negotiation offer, waits for gathering    |
//! | POST   | `/answer`  | viewer answer                             |
//! | POST   | `/control` | `{"command": "start" / "pause" / "stop"}` |
//! | GET    | `/status`  | session, flags and relay counters         |
//!
//! Handlers that block on the coordinator run on Tokio's blocking pool so a
//! slow gathering never stalls the reactor.

mod handlers;

use crate::control::ControlState;
use crate::relay::RelayCounters;
use crate::signaling::SignalingCoordinator;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use uuid::Uuid;

/// Identity of the streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl SessionInfo {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SignalingCoordinator>,
    pub control: Arc<ControlState>,
    pub counters: Arc<RelayCounters>,
    pub session: SessionInfo,
    pub static_dir: PathBuf,
    pub offer_timeout: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/offer", get(handlers::offer))
        .route("/answer", post(handlers::answer))
        .route("/control", post(handlers::control))
        .route("/status", get(handlers::status))
        .fallback(handlers::not_found)
        .with_state(state)
}

pub async fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("Signaling server listening on http://{}", listener.local_addr()?);
    Ok(listener)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    log::info!("Signaling server stopped");
    Ok(())
}
