//! Hearth Node - the device process for peer-replicated local-first storage.
//!
//! The node wires the engine to the outside world: file-backed slots, a
//! WebSocket transport for peers, an event loop that owns the coordinator,
//! and a small HTTP API for the application.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod runtime;
pub mod storage;
pub mod transport;
pub mod websocket;

use std::sync::Arc;

use axum::Router;
use hearth_engine::{LocalIdentity, Lz4Codec, PeerDirectory, RecordStore, SyncCoordinator};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::runtime::{NodeHandle, Runtime};
use crate::storage::FileStorage;
use crate::transport::WsTransport;
use crate::websocket::ConnectionManager;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub handle: NodeHandle,
    /// This node's identity, used to refuse sockets dialed from itself
    pub identity: String,
    pub config: Arc<Config>,
    pub connections: Arc<ConnectionManager>,
}

/// Open storage, seed peers and assemble the event loop.
///
/// The returned [`Runtime`] has not started; spawn [`Runtime::run`] on a
/// tokio runtime before serving requests.
pub fn build(config: Config) -> hearth_engine::error::Result<(AppState, Runtime)> {
    let store = RecordStore::open(FileStorage::open(config.store_path())?, Lz4Codec)?;

    let mut peer_storage = FileStorage::open(config.peers_path())?;
    let identity = LocalIdentity::load_or_create(&mut peer_storage)?;
    let mut peers = PeerDirectory::open(peer_storage)?;
    for peer in &config.peers {
        if let Err(e) = transport::parse_peer_url(peer) {
            tracing::warn!(peer = %peer, error = %e, "Skipping configured peer");
            continue;
        }
        if config.is_self(peer) {
            tracing::warn!(peer = %peer, "Skipping configured peer that is this node");
            continue;
        }
        if peers.add(peer)? {
            tracing::info!(peer = %peer, "Seeded peer from config");
        }
    }

    let (handle, events) = runtime::channel();
    let transport = WsTransport::new(identity.as_str(), handle.events());
    let identity_id = identity.to_string();
    let coordinator = SyncCoordinator::new(identity, store, peers, transport)
        .with_retry_policy(config.retry_policy());
    let runtime = Runtime::new(coordinator, events, config.tick());

    let state = AppState {
        handle,
        identity: identity_id,
        config: Arc::new(config),
        connections: ConnectionManager::new_shared(),
    };
    Ok((state, runtime))
}

/// Build the HTTP router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
