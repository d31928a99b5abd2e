//! Long-lived connection handlers.

mod websocket;

pub use websocket::handle_peer_socket;
