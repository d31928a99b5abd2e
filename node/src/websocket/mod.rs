//! Inbound peer WebSockets.
//!
//! Peers dial `GET /ws?from=<their identity>` and send one full snapshot per
//! text frame.

mod manager;

pub use manager::{ConnectionInfo, ConnectionManager};
