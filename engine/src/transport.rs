//! Peer transport seam.
//!
//! The engine does not open sockets. A host-provided [`Transport`] starts
//! dials and carries text; what happens on the wire is reported back to the
//! coordinator as [`TransportEvent`]s.

use crate::{error::Result, Error, PeerId};
use std::collections::BTreeSet;

/// Something that happened on a peer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is ready to carry data.
    Open,
    /// A text message arrived.
    Data(String),
    /// The connection failed.
    Error(String),
    /// The connection was closed.
    Close,
}

/// Ordered, reliable text delivery to peers.
pub trait Transport {
    /// Start connecting to a peer. Completion arrives later as
    /// [`TransportEvent::Open`] or [`TransportEvent::Error`]. An `Err` here
    /// means the dial could not even be started.
    fn connect(&mut self, peer_id: &str) -> Result<()>;

    /// Send one message over an open connection.
    fn send(&mut self, peer_id: &str, payload: String) -> Result<()>;

    /// Tear down any connection to a peer.
    fn disconnect(&mut self, peer_id: &str);
}

/// A transport that records calls instead of performing them.
///
/// Used by tests and benchmarks; events are fed to the coordinator by hand.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    pub connects: Vec<PeerId>,
    pub sent: Vec<(PeerId, String)>,
    pub disconnects: Vec<PeerId>,
    unreachable: BTreeSet<PeerId>,
}

impl MemoryTransport {
    /// Create a transport where every dial starts successfully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `connect` fail synchronously for a peer.
    pub fn set_unreachable(&mut self, peer_id: impl Into<PeerId>) {
        self.unreachable.insert(peer_id.into());
    }

    /// Number of dials started for a peer.
    pub fn connects_to(&self, peer_id: &str) -> usize {
        self.connects.iter().filter(|p| *p == peer_id).count()
    }

    /// Messages sent to a peer, in order.
    pub fn sent_to(&self, peer_id: &str) -> Vec<&str> {
        self.sent
            .iter()
            .filter(|(p, _)| p == peer_id)
            .map(|(_, payload)| payload.as_str())
            .collect()
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self, peer_id: &str) -> Result<()> {
        self.connects.push(peer_id.to_string());
        if self.unreachable.contains(peer_id) {
            return Err(Error::Transport(format!("{peer_id} is unreachable")));
        }
        Ok(())
    }

    fn send(&mut self, peer_id: &str, payload: String) -> Result<()> {
        self.sent.push((peer_id.to_string(), payload));
        Ok(())
    }

    fn disconnect(&mut self, peer_id: &str) {
        self.disconnects.push(peer_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_calls() {
        let mut transport = MemoryTransport::new();
        transport.connect("a").unwrap();
        transport.send("a", "hello".into()).unwrap();
        transport.send("b", "other".into()).unwrap();
        transport.disconnect("a");

        assert_eq!(transport.connects_to("a"), 1);
        assert_eq!(transport.sent_to("a"), ["hello"]);
        assert_eq!(transport.disconnects, ["a"]);
    }

    #[test]
    fn unreachable_peer_fails_to_dial() {
        let mut transport = MemoryTransport::new();
        transport.set_unreachable("ghost");
        assert!(matches!(transport.connect("ghost"), Err(Error::Transport(_))));
        assert_eq!(transport.connects_to("ghost"), 1);
    }
}
