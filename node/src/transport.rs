//! WebSocket peer transport.
//!
//! A peer id is the base WebSocket URL of the peer's node, e.g.
//! `ws://10.0.0.7:7878`. Dialing a peer opens `<peer>/ws?from=<local id>`
//! in a background task; what happens on the socket comes back to the event
//! loop as [`NodeEvent::Transport`].

use std::collections::HashMap;

use futures::{SinkExt, StreamExt};
use hearth_engine::{error::Result, Error, PeerId, Transport, TransportEvent};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::runtime::NodeEvent;

/// Why a peer id is not a dialable URL.
#[derive(Debug, thiserror::Error)]
pub enum PeerUrlError {
    #[error("{0}")]
    Parse(#[from] url::ParseError),

    #[error("unsupported scheme {0:?}; expected ws or wss")]
    Scheme(String),
}

/// Check that a peer id is a ws:// or wss:// URL.
pub fn parse_peer_url(peer_id: &str) -> std::result::Result<Url, PeerUrlError> {
    let url = Url::parse(peer_id.trim())?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(PeerUrlError::Scheme(other.to_string())),
    }
}

/// Whether two peer URLs reach the same node.
pub fn same_peer(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
        && a.path().trim_end_matches('/') == b.path().trim_end_matches('/')
}

/// The URL dialed to reach a peer.
pub fn dial_url(peer_id: &str, local_id: &str) -> std::result::Result<Url, PeerUrlError> {
    let mut url = parse_peer_url(peer_id)?;
    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut().clear().append_pair("from", local_id);
    Ok(url)
}

/// One live outbound connection.
#[derive(Debug)]
struct Link {
    id: u64,
    outbound: mpsc::UnboundedSender<String>,
}

/// Outbound WebSocket connections to peers.
///
/// Owned by the coordinator, so it is only touched from the event loop task.
/// Each dial gets a link id; events from a link that has since been replaced
/// or dropped are discarded by the loop via [`WsTransport::is_current`].
#[derive(Debug)]
pub struct WsTransport {
    local_id: String,
    events: mpsc::UnboundedSender<NodeEvent>,
    links: HashMap<PeerId, Link>,
    next_link: u64,
}

impl WsTransport {
    pub fn new(local_id: impl Into<String>, events: mpsc::UnboundedSender<NodeEvent>) -> Self {
        Self {
            local_id: local_id.into(),
            events,
            links: HashMap::new(),
            next_link: 0,
        }
    }

    /// Whether `link` is still the connection for `peer_id`.
    pub fn is_current(&self, peer_id: &str, link: u64) -> bool {
        self.links.get(peer_id).is_some_and(|l| l.id == link)
    }

    /// Forget a link that reported `Error` or `Close`.
    pub fn release(&mut self, peer_id: &str, link: u64) {
        if self.is_current(peer_id, link) {
            self.links.remove(peer_id);
        }
    }

    /// Number of links that are dialing or open.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

impl Transport for WsTransport {
    fn connect(&mut self, peer_id: &str) -> Result<()> {
        let url = dial_url(peer_id, &self.local_id)
            .map_err(|e| Error::Transport(format!("{peer_id}: {e}")))?;

        self.next_link += 1;
        let link = self.next_link;
        let (outbound, rx) = mpsc::unbounded_channel();
        self.links.insert(peer_id.to_string(), Link { id: link, outbound });

        tracing::debug!(peer = %peer_id, link, url = %url, "Starting dial");
        tokio::spawn(run_link(
            peer_id.to_string(),
            link,
            url,
            rx,
            self.events.clone(),
        ));
        Ok(())
    }

    fn send(&mut self, peer_id: &str, payload: String) -> Result<()> {
        let link = self
            .links
            .get(peer_id)
            .ok_or_else(|| Error::Transport(format!("{peer_id}: not connected")))?;
        link.outbound
            .send(payload)
            .map_err(|_| Error::Transport(format!("{peer_id}: connection closed")))
    }

    fn disconnect(&mut self, peer_id: &str) {
        // Dropping the sender ends the link task, which closes the socket
        if self.links.remove(peer_id).is_some() {
            tracing::debug!(peer = %peer_id, "Disconnecting");
        }
    }
}

/// Drive one outbound connection until either side closes it.
async fn run_link(
    peer: PeerId,
    link: u64,
    url: Url,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<NodeEvent>,
) {
    let emit = |event: TransportEvent| {
        let _ = events.send(NodeEvent::Transport {
            peer: peer.clone(),
            link,
            event,
        });
    };

    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            emit(TransportEvent::Error(e.to_string()));
            return;
        }
    };
    emit(TransportEvent::Open);

    let (mut ws_sender, mut ws_receiver) = stream.split();

    loop {
        tokio::select! {
            payload = outbound.recv() => match payload {
                Some(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        emit(TransportEvent::Error(e.to_string()));
                        return;
                    }
                }
                None => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            },
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    emit(TransportEvent::Data(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Binary(_))) => {
                    tracing::warn!(peer = %peer, "Binary messages not supported");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    emit(TransportEvent::Error(e.to_string()));
                    return;
                }
            },
        }
    }

    emit(TransportEvent::Close);
}
