//! Seams between the synchronizer and the transport.

use crate::{GossipProtocol, NetworkError, ReceiveError};
use mn_types::PeerId;
use mockall::automock;
use std::sync::Arc;

/// Who a broadcast reaches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BroadcastScope {
    /// Directly connected peers only.
    Neighbors,
    /// Every reachable peer, transport willing.
    All,
}

/// Outbound side of a registered reactor. Implementations are
/// concurrent-safe and may be called without any synchronizer lock held.
#[automock]
pub trait ProtocolHandler: Send + Sync {
    /// Send one message to one peer.
    fn unicast(
        &self,
        proto: GossipProtocol,
        bytes: Vec<u8>,
        peer: &PeerId,
    ) -> Result<(), NetworkError>;

    /// Fan a message out to `scope`.
    fn broadcast(
        &self,
        proto: GossipProtocol,
        bytes: Vec<u8>,
        scope: BroadcastScope,
    ) -> Result<(), NetworkError>;

    /// The peers currently joined on this handler's protocols.
    fn peers(&self) -> Vec<PeerId>;
}

/// Inbound callbacks a reactor receives from the transport.
///
/// The transport invokes these from its own tasks; implementations do their
/// own locking.
#[automock]
pub trait Reactor: Send + Sync {
    /// One inbound message. The returned bool asks the transport to
    /// re-propagate (always false for this layer; the broadcast fan-out
    /// already covers propagation). Errors feed the sender's peer score.
    fn on_receive(
        &self,
        proto: GossipProtocol,
        bytes: &[u8],
        sender: &PeerId,
    ) -> Result<bool, ReceiveError>;

    /// A prior send attributed to this reactor failed.
    fn on_failure(&self, error: NetworkError, proto: GossipProtocol, bytes: &[u8]);

    /// A peer joined the reactor's protocols.
    fn on_join(&self, peer: &PeerId);

    /// A peer left.
    fn on_leave(&self, peer: &PeerId);
}

/// Registration surface of the transport.
#[automock]
pub trait GossipNetwork {
    /// Register `reactor` for `protocols` at `priority`; returns the handler
    /// used for all outbound traffic.
    fn register_reactor(
        &self,
        name: &str,
        protocols: &[GossipProtocol],
        priority: u8,
        reactor: Arc<dyn Reactor>,
    ) -> Result<Arc<dyn ProtocolHandler>, NetworkError>;
}
