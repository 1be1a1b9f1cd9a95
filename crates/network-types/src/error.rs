//! Error types for the gossip network seam.

use mn_types::{Height, PeerId, Round};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Transport-facing error type.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The transport refused to register the reactor.
    #[error("reactor registration failed: {0}")]
    Registration(String),
    /// Unicast target is not a current neighbor.
    #[error("peer {0} is not connected")]
    PeerGone(PeerId),
    /// Broadcast could not be handed to the transport.
    #[error("broadcast failed: {0}")]
    Broadcast(String),
    /// mpsc receiver dropped.
    #[error("mpsc error: {0}")]
    ChannelClosed(String),
    /// oneshot sender dropped.
    #[error("oneshot error: {0}")]
    AckChannelClosed(String),
}

impl From<oneshot::error::RecvError> for NetworkError {
    fn from(e: oneshot::error::RecvError) -> Self {
        Self::AckChannelClosed(e.to_string())
    }
}

impl<T> From<mpsc::error::SendError<T>> for NetworkError {
    fn from(e: mpsc::error::SendError<T>) -> Self {
        Self::ChannelClosed(e.to_string())
    }
}

/// A wire message failed its shape checks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("height {0} below 1")]
    BadHeight(Height),
    #[error("negative round {0}")]
    BadRound(Round),
    #[error("empty block part payload")]
    EmptyPayload,
    #[error("block part payload of {0} bytes over limit")]
    OversizedPayload(usize),
    #[error("mask of {0} bits over limit")]
    OversizedMask(usize),
    /// Reported by the engine once the part set for the height is known.
    #[error("part index {index} out of range for {total} parts")]
    PartIndexOutOfRange { index: u16, total: usize },
}

/// Why an inbound message was not processed.
///
/// Returned to the reactor so the transport can penalize the sender.
#[derive(Debug, Error)]
pub enum ReceiveError {
    /// The bytes did not decode as the tagged message.
    #[error("malformed message: {0}")]
    Decode(String),
    /// The message decoded but failed verification.
    #[error(transparent)]
    Verification(#[from] MessageError),
    /// The engine refused the payload.
    #[error("engine rejected message: {0}")]
    Rejected(String),
}

impl From<bcs::Error> for ReceiveError {
    fn from(e: bcs::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
