//! Synchronizer error type.

use mn_config::ConfigError;
use mn_network_types::NetworkError;
use thiserror::Error;

/// Errors surfaced by the synchronizer's own operations. Inbound message
/// failures travel back to the reactor as
/// [mn_network_types::ReceiveError] instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Parameters failed validation.
    #[error("invalid gossip parameters: {0}")]
    Config(#[from] ConfigError),
    /// `start` was called twice.
    #[error("synchronizer is already running")]
    AlreadyRunning,
    /// The transport refused our reactor.
    #[error("reactor registration failed: {0}")]
    Registration(NetworkError),
}
