// SPDX-License-Identifier: Apache-2.0
//! Bulk block download seam.
//!
//! When a peer's advertised height is too far ahead for part-by-part
//! gossip, the synchronizer hands the gap to a fast-sync service and feeds
//! the fetched blocks back into the engine. The service itself lives behind
//! [FastSyncService]; this crate only fixes the seam.

#![warn(future_incompatible, nonstandard_style, rust_2018_idioms, rust_2021_compatibility)]

use mn_types::{Block, Height};
use mockall::automock;
use std::sync::Arc;
use thiserror::Error;

/// Open-ended upper bound for [FastSyncService::fetch_blocks].
pub const FETCH_OPEN_ENDED: Height = -1;

/// One fetched block plus the vote payload proving its commit.
#[derive(Debug)]
pub struct BlockFetchResult {
    pub block: Block,
    /// Serialized commit votes for `block`; parsed by the engine.
    pub votes: Vec<u8>,
}

/// Why a fetch ended without delivering the full range.
#[derive(Debug, Error)]
pub enum FastSyncError {
    #[error("fast-sync server is not running")]
    ServerDown,
    #[error("fetch canceled")]
    Canceled,
    #[error("no peer can serve the requested range")]
    NoPeers,
    #[error("fetch rejected: {0}")]
    Rejected(String),
}

/// Receives fetch progress.
///
/// Callbacks arrive from the service's own tasks, never synchronously from
/// inside [FastSyncService::fetch_blocks]; a caller may therefore start a
/// fetch while holding the lock its callbacks will take.
#[automock]
pub trait FetchListener: Send + Sync {
    /// One block, in ascending height order.
    fn on_block(&self, result: BlockFetchResult);

    /// The fetch finished; `error` is `None` on a clean end of range.
    fn on_end(&self, error: Option<FastSyncError>);
}

/// Aborts an outstanding fetch. Invoked at most once.
#[automock]
pub trait FetchCancel: Send {
    fn cancel(&self);
}

/// The fast-sync service surface the synchronizer drives.
#[automock]
pub trait FastSyncService: Send + Sync {
    /// Start serving our own blocks to others.
    fn start_server(&self);

    /// Stop serving.
    fn stop_server(&self);

    /// Fetch blocks `from..=to` ([FETCH_OPEN_ENDED] for "as far as peers
    /// have"), validating against `anchor`, reporting through `listener`.
    fn fetch_blocks(
        &self,
        from: Height,
        to: Height,
        anchor: Block,
        listener: Arc<dyn FetchListener>,
    ) -> Result<Box<dyn FetchCancel>, FastSyncError>;
}
