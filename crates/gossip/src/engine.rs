//! Seams toward the consensus engine and the canonical block store.

use mn_fast_sync::BlockFetchResult;
use mn_network_types::{BlockPartMessage, ReceiveError, RoundStateMessage};
use mn_types::{BitMask, Block, Height, PartSet, Round, Step, Vote, VoteList};
use mockall::automock;
use std::sync::Arc;

/// The engine surface the synchronizer reads and feeds.
///
/// Every method is called with the shared mutex held; the engine value
/// lives inside that mutex, so the engine never observes the synchronizer
/// mid-decision and vice versa.
#[automock]
pub trait ConsensusEngine: Send {
    /// The height currently being decided.
    fn height(&self) -> Height;

    /// The round within [Self::height].
    fn round(&self) -> Round;

    /// The step within [Self::round].
    fn step(&self) -> Step;

    /// Our own advertisement for round-state broadcasts.
    fn round_state(&self) -> RoundStateMessage;

    /// The part set of the block committed at `height`, when still held.
    fn commit_block_parts(&self, height: Height) -> Option<Arc<PartSet>>;

    /// The precommits that justified committing `height`.
    fn commit_precommits(&self, height: Height) -> Option<VoteList>;

    /// Precommits collected at `round` of the current height.
    fn precommits(&self, round: Round) -> Option<VoteList>;

    /// The votes we hold at `round` within the given missing-slot masks.
    fn votes(
        &self,
        round: Round,
        missing_prevotes: &BitMask,
        missing_precommits: &BitMask,
    ) -> Option<VoteList>;

    /// Ingest one block part. Returns the part index on acceptance.
    fn receive_block_part(
        &mut self,
        msg: &BlockPartMessage,
        unicast: bool,
    ) -> Result<u16, ReceiveError>;

    /// Ingest one vote. Returns the signer's validator slot on acceptance.
    fn receive_vote(&mut self, vote: &Vote, unicast: bool) -> Result<u16, ReceiveError>;

    /// Ingest a block delivered by fast-sync.
    fn receive_block(&mut self, result: BlockFetchResult);
}

/// Read-only canonical block store. Queries are pure and safe to run with
/// or without the shared mutex held.
#[automock]
pub trait BlockStore: Send + Sync {
    fn block(&self, height: Height) -> Option<Block>;
}
