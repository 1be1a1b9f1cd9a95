//! Consensus coordinates and votes.

use crate::BlockHash;
use serde::{Deserialize, Serialize};

/// Block number. The first block of a chain has height 1.
pub type Height = i64;

/// Round within a height; starts at 0 and increments on timeout.
pub type Round = i32;

/// The step a consensus engine is at within a round.
///
/// Ordering follows the engine's progression, so `step >= Step::Commit`
/// reads as "at or past commit".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Step {
    Propose,
    Prevote,
    PrevoteWait,
    Precommit,
    PrecommitWait,
    Commit,
}

/// The two BFT vote kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteType {
    Prevote,
    Precommit,
}

/// A signed BFT vote.
///
/// The gossip layer treats the signature as an opaque payload; verification
/// belongs to the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub vote_type: VoteType,
    pub height: Height,
    pub round: Round,
    pub block_id: BlockHash,
    /// Slot of the signer in the validator set at `round`.
    pub validator_index: u16,
    pub signature: Vec<u8>,
}

/// An ordered sequence of votes; may be empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteList(Vec<Vote>);

impl VoteList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, vote: Vote) {
        self.0.push(vote);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Vote> {
        self.0.iter()
    }
}

impl From<Vec<Vote>> for VoteList {
    fn from(votes: Vec<Vote>) -> Self {
        Self(votes)
    }
}

impl FromIterator<Vote> for VoteList {
    fn from_iter<I: IntoIterator<Item = Vote>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for VoteList {
    type Item = Vote;
    type IntoIter = std::vec::IntoIter<Vote>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a VoteList {
    type Item = &'a Vote;
    type IntoIter = std::slice::Iter<'a, Vote>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
