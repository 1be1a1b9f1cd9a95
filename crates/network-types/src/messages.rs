//! The three gossip wire messages.

use crate::MessageError;
use mn_types::{BitMask, Height, Round, VoteList, PART_SIZE};
use serde::{Deserialize, Serialize};

/// Name the synchronizer registers under with the transport.
pub const GOSSIP_REACTOR_NAME: &str = "consensus.gossip";

/// Upper bound on advertised mask widths; wider masks are malformed.
pub const MAX_MASK_BITS: usize = 4096;

/// Protocol tags for reactor dispatch. One per wire message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GossipProtocol {
    BlockPart,
    RoundState,
    VoteList,
}

impl GossipProtocol {
    /// Every protocol the synchronizer registers for.
    pub const ALL: [GossipProtocol; 3] =
        [GossipProtocol::BlockPart, GossipProtocol::RoundState, GossipProtocol::VoteList];

    /// Stable on-wire protocol id.
    pub fn id(&self) -> u16 {
        match self {
            GossipProtocol::BlockPart => 0x0300,
            GossipProtocol::RoundState => 0x0301,
            GossipProtocol::VoteList => 0x0302,
        }
    }
}

/// One piece of a committed block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPartMessage {
    pub height: Height,
    pub index: u16,
    pub payload: Vec<u8>,
}

impl BlockPartMessage {
    /// Shape checks only; whether the part fits the block at `height` is the
    /// engine's call.
    pub fn verify(&self) -> Result<(), MessageError> {
        if self.height < 1 {
            return Err(MessageError::BadHeight(self.height));
        }
        if self.payload.is_empty() {
            return Err(MessageError::EmptyPayload);
        }
        if self.payload.len() > PART_SIZE {
            return Err(MessageError::OversizedPayload(self.payload.len()));
        }
        Ok(())
    }
}

/// A peer's self-advertisement: where it is and what it already holds.
///
/// `block_parts_mask` is present exactly when the sender is inside commit
/// for `height`. The vote masks are indexed by validator slot at `round`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundStateMessage {
    pub height: Height,
    pub round: Round,
    /// True when the sender wants gossip from us.
    pub sync: bool,
    pub block_parts_mask: Option<BitMask>,
    pub prevotes_mask: BitMask,
    pub precommits_mask: BitMask,
}

impl RoundStateMessage {
    pub fn verify(&self) -> Result<(), MessageError> {
        if self.height < 1 {
            return Err(MessageError::BadHeight(self.height));
        }
        if self.round < 0 {
            return Err(MessageError::BadRound(self.round));
        }
        let widest = [
            self.block_parts_mask.as_ref().map(BitMask::len).unwrap_or(0),
            self.prevotes_mask.len(),
            self.precommits_mask.len(),
        ];
        if let Some(&width) = widest.iter().find(|&&w| w > MAX_MASK_BITS) {
            return Err(MessageError::OversizedMask(width));
        }
        Ok(())
    }
}

/// An ordered batch of votes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteListMessage {
    pub votes: VoteList,
}

impl VoteListMessage {
    pub fn new(votes: VoteList) -> Self {
        Self { votes }
    }

    pub fn verify(&self) -> Result<(), MessageError> {
        for vote in &self.votes {
            if vote.height < 1 {
                return Err(MessageError::BadHeight(vote.height));
            }
            if vote.round < 0 {
                return Err(MessageError::BadRound(vote.round));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use mn_types::{encode, try_decode, BlockHash, Vote, VoteType};

    fn vote(height: Height, round: Round, index: u16) -> Vote {
        Vote {
            vote_type: VoteType::Precommit,
            height,
            round,
            block_id: BlockHash::new([3; 32]),
            validator_index: index,
            signature: vec![0xab; 64],
        }
    }

    #[test]
    fn protocol_ids_are_distinct() {
        let mut ids: Vec<_> = GossipProtocol::ALL.iter().map(GossipProtocol::id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn block_part_round_trip() {
        let msg = BlockPartMessage { height: 9, index: 2, payload: vec![5; 128] };
        assert!(msg.verify().is_ok());
        let back: BlockPartMessage = try_decode(&encode(&msg)).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn block_part_shape_checks() {
        let msg = BlockPartMessage { height: 0, index: 0, payload: vec![1] };
        assert_matches!(msg.verify(), Err(MessageError::BadHeight(0)));

        let msg = BlockPartMessage { height: 1, index: 0, payload: vec![] };
        assert_matches!(msg.verify(), Err(MessageError::EmptyPayload));

        let msg = BlockPartMessage { height: 1, index: 0, payload: vec![0; PART_SIZE + 1] };
        assert_matches!(msg.verify(), Err(MessageError::OversizedPayload(_)));
    }

    #[test]
    fn round_state_round_trip() {
        let mut prevotes = BitMask::new(4);
        prevotes.set(0);
        let msg = RoundStateMessage {
            height: 5,
            round: 2,
            sync: true,
            block_parts_mask: Some(BitMask::new(3)),
            prevotes_mask: prevotes,
            precommits_mask: BitMask::new(4),
        };
        assert!(msg.verify().is_ok());
        let back: RoundStateMessage = try_decode(&encode(&msg)).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn round_state_shape_checks() {
        let msg = RoundStateMessage {
            height: 5,
            round: -1,
            sync: true,
            block_parts_mask: None,
            prevotes_mask: BitMask::new(4),
            precommits_mask: BitMask::new(4),
        };
        assert_matches!(msg.verify(), Err(MessageError::BadRound(-1)));

        let msg = RoundStateMessage {
            height: 5,
            round: 0,
            sync: true,
            block_parts_mask: None,
            prevotes_mask: BitMask::new(MAX_MASK_BITS + 1),
            precommits_mask: BitMask::new(4),
        };
        assert_matches!(msg.verify(), Err(MessageError::OversizedMask(_)));
    }

    #[test]
    fn vote_list_round_trip() {
        let msg = VoteListMessage::new(vec![vote(3, 1, 0), vote(3, 1, 2)].into());
        assert!(msg.verify().is_ok());
        let back: VoteListMessage = try_decode(&encode(&msg)).unwrap();
        assert_eq!(back, msg);

        let empty = VoteListMessage::default();
        assert!(empty.verify().is_ok());
    }

    #[test]
    fn vote_list_shape_checks() {
        let msg = VoteListMessage::new(vec![vote(3, 1, 0), vote(0, 1, 1)].into());
        assert_matches!(msg.verify(), Err(MessageError::BadHeight(0)));
    }

    #[test]
    fn garbage_bytes_fail_decode() {
        assert!(try_decode::<RoundStateMessage>(&[0xff, 0x01, 0x02]).is_err());
    }
}
