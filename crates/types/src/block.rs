//! Blocks and the chunked part-set form they travel in.

use crate::{encode, BitMask, Height};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of one block part on the wire.
pub const PART_SIZE: usize = 16 * 1024;

/// 32-byte block identifier.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..4]))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", hex::encode(self.0))
    }
}

/// A canonical block.
///
/// The gossip layer only moves blocks around; the payload is opaque here and
/// interpreted by the engine and the block store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: Height,
    pub hash: BlockHash,
    pub prev_hash: BlockHash,
    pub payload: Vec<u8>,
}

/// A block serialized and chunked into fixed-size parts.
///
/// Carries an availability mask of which indices are present. A sender
/// builds a complete set with [PartSet::from_block]; a receiver starts from
/// [PartSet::new_empty] and fills it part by part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartSet {
    parts: Vec<Option<Vec<u8>>>,
    mask: BitMask,
}

impl PartSet {
    /// Chunk raw bytes into a complete part set. Empty input yields an empty
    /// set with zero parts.
    pub fn from_bytes(data: &[u8]) -> Self {
        let parts: Vec<Option<Vec<u8>>> =
            data.chunks(PART_SIZE).map(|chunk| Some(chunk.to_vec())).collect();
        let mut mask = BitMask::new(parts.len());
        for index in 0..parts.len() {
            mask.set(index);
        }
        Self { parts, mask }
    }

    /// Serialize and chunk a block.
    pub fn from_block(block: &Block) -> Self {
        Self::from_bytes(&encode(block))
    }

    /// An empty set expecting `count` parts.
    pub fn new_empty(count: usize) -> Self {
        Self { parts: vec![None; count], mask: BitMask::new(count) }
    }

    /// Total number of part slots.
    pub fn parts_total(&self) -> usize {
        self.parts.len()
    }

    /// Mask of the indices currently present.
    pub fn mask(&self) -> &BitMask {
        &self.mask
    }

    /// The payload at `index`, when present.
    pub fn part(&self, index: usize) -> Option<&[u8]> {
        self.parts.get(index).and_then(|p| p.as_deref())
    }

    /// Store a part. Returns false for a duplicate index. Panics when
    /// `index` is out of range; callers check against [Self::parts_total].
    pub fn add_part(&mut self, index: usize, payload: Vec<u8>) -> bool {
        assert!(index < self.parts.len(), "part index {index} out of range for {}", self.parts.len());
        if self.mask.get(index) {
            return false;
        }
        self.parts[index] = Some(payload);
        self.mask.set(index);
        true
    }

    /// True once every part slot is filled.
    pub fn is_complete(&self) -> bool {
        self.mask.count_ones() == self.parts.len()
    }

    /// Concatenate all parts back into the original bytes, once complete.
    pub fn assemble(&self) -> Option<Vec<u8>> {
        if !self.is_complete() {
            return None;
        }
        let mut data = Vec::new();
        for part in &self.parts {
            data.extend_from_slice(part.as_deref().unwrap_or_default());
        }
        Some(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_and_reassemble() {
        let data = vec![7u8; PART_SIZE * 2 + 100];
        let set = PartSet::from_bytes(&data);
        assert_eq!(set.parts_total(), 3);
        assert!(set.is_complete());
        assert_eq!(set.part(2).unwrap().len(), 100);
        assert_eq!(set.assemble().unwrap(), data);
    }

    #[test]
    fn empty_input_yields_empty_set() {
        let set = PartSet::from_bytes(&[]);
        assert_eq!(set.parts_total(), 0);
        assert!(set.is_complete());
        assert_eq!(set.assemble().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn fill_empty_set() {
        let data = vec![1u8; PART_SIZE + 1];
        let complete = PartSet::from_bytes(&data);
        let mut receiving = PartSet::new_empty(complete.parts_total());
        assert!(!receiving.is_complete());

        assert!(receiving.add_part(1, complete.part(1).unwrap().to_vec()));
        assert!(!receiving.add_part(1, complete.part(1).unwrap().to_vec()));
        assert!(receiving.add_part(0, complete.part(0).unwrap().to_vec()));
        assert!(receiving.is_complete());
        assert_eq!(receiving.assemble().unwrap(), data);
    }

    #[test]
    fn block_round_trips_through_parts() {
        let block = Block {
            height: 42,
            hash: BlockHash::new([1; 32]),
            prev_hash: BlockHash::new([2; 32]),
            payload: vec![9u8; PART_SIZE * 3 + 17],
        };
        let set = PartSet::from_block(&block);
        let back: Block = crate::try_decode(&set.assemble().unwrap()).unwrap();
        assert_eq!(back, block);
    }
}
