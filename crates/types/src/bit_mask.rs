//! Fixed-width bit mask over validator slots and block-part indices.

use bitvec::{order::Lsb0, vec::BitVec};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A fixed-length bit vector.
///
/// Both sides of a gossip link describe what they hold with one of these:
/// which block parts are available, which validator slots have voted. The
/// length is fixed at construction and never changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBitMask", into = "RawBitMask")]
pub struct BitMask {
    bits: BitVec<u64, Lsb0>,
}

/// Wire form of [BitMask]: bit length plus the packed words.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct RawBitMask {
    len: u32,
    words: Vec<u64>,
}

impl BitMask {
    /// Create a mask of `len` bits, all zero.
    pub fn new(len: usize) -> Self {
        Self { bits: BitVec::repeat(false, len) }
    }

    /// The number of bits in the mask.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// True when the mask holds zero bits.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// The number of set bits.
    pub fn count_ones(&self) -> usize {
        self.bits.count_ones()
    }

    /// True when no bit is set.
    pub fn none_set(&self) -> bool {
        self.bits.not_any()
    }

    /// Set bit `index`. Panics when `index` is out of range.
    pub fn set(&mut self, index: usize) {
        assert!(index < self.bits.len(), "bit index {index} out of range for mask of {}", self.bits.len());
        self.bits.set(index, true);
    }

    /// Read bit `index`. Panics when `index` is out of range.
    pub fn get(&self, index: usize) -> bool {
        assert!(index < self.bits.len(), "bit index {index} out of range for mask of {}", self.bits.len());
        self.bits[index]
    }

    /// Invert every bit in place.
    pub fn flip(&mut self) {
        let bits = std::mem::take(&mut self.bits);
        self.bits = !bits;
    }

    /// Intersect with `other` in place. Panics on length mismatch; masks of
    /// different widths never describe the same index space.
    pub fn and(&mut self, other: &BitMask) {
        assert_eq!(self.bits.len(), other.bits.len(), "bit mask length mismatch");
        *self.bits.as_mut_bitslice() &= other.bits.as_bitslice();
    }

    /// A uniformly chosen index whose bit is set, or `None` for an all-zero
    /// mask.
    pub fn pick_random(&self) -> Option<usize> {
        self.pick_random_with(&mut rand::thread_rng())
    }

    /// [Self::pick_random] with a caller-supplied source of randomness.
    pub fn pick_random_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        let ones = self.bits.count_ones();
        if ones == 0 {
            return None;
        }
        let pick = rng.gen_range(0..ones);
        self.bits.iter_ones().nth(pick)
    }

    /// Iterate over set bit indices in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }
}

impl From<BitMask> for RawBitMask {
    fn from(mask: BitMask) -> Self {
        let len = mask.bits.len();
        let mut words = vec![0u64; len.div_ceil(64)];
        for index in mask.bits.iter_ones() {
            words[index / 64] |= 1 << (index % 64);
        }
        Self { len: len as u32, words }
    }
}

impl TryFrom<RawBitMask> for BitMask {
    type Error = String;

    fn try_from(raw: RawBitMask) -> Result<Self, Self::Error> {
        let len = raw.len as usize;
        if raw.words.len() != len.div_ceil(64) {
            return Err(format!("bit mask of {len} bits packed into {} words", raw.words.len()));
        }
        let mut bits = BitVec::from_vec(raw.words);
        if bits.len() < len {
            return Err(format!("bit mask storage too short for {len} bits"));
        }
        bits.truncate(len);
        Ok(Self { bits })
    }
}
