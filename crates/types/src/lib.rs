// SPDX-License-Identifier: Apache-2.0
//! Shared types for the consensus gossip layer.

#![warn(future_incompatible, nonstandard_style, rust_2018_idioms, rust_2021_compatibility)]

mod bit_mask;
mod block;
mod codec;
mod consensus;
mod peer;

pub use bit_mask::BitMask;
pub use block::{Block, BlockHash, PartSet, PART_SIZE};
pub use codec::{decode, encode, try_decode};
pub use consensus::{Height, Round, Step, Vote, VoteList, VoteType};
pub use peer::PeerId;
