// SPDX-License-Identifier: Apache-2.0
//! Wire messages and reactor traits for the consensus gossip layer.

#![warn(future_incompatible, nonstandard_style, rust_2018_idioms, rust_2021_compatibility)]

mod error;
mod messages;
mod traits;

pub use error::{MessageError, NetworkError, ReceiveError};
pub use messages::{
    BlockPartMessage, GossipProtocol, RoundStateMessage, VoteListMessage, GOSSIP_REACTOR_NAME,
    MAX_MASK_BITS,
};
pub use traits::{
    BroadcastScope, GossipNetwork, MockGossipNetwork, MockProtocolHandler, MockReactor,
    ProtocolHandler, Reactor,
};
