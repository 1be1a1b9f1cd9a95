// SPDX-License-Identifier: Apache-2.0
//! Consensus gossip synchronizer.
//!
//! Sits between the consensus engine and the p2p transport. Runs one
//! cooperative task per peer; each wakeup picks the single most useful
//! message for that peer from the engine's current state and the peer's
//! last advertised round state. Far-behind peers are handed to fast-sync
//! instead of being fed part by part.

#![warn(future_incompatible, nonstandard_style, rust_2018_idioms, rust_2021_compatibility)]

mod engine;
mod error;
mod metrics;
mod peer;
mod synchronizer;

pub use engine::{BlockStore, ConsensusEngine, MockBlockStore, MockConsensusEngine};
pub use error::SyncError;
pub use metrics::GossipMetrics;
pub use synchronizer::GossipSynchronizer;

#[cfg(test)]
#[path = "tests/synchronizer_tests.rs"]
mod synchronizer_tests;
