// SPDX-License-Identifier: Apache-2.0
//! Tunables for the consensus gossip layer.

#![warn(future_incompatible, nonstandard_style, rust_2018_idioms, rust_2021_compatibility)]

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Bandwidth cap sentinel: no cap, wake immediately after each send.
pub const SEND_BPS_UNCAPPED: i64 = -1;

const DEFAULT_ROUND_STATE_INTERVAL: Duration = Duration::from_millis(300);
const DEFAULT_FAST_SYNC_THRESHOLD: i64 = 4;
const DEFAULT_PROTOCOL_PRIORITY: u8 = 3;

/// Gossip parameters. All fields have working defaults; a yaml file can
/// override any subset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GossipParameters {
    /// Per-peer bandwidth cap in bytes per second. [SEND_BPS_UNCAPPED]
    /// disables pacing.
    pub send_bps: i64,
    /// Cadence of the periodic round-state rebroadcast.
    #[serde(with = "humantime_serde")]
    pub round_state_interval: Duration,
    /// Height gap beyond which a bulk fetch replaces part-by-part gossip.
    pub fast_sync_threshold: i64,
    /// Priority the reactor registers its protocols at.
    pub protocol_priority: u8,
}

impl Default for GossipParameters {
    fn default() -> Self {
        Self {
            send_bps: SEND_BPS_UNCAPPED,
            round_state_interval: DEFAULT_ROUND_STATE_INTERVAL,
            fast_sync_threshold: DEFAULT_FAST_SYNC_THRESHOLD,
            protocol_priority: DEFAULT_PROTOCOL_PRIORITY,
        }
    }
}

impl GossipParameters {
    /// Reject parameter combinations with no sane meaning. A zero
    /// `send_bps` would be an infinite send delay, so it is refused here
    /// rather than interpreted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.send_bps == 0 || (self.send_bps < 0 && self.send_bps != SEND_BPS_UNCAPPED) {
            return Err(ConfigError::InvalidSendRate(self.send_bps));
        }
        if self.round_state_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.fast_sync_threshold < 0 {
            return Err(ConfigError::NegativeThreshold(self.fast_sync_threshold));
        }
        Ok(())
    }

    /// Write the parameters to the logs.
    pub fn tracing(&self) {
        info!(target: "gossip-sync", "send_bps: {}", self.send_bps);
        info!(target: "gossip-sync", "round_state_interval: {:?}", self.round_state_interval);
        info!(target: "gossip-sync", "fast_sync_threshold: {}", self.fast_sync_threshold);
        info!(target: "gossip-sync", "protocol_priority: {}", self.protocol_priority);
    }

    /// Parse and validate parameters from yaml.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let params: Self = serde_yaml::from_str(contents)?;
        params.validate()?;
        Ok(params)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("send_bps must be positive or -1 for uncapped, got {0}")]
    InvalidSendRate(i64),
    #[error("round_state_interval must be non-zero")]
    ZeroInterval,
    #[error("fast_sync_threshold must be non-negative, got {0}")]
    NegativeThreshold(i64),
    #[error("unparseable parameters: {0}")]
    Parse(#[from] serde_yaml::Error),
}
