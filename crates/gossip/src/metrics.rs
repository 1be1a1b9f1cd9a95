//! Prometheus metrics for the gossip layer.

use mn_network_types::GossipProtocol;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

pub(crate) fn proto_label(proto: GossipProtocol) -> &'static str {
    match proto {
        GossipProtocol::BlockPart => "block_part",
        GossipProtocol::RoundState => "round_state",
        GossipProtocol::VoteList => "vote_list",
    }
}

#[derive(Clone)]
pub struct GossipMetrics {
    /// Unicasts dispatched, by protocol.
    pub unicasts: IntCounterVec,
    /// Round-state broadcasts dispatched.
    pub broadcasts: IntCounter,
    /// Inbound messages dropped, by failure kind.
    pub receive_failures: IntCounterVec,
    /// Fast-sync fetches started.
    pub fetches_started: IntCounter,
    /// Live peer tasks.
    pub peer_tasks: IntGauge,
}

impl GossipMetrics {
    pub fn new(registry: &Registry) -> Self {
        let unicasts = IntCounterVec::new(
            Opts::new("gossip_unicasts_total", "Unicasts dispatched, by protocol"),
            &["protocol"],
        )
        .expect("metric definition");
        let broadcasts = IntCounter::new(
            "gossip_round_state_broadcasts_total",
            "Round-state broadcasts dispatched",
        )
        .expect("metric definition");
        let receive_failures = IntCounterVec::new(
            Opts::new("gossip_receive_failures_total", "Inbound messages dropped, by kind"),
            &["kind"],
        )
        .expect("metric definition");
        let fetches_started =
            IntCounter::new("gossip_fast_sync_fetches_total", "Fast-sync fetches started")
                .expect("metric definition");
        let peer_tasks =
            IntGauge::new("gossip_peer_tasks", "Live peer tasks").expect("metric definition");

        registry.register(Box::new(unicasts.clone())).expect("register metric");
        registry.register(Box::new(broadcasts.clone())).expect("register metric");
        registry.register(Box::new(receive_failures.clone())).expect("register metric");
        registry.register(Box::new(fetches_started.clone())).expect("register metric");
        registry.register(Box::new(peer_tasks.clone())).expect("register metric");

        Self { unicasts, broadcasts, receive_failures, fetches_started, peer_tasks }
    }
}

impl Default for GossipMetrics {
    fn default() -> Self {
        Self::new(&Registry::new())
    }
}
