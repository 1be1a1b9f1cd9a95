//! Per-peer gossip task.
//!
//! One cooperative task per neighbor. The task blocks on a single-slot
//! wakeup channel; each wakeup takes the shared mutex, picks at most one
//! message for the peer, releases the mutex, and dispatches the message
//! unlocked. A bandwidth cap turns the immediate re-wake into a delayed
//! self-wakeup sized to the message just sent.

use crate::{
    engine::{BlockStore, ConsensusEngine},
    metrics::proto_label,
    synchronizer::{GossipSynchronizer, Inner, Shared},
};
use mn_config::SEND_BPS_UNCAPPED;
use mn_fast_sync::{FastSyncService, FetchListener, FETCH_OPEN_ENDED};
use mn_network_types::{
    BlockPartMessage, GossipProtocol, ProtocolHandler, RoundStateMessage, VoteListMessage,
};
use mn_types::{encode, BitMask, PeerId, Step, VoteList};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::Instant,
};
use tracing::{debug, info, trace, warn};

/// A neighbor's record inside the shared state.
///
/// Exists exactly while the peer is a neighbor and the synchronizer is
/// running; removed by `on_leave` and `stop`.
pub(crate) struct Peer {
    pub id: PeerId,
    /// The peer's last advertisement. `None` until the first round-state
    /// message, and cleared again after an aggregated vote send so the peer
    /// must re-advertise before receiving more votes.
    pub state: Option<RoundStateMessage>,
    /// Single-slot wakeup channel; N wakeups collapse into one.
    pub wakeup: mpsc::Sender<()>,
    /// Signaled by the task on exit; joined during `stop`.
    pub done: Option<oneshot::Receiver<()>>,
    pub running: bool,
}

impl Peer {
    pub fn wake(&self) {
        let _ = self.wakeup.try_send(());
    }
}

/// The message a wakeup decided to send.
pub(crate) enum Outbound {
    Part(BlockPartMessage),
    Votes(VoteListMessage),
}

impl Outbound {
    fn protocol(&self) -> GossipProtocol {
        match self {
            Outbound::Part(_) => GossipProtocol::BlockPart,
            Outbound::Votes(_) => GossipProtocol::VoteList,
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            Outbound::Part(msg) => encode(msg),
            Outbound::Votes(msg) => encode(msg),
        }
    }
}

enum StepOutcome {
    /// The peer record or the synchronizer is gone.
    Exit,
    /// Nothing useful to send; wait for the next wakeup.
    Idle,
    Sent { handler: Arc<dyn ProtocolHandler>, message: Outbound },
}

enum Pace {
    Immediate,
    Delay(Duration),
}

/// The long-running task behind one [Peer] record.
pub(crate) struct PeerTask<E, B, F> {
    pub peer_id: PeerId,
    pub inner: Arc<Inner<E, B, F>>,
    pub wakeup_rx: mpsc::Receiver<()>,
    /// Clone of the record's sender, for immediate and throttled
    /// self-wakeups.
    pub wakeup_tx: mpsc::Sender<()>,
    pub shutdown: watch::Receiver<bool>,
    pub done: oneshot::Sender<()>,
    /// Earliest instant the next send is allowed at, under a bandwidth cap.
    pub next_send: Instant,
}

impl<E, B, F> PeerTask<E, B, F>
where
    E: ConsensusEngine + 'static,
    B: BlockStore + 'static,
    F: FastSyncService + 'static,
{
    pub(crate) async fn run(mut self) {
        debug!(target: "gossip-sync", peer = %self.peer_id, "peer task up");
        'main: loop {
            tokio::select! {
                maybe = self.wakeup_rx.recv() => if maybe.is_none() { break },
                changed = self.shutdown.changed() => {
                    match changed {
                        Ok(()) if !*self.shutdown.borrow() => continue,
                        _ => break,
                    }
                }
            }

            let (handler, message) = match self.step() {
                StepOutcome::Exit => break,
                StepOutcome::Idle => continue,
                StepOutcome::Sent { handler, message } => (handler, message),
            };

            // marshaling and the unicast itself run without the mutex
            let proto = message.protocol();
            let bytes = message.encode();
            let sent_bytes = bytes.len();
            if let Err(error) = handler.unicast(proto, bytes, &self.peer_id) {
                // the peer's next round state reconciles whatever was lost
                warn!(target: "gossip-sync", peer = %self.peer_id, %error, "unicast failed");
            }
            self.inner.metrics.unicasts.with_label_values(&[proto_label(proto)]).inc();

            match self.pace(sent_bytes) {
                Pace::Immediate => self.wake(),
                Pace::Delay(delay) => {
                    trace!(target: "gossip-sync", peer = %self.peer_id, ?delay, "throttled");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => self.wake(),
                        changed = self.shutdown.changed() => {
                            match changed {
                                Ok(()) if !*self.shutdown.borrow() => self.wake(),
                                _ => break 'main,
                            }
                        }
                    }
                }
            }
        }
        self.inner.metrics.peer_tasks.dec();
        let _ = self.done.send(());
        debug!(target: "gossip-sync", peer = %self.peer_id, "peer task down");
    }

    fn wake(&self) {
        let _ = self.wakeup_tx.try_send(());
    }

    /// One wakeup: pick at most one message under the shared mutex.
    fn step(&mut self) -> StepOutcome {
        let sync = GossipSynchronizer::from_inner(Arc::clone(&self.inner));
        let mut shared = self.inner.shared.lock();
        if !shared.running {
            return StepOutcome::Exit;
        }
        let Some(handler) = shared.handler.clone() else {
            return StepOutcome::Exit;
        };
        let Some(index) = shared.peers.iter().position(|p| p.id == self.peer_id) else {
            return StepOutcome::Exit;
        };
        if !shared.peers[index].running {
            return StepOutcome::Exit;
        }
        match sync.do_sync(&mut shared, index) {
            Some(message) => StepOutcome::Sent { handler, message },
            None => StepOutcome::Idle,
        }
    }

    /// Advance the pacing clock by `sent_bytes` worth of link time.
    fn pace(&mut self, sent_bytes: usize) -> Pace {
        let cap = self.inner.params.send_bps;
        if cap == SEND_BPS_UNCAPPED {
            return Pace::Immediate;
        }
        let now = Instant::now();
        if self.next_send < now {
            // the link was idle long enough; restart the budget from now
            self.next_send = now;
        }
        self.next_send += Duration::from_secs_f64(sent_bytes as f64 / cap as f64);
        Pace::Delay(self.next_send - now)
    }
}

impl<E, B, F> GossipSynchronizer<E, B, F>
where
    E: ConsensusEngine + 'static,
    B: BlockStore + 'static,
    F: FastSyncService + 'static,
{
    /// Pick the single most useful message for the peer at `index`, or
    /// `None` to stay idle.
    ///
    /// Runs with the shared mutex held (the caller passes the guarded
    /// state); the oldest height always wins, so commits propagate before
    /// anything else.
    pub(crate) fn do_sync(&self, shared: &mut Shared<E>, index: usize) -> Option<Outbound> {
        let Shared { engine, peers, fetch, .. } = shared;
        let peer = &mut peers[index];
        let peer_id = peer.id;
        let (peer_height, peer_round, wants_sync) = match &peer.state {
            Some(state) => (state.height, state.round, state.sync),
            None => return None,
        };
        if !wants_sync {
            return None;
        }

        let height = engine.height();
        let round = engine.round();
        let step = engine.step();

        // A peer behind us, or alongside us inside commit, needs the
        // committed block before anything else: first the precommits that
        // justify it, then the parts it does not already hold.
        if peer_height < height || (peer_height == height && step >= Step::Commit) {
            let parts = engine.commit_block_parts(peer_height)?;
            let state = peer.state.as_mut()?;

            if state.block_parts_mask.is_none() {
                let votes = engine.commit_precommits(peer_height)?;
                state.block_parts_mask = Some(BitMask::new(parts.parts_total()));
                debug!(
                    target: "gossip-sync",
                    peer = %peer_id, height = peer_height,
                    "sending commit precommits"
                );
                return Some(Outbound::Votes(VoteListMessage::new(votes)));
            }

            let known = state.block_parts_mask.as_mut()?;
            if known.len() != parts.parts_total() {
                // the peer may advertise a mask sized for a different part
                // set; start over from empty
                *known = BitMask::new(parts.parts_total());
            }
            let mut wanted = known.clone();
            wanted.flip();
            let mut candidates = parts.mask().clone();
            candidates.and(&wanted);
            let part_index = candidates.pick_random()?;
            known.set(part_index);
            let payload = parts.part(part_index)?.to_vec();
            trace!(
                target: "gossip-sync",
                peer = %peer_id, height = peer_height, index = part_index,
                "sending block part"
            );
            return Some(Outbound::Part(BlockPartMessage {
                height: peer_height,
                index: part_index as u16,
                payload,
            }));
        }

        // Too far ahead for part-by-part gossip: hand the gap to fast-sync.
        // At most one fetch is outstanding at any instant.
        if peer_height > height {
            if peer_height > height + self.inner.params.fast_sync_threshold && fetch.is_none() {
                match self.inner.blocks.block(height - 1) {
                    Some(anchor) => {
                        let listener: Arc<dyn FetchListener> = Arc::new(self.clone());
                        match self.inner.fast_sync.fetch_blocks(
                            height,
                            FETCH_OPEN_ENDED,
                            anchor,
                            listener,
                        ) {
                            Ok(cancel) => {
                                info!(
                                    target: "gossip-sync",
                                    peer = %peer_id, from = height,
                                    "fast sync fetch started"
                                );
                                self.inner.metrics.fetches_started.inc();
                                *fetch = Some(cancel);
                            }
                            Err(error) => {
                                warn!(target: "gossip-sync", %error, "fast sync fetch refused")
                            }
                        }
                    }
                    None => {
                        warn!(target: "gossip-sync", height = height - 1, "anchor block missing")
                    }
                }
            }
            return None;
        }

        // Same height, peer on an earlier round: replay precommits so the
        // peer can catch up to our round. Clearing the record forces the
        // peer to re-advertise before it gets anything further.
        if peer_round < round {
            let list = if step >= Step::PrecommitWait {
                engine.precommits(round)
            } else {
                engine.precommits(round - 1)
            };
            let votes = non_empty(list)?;
            peer.state = None;
            return Some(Outbound::Votes(VoteListMessage::new(votes)));
        }

        // Same height and round: fill in whatever votes the peer is missing.
        if peer_round == round {
            let state = peer.state.as_ref()?;
            let mut missing_prevotes = state.prevotes_mask.clone();
            missing_prevotes.flip();
            let mut missing_precommits = state.precommits_mask.clone();
            missing_precommits.flip();
            let votes =
                non_empty(engine.votes(round, &missing_prevotes, &missing_precommits))?;
            peer.state = None;
            return Some(Outbound::Votes(VoteListMessage::new(votes)));
        }

        None
    }
}

fn non_empty(list: Option<VoteList>) -> Option<VoteList> {
    list.filter(|votes| !votes.is_empty())
}
