//! The gossip synchronizer.
//!
//! Owns the peer set and the periodic round-state broadcast, dispatches
//! inbound messages from the transport, and drives fast-sync when a peer
//! is too far ahead. All state shared with the consensus engine sits
//! behind one coarse mutex: at any moment either the engine is advancing
//! or the synchronizer is deciding, never both. Marshaling and network
//! I/O always happen after the mutex is released.

use crate::{
    engine::{BlockStore, ConsensusEngine},
    error::SyncError,
    metrics::GossipMetrics,
    peer::{Peer, PeerTask},
};
use futures::future::join_all;
use mn_config::GossipParameters;
use mn_fast_sync::{BlockFetchResult, FastSyncError, FastSyncService, FetchCancel, FetchListener};
use mn_network_types::{
    BlockPartMessage, BroadcastScope, GossipNetwork, GossipProtocol, NetworkError, ProtocolHandler,
    Reactor, ReceiveError, RoundStateMessage, VoteListMessage, GOSSIP_REACTOR_NAME,
};
use mn_types::{encode, try_decode, PeerId, Step};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::Instant,
};
use tracing::{debug, info, trace, warn};

/// State behind the single coarse mutex shared with the engine.
pub(crate) struct Shared<E> {
    pub engine: E,
    /// Order is not observable; removal is swap-and-pop.
    pub peers: Vec<Peer>,
    /// Done channels of peers that left before `stop`; still joined there.
    pub departed: Vec<oneshot::Receiver<()>>,
    /// Present from `start` to `stop`.
    pub handler: Option<Arc<dyn ProtocolHandler>>,
    pub running: bool,
    /// Bumped by every broadcast; a timer firing with a stale generation
    /// is a replaced timer and does nothing.
    pub timer_gen: u64,
    pub last_broadcast: Option<Instant>,
    /// Present iff a fast-sync fetch is outstanding.
    pub fetch: Option<Box<dyn FetchCancel>>,
}

pub(crate) struct Inner<E, B, F> {
    pub shared: Mutex<Shared<E>>,
    pub blocks: B,
    pub fast_sync: F,
    pub params: GossipParameters,
    pub metrics: GossipMetrics,
    pub shutdown: watch::Sender<bool>,
}

/// Handle to the synchronizer. Cheap to clone; all clones share state.
pub struct GossipSynchronizer<E, B, F> {
    pub(crate) inner: Arc<Inner<E, B, F>>,
}

impl<E, B, F> Clone for GossipSynchronizer<E, B, F> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<E, B, F> std::fmt::Debug for GossipSynchronizer<E, B, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GossipSynchronizer").finish_non_exhaustive()
    }
}

impl<E, B, F> GossipSynchronizer<E, B, F>
where
    E: ConsensusEngine + 'static,
    B: BlockStore + 'static,
    F: FastSyncService + 'static,
{
    /// Create a stopped synchronizer around an engine, a block store, and
    /// a fast-sync service.
    pub fn new(
        engine: E,
        blocks: B,
        fast_sync: F,
        params: GossipParameters,
    ) -> Result<Self, SyncError> {
        params.validate()?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    engine,
                    peers: Vec::new(),
                    departed: Vec::new(),
                    handler: None,
                    running: false,
                    timer_gen: 0,
                    last_broadcast: None,
                    fetch: None,
                }),
                blocks,
                fast_sync,
                params,
                metrics: GossipMetrics::default(),
                shutdown,
            }),
        })
    }

    pub(crate) fn from_inner(inner: Arc<Inner<E, B, F>>) -> Self {
        Self { inner }
    }

    pub fn metrics(&self) -> &GossipMetrics {
        &self.inner.metrics
    }

    /// Run `f` against the engine under the shared mutex.
    ///
    /// This is how the engine driver advances the engine; a step change
    /// made here is announced afterwards with [Self::on_engine_step_change],
    /// which re-acquires the mutex as its first action.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        let mut shared = self.inner.shared.lock();
        f(&mut shared.engine)
    }

    /// Register with the transport, spawn a task per current peer, and
    /// send the initial round-state broadcast.
    ///
    /// Must be called from within a tokio runtime; peer tasks and the
    /// broadcast timer are spawned onto it.
    pub fn start(&self, network: &dyn GossipNetwork) -> Result<(), SyncError> {
        {
            let shared = self.inner.shared.lock();
            if shared.running {
                return Err(SyncError::AlreadyRunning);
            }
        }
        self.inner.params.tracing();

        let reactor: Arc<dyn Reactor> = Arc::new(self.clone());
        let handler = network
            .register_reactor(
                GOSSIP_REACTOR_NAME,
                &GossipProtocol::ALL,
                self.inner.params.protocol_priority,
                reactor,
            )
            .map_err(SyncError::Registration)?;
        self.inner.fast_sync.start_server();
        let _ = self.inner.shutdown.send_replace(false);

        {
            let mut shared = self.inner.shared.lock();
            shared.running = true;
            shared.handler = Some(Arc::clone(&handler));
            for peer_id in handler.peers() {
                self.spawn_peer(&mut shared, peer_id);
            }
        }
        self.send_round_state();
        info!(target: "gossip-sync", "gossip synchronizer started");
        Ok(())
    }

    /// Tear everything down: peer tasks are signaled and joined, an
    /// outstanding fetch is canceled, the broadcast timer is invalidated,
    /// and the fast-sync server is stopped. Peer tasks are joined after
    /// the mutex is released.
    pub async fn stop(&self) {
        let (dones, fetch) = {
            let mut shared = self.inner.shared.lock();
            if !shared.running {
                return;
            }
            shared.running = false;
            shared.handler = None;
            shared.timer_gen = shared.timer_gen.wrapping_add(1);
            let mut dones: Vec<_> = shared.departed.drain(..).collect();
            for peer in shared.peers.iter_mut() {
                peer.running = false;
                peer.wake();
                if let Some(done) = peer.done.take() {
                    dones.push(done);
                }
            }
            shared.peers.clear();
            (dones, shared.fetch.take())
        };

        let _ = self.inner.shutdown.send(true);
        if let Some(fetch) = fetch {
            fetch.cancel();
        }
        join_all(dones).await;
        self.inner.fast_sync.stop_server();
        info!(target: "gossip-sync", "gossip synchronizer stopped");
    }

    /// Create the record and task for a peer, unless one already exists.
    pub(crate) fn spawn_peer(&self, shared: &mut Shared<E>, id: PeerId) {
        if shared.peers.iter().any(|p| p.id == id) {
            return;
        }
        let (wakeup_tx, wakeup_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = oneshot::channel();
        shared.peers.push(Peer {
            id,
            state: None,
            wakeup: wakeup_tx.clone(),
            done: Some(done_rx),
            running: true,
        });
        self.inner.metrics.peer_tasks.inc();
        let task = PeerTask {
            peer_id: id,
            inner: Arc::clone(&self.inner),
            wakeup_rx,
            wakeup_tx,
            shutdown: self.inner.shutdown.subscribe(),
            done: done_tx,
            next_send: Instant::now(),
        };
        tokio::spawn(task.run());
        debug!(target: "gossip-sync", peer = %id, "peer task spawned");
    }

    /// Broadcast our round state to all neighbors and re-arm the periodic
    /// timer. The previous timer, if still pending, is replaced.
    pub fn send_round_state(&self) {
        let prepared = {
            let mut shared = self.inner.shared.lock();
            self.prepare_broadcast(&mut shared)
        };
        if let Some((handler, bytes)) = prepared {
            self.dispatch_broadcast(handler, bytes);
        }
    }

    fn prepare_broadcast(
        &self,
        shared: &mut Shared<E>,
    ) -> Option<(Arc<dyn ProtocolHandler>, Vec<u8>)> {
        if !shared.running {
            return None;
        }
        let handler = shared.handler.clone()?;
        let msg = shared.engine.round_state();
        if let Some(last) = shared.last_broadcast {
            trace!(target: "gossip-sync", elapsed = ?last.elapsed(), "round state rebroadcast");
        }
        shared.last_broadcast = Some(Instant::now());
        shared.timer_gen = shared.timer_gen.wrapping_add(1);
        self.arm_timer(shared.timer_gen);
        Some((handler, encode(&msg)))
    }

    fn arm_timer(&self, generation: u64) {
        let this = self.clone();
        let interval = self.inner.params.round_state_interval;
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            this.on_broadcast_timer(generation);
        });
    }

    fn on_broadcast_timer(&self, generation: u64) {
        let prepared = {
            let mut shared = self.inner.shared.lock();
            if !shared.running || shared.timer_gen != generation {
                // a broadcast since this timer was armed replaced it
                return;
            }
            self.prepare_broadcast(&mut shared)
        };
        if let Some((handler, bytes)) = prepared {
            self.dispatch_broadcast(handler, bytes);
        }
    }

    fn dispatch_broadcast(&self, handler: Arc<dyn ProtocolHandler>, bytes: Vec<u8>) {
        if let Err(error) =
            handler.broadcast(GossipProtocol::RoundState, bytes, BroadcastScope::Neighbors)
        {
            warn!(target: "gossip-sync", %error, "round state broadcast failed");
        }
        self.inner.metrics.broadcasts.inc();
    }

    /// The engine moved to a new step.
    ///
    /// Acquires the shared mutex as its first action; callers invoke this
    /// after releasing their [Self::with_engine] access.
    pub fn on_engine_step_change(&self) {
        let rebroadcast = {
            let shared = self.inner.shared.lock();
            if !shared.running {
                return;
            }
            let step = shared.engine.step();
            // new votes or parts become interesting at these steps
            if matches!(step, Step::PrecommitWait | Step::Commit) {
                for peer in &shared.peers {
                    peer.wake();
                }
            }
            matches!(step, Step::Propose | Step::Commit)
        };
        if rebroadcast {
            self.send_round_state();
        }
    }

    fn receive_block_part(&self, bytes: &[u8], sender: &PeerId) -> Result<bool, ReceiveError> {
        let msg: BlockPartMessage = try_decode(bytes)?;
        msg.verify()?;
        let mut shared = self.inner.shared.lock();
        if !shared.running {
            return Ok(false);
        }
        let index = shared.engine.receive_block_part(&msg, true)?;
        trace!(target: "gossip-sync", peer = %sender, height = msg.height, index, "block part accepted");
        // peers alongside us inside commit can use the new part
        let height = shared.engine.height();
        for peer in &shared.peers {
            if let Some(state) = &peer.state {
                if state.height == height && state.block_parts_mask.is_some() {
                    peer.wake();
                }
            }
        }
        Ok(false)
    }

    fn receive_round_state(&self, bytes: &[u8], sender: &PeerId) -> Result<bool, ReceiveError> {
        let msg: RoundStateMessage = try_decode(bytes)?;
        msg.verify()?;
        let mut shared = self.inner.shared.lock();
        if !shared.running {
            return Ok(false);
        }
        match shared.peers.iter_mut().find(|p| p.id == *sender) {
            Some(peer) if peer.running => {
                trace!(
                    target: "gossip-sync",
                    peer = %sender, height = msg.height, round = msg.round, sync = msg.sync,
                    "round state updated"
                );
                peer.state = Some(msg);
                peer.wake();
            }
            _ => debug!(target: "gossip-sync", peer = %sender, "round state from unknown peer"),
        }
        Ok(false)
    }

    fn receive_vote_list(&self, bytes: &[u8], sender: &PeerId) -> Result<bool, ReceiveError> {
        let msg: VoteListMessage = try_decode(bytes)?;
        msg.verify()?;
        let mut shared = self.inner.shared.lock();
        if !shared.running {
            return Ok(false);
        }
        // a rejection aborts the rest of this message; votes already
        // delivered stay delivered
        for vote in &msg.votes {
            shared.engine.receive_vote(vote, true)?;
        }
        trace!(target: "gossip-sync", peer = %sender, votes = msg.votes.len(), "vote list accepted");
        Ok(false)
    }
}

impl<E, B, F> Reactor for GossipSynchronizer<E, B, F>
where
    E: ConsensusEngine + 'static,
    B: BlockStore + 'static,
    F: FastSyncService + 'static,
{
    fn on_receive(
        &self,
        proto: GossipProtocol,
        bytes: &[u8],
        sender: &PeerId,
    ) -> Result<bool, ReceiveError> {
        let result = match proto {
            GossipProtocol::BlockPart => self.receive_block_part(bytes, sender),
            GossipProtocol::RoundState => self.receive_round_state(bytes, sender),
            GossipProtocol::VoteList => self.receive_vote_list(bytes, sender),
        };
        if let Err(error) = &result {
            let kind = match error {
                ReceiveError::Decode(_) => "decode",
                ReceiveError::Verification(_) => "verify",
                ReceiveError::Rejected(_) => "rejected",
            };
            self.inner.metrics.receive_failures.with_label_values(&[kind]).inc();
            debug!(target: "gossip-sync", peer = %sender, ?proto, %error, "inbound message dropped");
        }
        result
    }

    fn on_failure(&self, error: NetworkError, proto: GossipProtocol, _bytes: &[u8]) {
        // the next round state reconciles; nothing to retry here
        warn!(target: "gossip-sync", %error, ?proto, "transport reported send failure");
    }

    fn on_join(&self, peer: &PeerId) {
        let prepared = {
            let mut shared = self.inner.shared.lock();
            if !shared.running {
                return;
            }
            self.spawn_peer(&mut shared, *peer);
            shared.handler.clone().map(|handler| (handler, encode(&shared.engine.round_state())))
        };
        // greet the newcomer with our round state so it can start serving us
        if let Some((handler, bytes)) = prepared {
            if let Err(error) = handler.unicast(GossipProtocol::RoundState, bytes, peer) {
                warn!(target: "gossip-sync", peer = %peer, %error, "round state unicast failed");
            }
        }
    }

    fn on_leave(&self, peer: &PeerId) {
        let mut shared = self.inner.shared.lock();
        if !shared.running {
            return;
        }
        if let Some(position) = shared.peers.iter().position(|p| p.id == *peer) {
            let mut removed = shared.peers.swap_remove(position);
            removed.running = false;
            removed.wake();
            if let Some(done) = removed.done.take() {
                shared.departed.push(done);
            }
            debug!(target: "gossip-sync", peer = %peer, "peer left");
        }
    }
}

impl<E, B, F> FetchListener for GossipSynchronizer<E, B, F>
where
    E: ConsensusEngine + 'static,
    B: BlockStore + 'static,
    F: FastSyncService + 'static,
{
    fn on_block(&self, result: BlockFetchResult) {
        let mut shared = self.inner.shared.lock();
        if !shared.running {
            return;
        }
        trace!(target: "gossip-sync", height = result.block.height, "fast sync block");
        shared.engine.receive_block(result);
    }

    fn on_end(&self, error: Option<FastSyncError>) {
        let fetch = {
            let mut shared = self.inner.shared.lock();
            match &error {
                Some(error) => info!(target: "gossip-sync", %error, "fast sync fetch ended"),
                None => info!(target: "gossip-sync", "fast sync fetch complete"),
            }
            shared.fetch.take()
        };
        // the handle owns service-side resources; drop it unlocked
        drop(fetch);
    }
}
