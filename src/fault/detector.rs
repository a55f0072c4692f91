use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, TransportError};
use crate::raft::TermStore;
use crate::transport::{LivenessPingRequest, Request, Transport};
use crate::types::{DiscoveryNode, NodeId};

/// Which side of the leader/follower relationship is being watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    /// A leader watching its followers.
    Followers,
    /// A follower watching its leader.
    Leader,
}

/// Signals reported to the coordinator. The detector never changes
/// membership on its own beyond dropping the failed peer from its own set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultEvent {
    NodeFailed {
        node: DiscoveryNode,
        mode: MonitorMode,
        reason: String,
    },
    /// A monitored follower answered with a term above ours.
    HigherTerm { node: DiscoveryNode, term: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerLivenessRecord {
    pub consecutive_failures: u32,
    pub alive: bool,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
    pub reconnect_on_disconnect: bool,
}

impl From<&DiscoveryConfig> for DetectorSettings {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            interval: config.ping_interval(),
            timeout: config.ping_timeout(),
            retries: config.ping_retries,
            reconnect_on_disconnect: config.reconnect_on_disconnect,
        }
    }
}

struct Monitored {
    node: DiscoveryNode,
    record: PeerLivenessRecord,
    epoch: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct DetectorState {
    mode: Option<MonitorMode>,
    next_epoch: u64,
    peers: HashMap<NodeId, Monitored>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    cluster_id: String,
    local_id: NodeId,
    store: Arc<TermStore>,
    settings: DetectorSettings,
    state: Mutex<DetectorState>,
    events: mpsc::UnboundedSender<FaultEvent>,
    root: CancellationToken,
}

enum PingOutcome {
    Alive,
    Missed(String),
    Disconnected,
    Fatal(String),
}

/// Periodic liveness pinger over a set of peers.
///
/// Each monitored peer gets its own task that pings on a fixed interval.
/// After `retries` consecutive misses the peer is removed from the set and a
/// single [`FaultEvent::NodeFailed`] is sent. Membership is pushed in with
/// [`FaultDetector::update_nodes`]; tasks for removed peers stop at their next
/// wake-up without acting.
pub struct FaultDetector {
    inner: Arc<Inner>,
}

impl FaultDetector {
    pub fn new(
        transport: Arc<dyn Transport>,
        cluster_id: impl Into<String>,
        local_id: NodeId,
        store: Arc<TermStore>,
        settings: DetectorSettings,
    ) -> (Self, mpsc::UnboundedReceiver<FaultEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            transport,
            cluster_id: cluster_id.into(),
            local_id,
            store,
            settings,
            state: Mutex::new(DetectorState::default()),
            events,
            root: CancellationToken::new(),
        });
        (Self { inner }, rx)
    }

    /// Replace whatever was being monitored with `nodes` under `mode`.
    pub async fn start(&self, mode: MonitorMode, nodes: &[DiscoveryNode]) {
        let mut state = self.inner.state.lock().await;
        for (_, peer) in state.peers.drain() {
            peer.cancel.cancel();
        }
        state.mode = Some(mode);
        tracing::debug!(node_id = %self.inner.local_id, ?mode, peers = nodes.len(), "Fault detection started");
        for node in nodes {
            self.inner.add_peer(&mut state, node.clone(), mode);
        }
    }

    /// Apply a membership diff: new nodes are monitored right away, nodes no
    /// longer present stop being pinged.
    pub async fn update_nodes(&self, nodes: &[DiscoveryNode]) {
        let mut state = self.inner.state.lock().await;
        let Some(mode) = state.mode else {
            return;
        };

        state.peers.retain(|id, peer| {
            let keep = nodes.iter().any(|n| n.id == *id);
            if !keep {
                peer.cancel.cancel();
            }
            keep
        });
        for node in nodes {
            if !state.peers.contains_key(&node.id) {
                self.inner.add_peer(&mut state, node.clone(), mode);
            }
        }
    }

    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        for (_, peer) in state.peers.drain() {
            peer.cancel.cancel();
        }
        if state.mode.take().is_some() {
            tracing::debug!(node_id = %self.inner.local_id, "Fault detection stopped");
        }
    }

    pub async fn mode(&self) -> Option<MonitorMode> {
        self.inner.state.lock().await.mode
    }

    pub async fn monitored(&self) -> Vec<DiscoveryNode> {
        let state = self.inner.state.lock().await;
        let mut nodes: Vec<_> = state.peers.values().map(|p| p.node.clone()).collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    pub async fn record(&self, id: &NodeId) -> Option<PeerLivenessRecord> {
        self.inner.state.lock().await.peers.get(id).map(|p| p.record)
    }
}

impl Drop for FaultDetector {
    fn drop(&mut self) {
        self.inner.root.cancel();
    }
}

impl Inner {
    fn add_peer(self: &Arc<Self>, state: &mut DetectorState, node: DiscoveryNode, mode: MonitorMode) {
        if node.id == self.local_id {
            return;
        }
        let epoch = state.next_epoch;
        state.next_epoch += 1;
        let cancel = self.root.child_token();
        state.peers.insert(
            node.id.clone(),
            Monitored {
                node: node.clone(),
                record: PeerLivenessRecord {
                    consecutive_failures: 0,
                    alive: true,
                },
                epoch,
                cancel: cancel.clone(),
            },
        );
        tokio::spawn(self.clone().monitor(node, mode, epoch, cancel));
    }

    async fn monitor(
        self: Arc<Self>,
        node: DiscoveryNode,
        mode: MonitorMode,
        epoch: u64,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return,
                outcome = self.ping(&node, mode) => outcome,
            };

            let outcome = match outcome {
                PingOutcome::Disconnected if self.settings.reconnect_on_disconnect => {
                    match self.transport.reconnect(&node.address).await {
                        Ok(()) => {
                            tracing::debug!(peer = %node, "Reconnected after disconnect");
                            continue;
                        }
                        Err(e) => PingOutcome::Fatal(format!("reconnect failed: {e}")),
                    }
                }
                PingOutcome::Disconnected => PingOutcome::Fatal("disconnected".to_string()),
                other => other,
            };

            if !self.apply_outcome(&node, mode, epoch, outcome).await {
                return;
            }
        }
    }

    async fn ping(&self, node: &DiscoveryNode, mode: MonitorMode) -> PingOutcome {
        let req = Request::LivenessPing(LivenessPingRequest {
            target_id: node.id.clone(),
            cluster_id: self.cluster_id.clone(),
        });
        let resp = match tokio::time::timeout(
            self.settings.timeout,
            self.transport.request(&node.address, req),
        )
        .await
        {
            Err(_) => return PingOutcome::Missed("timed out".to_string()),
            Ok(Err(TransportError::Disconnected(_))) => return PingOutcome::Disconnected,
            Ok(Err(e)) => return PingOutcome::Missed(e.to_string()),
            Ok(Ok(resp)) => resp,
        };

        match resp.into_liveness_ping() {
            Ok(pong) => {
                tracing::trace!(peer = %node, term = pong.term, "Liveness ping answered");
                match mode {
                    MonitorMode::Leader if pong.leader_id.as_ref() != Some(&node.id) => {
                        PingOutcome::Fatal("node is no longer the leader".to_string())
                    }
                    MonitorMode::Followers if pong.term > self.store.term() => {
                        let _ = self.events.send(FaultEvent::HigherTerm {
                            node: node.clone(),
                            term: pong.term,
                        });
                        PingOutcome::Alive
                    }
                    _ => PingOutcome::Alive,
                }
            }
            Err(
                e @ (DiscoveryError::NotTarget { .. }
                | DiscoveryError::ClusterIdentityMismatch { .. }),
            ) => PingOutcome::Fatal(e.to_string()),
            Err(e) => PingOutcome::Missed(e.to_string()),
        }
    }

    /// Returns whether the peer should keep being pinged.
    async fn apply_outcome(
        &self,
        node: &DiscoveryNode,
        mode: MonitorMode,
        epoch: u64,
        outcome: PingOutcome,
    ) -> bool {
        let mut state = self.state.lock().await;
        let Some(peer) = state.peers.get_mut(&node.id).filter(|p| p.epoch == epoch) else {
            return false;
        };

        let reason = match outcome {
            PingOutcome::Alive => {
                peer.record.consecutive_failures = 0;
                return true;
            }
            PingOutcome::Missed(reason) => {
                peer.record.consecutive_failures += 1;
                tracing::debug!(
                    peer = %node,
                    failures = peer.record.consecutive_failures,
                    retries = self.settings.retries,
                    reason = %reason,
                    "Liveness ping missed"
                );
                if peer.record.consecutive_failures < self.settings.retries {
                    return true;
                }
                format!("failed to ping, tried [{}] times: {reason}", self.settings.retries)
            }
            PingOutcome::Fatal(reason) => reason,
            PingOutcome::Disconnected => "disconnected".to_string(),
        };

        peer.record.alive = false;
        if let Some(peer) = state.peers.remove(&node.id) {
            peer.cancel.cancel();
        }
        drop(state);

        tracing::warn!(node_id = %self.local_id, peer = %node, ?mode, reason = %reason, "Peer failed");
        let _ = self.events.send(FaultEvent::NodeFailed {
            node: node.clone(),
            mode,
            reason,
        });
        false
    }
}
