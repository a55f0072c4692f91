//! The coordinator owns the node's lifecycle: discovery, joining,
//! elections, applying incoming state and publishing as leader.
//!
//! Every state change runs on one actor task that drains a single queue.
//! RPC handlers and background tasks only post messages to it, so election
//! results, applied state and role changes never interleave. Delayed work
//! (join retries, election results) carries the epoch it was scheduled in
//! and is dropped if the epoch has moved on by the time it arrives.

mod handle;
mod publish;
pub mod reconcile;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::DiscoveryConfig;
use crate::discovery::{DiscoveryProbe, PingResult};
use crate::error::{DiscoveryError, Result};
use crate::fault::{DetectorSettings, FaultDetector, FaultEvent, MonitorMode};
use crate::raft::election::run_election;
use crate::raft::rpc::handle_request_vote;
use crate::raft::{ElectionOutcome, RaftRole, RandomDelay, TermStore};
use crate::transport::{
    JoinRequest, JoinResponse, PublishAck, PublishRequest, Request, Transport, VoteRequest,
    VoteResponse,
};
use crate::types::{ClusterView, DiscoveryNode, NodeId, Phase, StateEnvelope};

pub use handle::CoordinatorHandle;
pub use publish::{NodeAck, PublishHandle};
use publish::Broadcast;
use reconcile::{decide, take_latest, Decision};

/// Applies an accepted envelope to whatever the payload describes.
///
/// An error leaves the node on its previous state; nothing of the failed
/// envelope is recorded.
pub trait StateApplier: Send + Sync + 'static {
    fn apply(&self, envelope: &StateEnvelope) -> std::result::Result<(), String>;
}

/// Applier that only logs what it is given.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingApplier;

impl StateApplier for LoggingApplier {
    fn apply(&self, envelope: &StateEnvelope) -> std::result::Result<(), String> {
        tracing::info!(
            term = envelope.term,
            version = envelope.version,
            leader = %envelope.leader_id,
            bytes = envelope.payload.len(),
            "Applied cluster state"
        );
        Ok(())
    }
}

/// An incoming envelope waiting for the actor.
pub(crate) struct PendingState {
    pub request: PublishRequest,
    pub reply: oneshot::Sender<Result<PublishAck>>,
}

impl PendingState {
    fn ordering(&self) -> (&NodeId, (u64, u64)) {
        let envelope = &self.request.envelope;
        (&envelope.leader_id, envelope.ordering_key())
    }
}

pub(crate) type PendingBuffer = Arc<Mutex<VecDeque<PendingState>>>;

/// Messages processed by the coordinator loop.
pub enum CoordinatorMessage {
    Vote {
        request: VoteRequest,
        reply: oneshot::Sender<Result<VoteResponse>>,
    },
    /// New entries were pushed to the pending state buffer.
    ProcessPending,
    Join {
        request: JoinRequest,
        reply: oneshot::Sender<Result<JoinResponse>>,
    },
    Publish {
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<PublishHandle>>,
    },
    JoinTimer {
        epoch: u64,
        attempt: u32,
    },
    ProbeFinished {
        epoch: u64,
        attempt: u32,
        result: PingResult,
    },
    JoinFinished {
        epoch: u64,
        attempt: u32,
        leader: DiscoveryNode,
        result: Result<JoinResponse>,
    },
    ElectionFinished {
        epoch: u64,
        outcome: ElectionOutcome,
    },
    HigherTermObserved {
        term: u64,
        source: String,
    },
}

pub struct Coordinator {
    config: DiscoveryConfig,
    local: DiscoveryNode,
    store: Arc<TermStore>,
    transport: Arc<dyn Transport>,
    applier: Arc<dyn StateApplier>,
    probe: DiscoveryProbe,
    detector: FaultDetector,
    faults: Option<mpsc::UnboundedReceiver<FaultEvent>>,
    tx: mpsc::Sender<CoordinatorMessage>,
    pending: PendingBuffer,

    epoch: u64,
    phase: Phase,
    leader: Option<DiscoveryNode>,
    members: Vec<DiscoveryNode>,
    applied: Option<StateEnvelope>,
    delay: RandomDelay,

    view_tx: watch::Sender<ClusterView>,
    initial_state: watch::Sender<bool>,
}

impl Coordinator {
    pub fn new(
        config: DiscoveryConfig,
        transport: Arc<dyn Transport>,
        applier: Arc<dyn StateApplier>,
    ) -> Result<(Self, CoordinatorHandle, mpsc::Receiver<CoordinatorMessage>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(256);
        let local = DiscoveryNode::new(config.node_id.clone(), config.local_address());
        let store = Arc::new(TermStore::new());
        let probe = DiscoveryProbe::new(
            transport.clone(),
            config.cluster_id.clone(),
            local.clone(),
            config.discovery_ping_timeout(),
        );
        let (detector, faults) = FaultDetector::new(
            transport.clone(),
            config.cluster_id.clone(),
            local.id.clone(),
            store.clone(),
            DetectorSettings::from(&config),
        );
        let pending: PendingBuffer = Arc::new(Mutex::new(VecDeque::new()));

        let view = ClusterView {
            node: local.clone(),
            cluster_id: config.cluster_id.clone(),
            phase: Phase::Initializing,
            term: 0,
            role: RaftRole::Follower,
            voted_for: None,
            leader: None,
            applied_term: 0,
            applied_version: 0,
            members: Vec::new(),
        };
        let (view_tx, view_rx) = watch::channel(view);
        let (initial_state, initial_rx) = watch::channel(false);

        let handle = CoordinatorHandle::new(
            tx.clone(),
            store.clone(),
            local.clone(),
            config.cluster_id.clone(),
            pending.clone(),
            view_rx,
            initial_rx,
        );

        let delay = RandomDelay::new(config.seed);
        let coordinator = Self {
            config,
            local,
            store,
            transport,
            applier,
            probe,
            detector,
            faults: Some(faults),
            tx,
            pending,
            epoch: 0,
            phase: Phase::Initializing,
            leader: None,
            members: Vec::new(),
            applied: None,
            delay,
            view_tx,
            initial_state,
        };
        Ok((coordinator, handle, rx))
    }

    /// Run the coordinator until `shutdown` is cancelled.
    pub async fn run(mut self, mut rx: mpsc::Receiver<CoordinatorMessage>, shutdown: CancellationToken) {
        let Some(mut faults) = self.faults.take() else {
            return;
        };

        tracing::info!(
            node_id = %self.local.id,
            address = %self.local.address,
            cluster_id = %self.config.cluster_id,
            electors = self.config.electorate_size(),
            "Coordinator started"
        );
        let initial = self.delay.up_to(self.config.initial_election_delay_max_ms);
        self.schedule_join(0, initial);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => self.handle_message(msg).await,
                    None => break,
                },
                Some(event) = faults.recv() => self.handle_fault(event).await,
            }
            self.publish_view().await;
        }

        self.detector.stop().await;
        self.flush_pending(DiscoveryError::ShuttingDown).await;
        tracing::info!(node_id = %self.local.id, "Coordinator stopped");
    }

    async fn handle_message(&mut self, msg: CoordinatorMessage) {
        match msg {
            CoordinatorMessage::Vote { request, reply } => {
                let _ = reply.send(Ok(self.handle_vote(request).await));
            }
            CoordinatorMessage::ProcessPending => self.process_pending().await,
            CoordinatorMessage::Join { request, reply } => {
                let _ = reply.send(self.handle_join(request).await);
            }
            CoordinatorMessage::Publish { payload, reply } => {
                let _ = reply.send(self.publish(payload).await);
            }
            CoordinatorMessage::JoinTimer { epoch, attempt } => {
                if epoch == self.epoch {
                    self.start_probe(attempt).await;
                }
            }
            CoordinatorMessage::ProbeFinished {
                epoch,
                attempt,
                result,
            } => {
                if epoch == self.epoch {
                    self.handle_probe(attempt, result).await;
                }
            }
            CoordinatorMessage::JoinFinished {
                epoch,
                attempt,
                leader,
                result,
            } => {
                if epoch == self.epoch {
                    self.handle_join_result(attempt, leader, result).await;
                }
            }
            CoordinatorMessage::ElectionFinished { epoch, outcome } => {
                if epoch == self.epoch {
                    self.handle_election_result(outcome).await;
                } else {
                    tracing::debug!(node_id = %self.local.id, term = outcome.term(), "Ignoring superseded election result");
                }
            }
            CoordinatorMessage::HigherTermObserved { term, source } => {
                self.handle_higher_term(term, &source).await;
            }
        }
    }

    async fn handle_fault(&mut self, event: FaultEvent) {
        match event {
            FaultEvent::NodeFailed {
                node,
                mode: MonitorMode::Followers,
                reason,
            } => {
                if self.store.role().await != RaftRole::Leader {
                    return;
                }
                self.handle_node_removal(node, &reason).await;
            }
            FaultEvent::NodeFailed {
                node,
                mode: MonitorMode::Leader,
                reason,
            } => {
                if self.leader.as_ref() != Some(&node) {
                    return;
                }
                tracing::info!(node_id = %self.local.id, leader = %node, reason = %reason, "Leader gone, rejoining");
                self.rejoin().await;
            }
            FaultEvent::HigherTerm { node, term } => {
                self.handle_higher_term(term, &node.address).await;
            }
        }
    }

    // Joining

    /// Arm the join timer. Anything scheduled before is invalidated.
    fn schedule_join(&mut self, attempt: u32, delay: Duration) {
        self.epoch += 1;
        let epoch = self.epoch;
        let tx = self.tx.clone();
        tracing::debug!(node_id = %self.local.id, epoch, attempt, delay_ms = delay.as_millis() as u64, "Scheduling join");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(CoordinatorMessage::JoinTimer { epoch, attempt }).await;
        });
    }

    fn join_backoff(&mut self) -> Duration {
        self.delay
            .between(self.config.join_backoff_min_ms, self.config.join_backoff_max_ms)
    }

    async fn start_probe(&mut self, attempt: u32) {
        if self.store.role().await == RaftRole::Leader || self.leader.is_some() {
            return;
        }
        let epoch = self.epoch;
        let probe = self.probe.clone();
        let addresses = self.config.elector_addresses();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = probe.ping(&addresses).await;
            let _ = tx
                .send(CoordinatorMessage::ProbeFinished {
                    epoch,
                    attempt,
                    result,
                })
                .await;
        });
    }

    async fn handle_probe(&mut self, attempt: u32, result: PingResult) {
        self.store
            .update(|s| s.observe_term(result.observed_term))
            .await;

        match result.advice {
            Some(leader) if leader.id != self.local.id => {
                tracing::debug!(node_id = %self.local.id, leader = %leader, attempt, "Joining advised leader");
                let epoch = self.epoch;
                let transport = self.transport.clone();
                let tx = self.tx.clone();
                let timeout = self.config.discovery_ping_timeout();
                let req = Request::Join(JoinRequest {
                    cluster_id: self.config.cluster_id.clone(),
                    node: self.local.clone(),
                    term: self.store.term(),
                });
                tokio::spawn(async move {
                    let result = match tokio::time::timeout(timeout, transport.request(&leader.address, req)).await {
                        Ok(Ok(resp)) => resp.into_join(),
                        Ok(Err(e)) => Err(DiscoveryError::unreachable(leader.address.clone(), e)),
                        Err(_) => Err(DiscoveryError::unreachable(
                            leader.address.clone(),
                            crate::error::TransportError::Timeout(leader.address.clone()),
                        )),
                    };
                    let _ = tx
                        .send(CoordinatorMessage::JoinFinished {
                            epoch,
                            attempt,
                            leader,
                            result,
                        })
                        .await;
                });
            }
            _ => self.start_election().await,
        }
    }

    async fn handle_join_result(
        &mut self,
        attempt: u32,
        leader: DiscoveryNode,
        result: Result<JoinResponse>,
    ) {
        match result {
            Ok(resp) => {
                self.store.update(|s| s.observe_term(resp.term)).await;
                tracing::info!(node_id = %self.local.id, leader = %leader, term = resp.term, "Joined leader, waiting for state");
                // Rejoin if the leader never sends us its state.
                let fallback = self.config.publish_timeout();
                self.schedule_join(0, fallback);
            }
            Err(e) => {
                let attempt = attempt + 1;
                tracing::debug!(node_id = %self.local.id, leader = %leader, attempt, error = %e, "Join failed");
                if attempt >= self.config.join_attempts_before_election {
                    tracing::info!(node_id = %self.local.id, attempts = attempt, "Join attempts exhausted, starting election");
                    self.start_election().await;
                } else {
                    let backoff = self.join_backoff();
                    self.schedule_join(attempt, backoff);
                }
            }
        }
    }

    /// Drop the current leader and find a new one.
    async fn rejoin(&mut self) {
        self.leader = None;
        self.members.clear();
        self.phase = Phase::Follower;
        self.detector.stop().await;
        self.flush_pending(DiscoveryError::Rejoining).await;
        let backoff = self.join_backoff();
        self.schedule_join(0, backoff);
    }

    // Elections

    async fn start_election(&mut self) {
        let local_id = self.local.id.clone();
        let (term, self_vote, last) = self
            .store
            .update(|s| {
                let term = s.term() + 1;
                s.observe_term(term);
                s.set_role(RaftRole::Candidate);
                let self_vote = *s.vote_for(local_id.clone()) == local_id;
                (term, self_vote, s.last_accepted())
            })
            .await;

        self.epoch += 1;
        self.phase = Phase::Candidate;
        self.leader = None;

        let request = VoteRequest {
            for_term: term,
            candidate_last_term: last.0,
            candidate_last_version: last.1,
            candidate_id: local_id,
            cluster_id: self.config.cluster_id.clone(),
        };
        let epoch = self.epoch;
        let transport = self.transport.clone();
        let peers = self.config.remote_addresses();
        let electorate = self.config.electorate_size();
        let timeout = self.config.election_timeout();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = run_election(transport, request, peers, electorate, self_vote, timeout).await;
            let _ = tx
                .send(CoordinatorMessage::ElectionFinished { epoch, outcome })
                .await;
        });
    }

    async fn handle_election_result(&mut self, outcome: ElectionOutcome) {
        let snapshot = self.store.snapshot().await;
        if snapshot.role() != RaftRole::Candidate || snapshot.term() != outcome.term() {
            tracing::debug!(
                node_id = %self.local.id,
                term = outcome.term(),
                current_term = snapshot.term(),
                role = %snapshot.role(),
                "Discarding stale election result"
            );
            return;
        }

        match outcome {
            ElectionOutcome::Won { term, live, .. } => {
                self.store.set_role(RaftRole::Leader).await;
                self.epoch += 1;
                self.phase = Phase::Leader;
                self.leader = Some(self.local.clone());
                self.members = std::iter::once(self.local.clone()).chain(live).collect();
                tracing::info!(node_id = %self.local.id, term, members = self.members.len(), "Became leader");

                let followers = self.followers();
                self.detector.start(MonitorMode::Followers, &followers).await;
                self.republish("elected").await;
            }
            ElectionOutcome::Lost { higher_term, .. } => {
                self.store
                    .update(|s| {
                        if let Some(term) = higher_term {
                            s.observe_term(term);
                        }
                        s.set_role(RaftRole::Follower);
                    })
                    .await;
                self.phase = Phase::Follower;
                let backoff = self.join_backoff();
                self.schedule_join(0, backoff);
            }
        }
    }

    async fn handle_vote(&mut self, request: VoteRequest) -> VoteResponse {
        let local_id = self.local.id.clone();
        let (before_role, before_term, resp) = self
            .store
            .update(|s| {
                let role = s.role();
                let term = s.term();
                (role, term, handle_request_vote(s, &request, &local_id))
            })
            .await;

        let granted = resp.voted_for.as_ref() == Some(&request.candidate_id);
        if resp.term > before_term {
            if before_role == RaftRole::Leader {
                tracing::info!(node_id = %self.local.id, term = resp.term, candidate = %request.candidate_id, "Stepping down for higher-term candidate");
            }
            self.leader = None;
            self.members.clear();
            self.phase = Phase::Follower;
            self.detector.stop().await;
            self.flush_pending(DiscoveryError::Rejoining).await;
        }
        if granted && request.candidate_id != local_id {
            // Give the candidate time to win before looking around again.
            let wait = self.config.election_timeout() + self.join_backoff();
            self.schedule_join(0, wait);
        }
        resp
    }

    async fn handle_higher_term(&mut self, term: u64, source: &str) {
        let (changed, was_leader) = self
            .store
            .update(|s| {
                let was_leader = s.role() == RaftRole::Leader;
                (s.observe_term(term), was_leader)
            })
            .await;
        if !changed {
            return;
        }
        tracing::info!(node_id = %self.local.id, term, source, "Observed higher term");
        if was_leader || self.phase == Phase::Candidate {
            self.rejoin().await;
        }
    }

    // Leader side

    fn followers(&self) -> Vec<DiscoveryNode> {
        self.members
            .iter()
            .filter(|m| m.id != self.local.id)
            .cloned()
            .collect()
    }

    async fn handle_join(&mut self, request: JoinRequest) -> Result<JoinResponse> {
        crate::raft::rpc::verify_cluster_id(&self.config.cluster_id, &request.cluster_id)?;
        let role = self.store.role().await;
        if role != RaftRole::Leader {
            return Err(DiscoveryError::IllegalRole {
                required: RaftRole::Leader,
                actual: role,
            });
        }

        let node = request.node;
        self.members
            .retain(|m| m.id == node.id || m.address != node.address);
        if !self.members.contains(&node) {
            tracing::info!(node_id = %self.local.id, joiner = %node, "Node joined");
            self.members.push(node);
        }
        let followers = self.followers();
        self.detector.update_nodes(&followers).await;
        self.republish("node joined").await;

        Ok(JoinResponse {
            term: self.store.term(),
        })
    }

    async fn handle_node_removal(&mut self, node: DiscoveryNode, reason: &str) {
        self.members.retain(|m| m != &node);
        tracing::info!(node_id = %self.local.id, removed = %node, reason, "Removed failed node");

        let electors = self.config.elector_addresses();
        let present = self
            .members
            .iter()
            .filter(|m| electors.contains(&m.address))
            .count();
        if present < self.config.quorum() {
            tracing::warn!(
                node_id = %self.local.id,
                present,
                quorum = self.config.quorum(),
                "Not enough electors left, stepping down"
            );
            self.store.set_role(RaftRole::Follower).await;
            self.rejoin().await;
            return;
        }
        self.republish("node removed").await;
    }

    /// Publish the current payload again so followers see membership changes.
    async fn republish(&mut self, reason: &'static str) {
        let payload = self
            .applied
            .as_ref()
            .map(|env| env.payload.clone())
            .unwrap_or_default();
        match self.publish(payload).await {
            Ok(handle) => {
                let node_id = self.local.id.clone();
                tokio::spawn(async move {
                    let (term, version) = (handle.term, handle.version);
                    if let Err(e) = handle.wait().await {
                        tracing::warn!(%node_id, term, version, reason, error = %e, "Republish failed");
                    }
                });
            }
            Err(e) => {
                tracing::warn!(node_id = %self.local.id, reason, error = %e, "Could not republish state");
            }
        }
    }

    async fn publish(&mut self, payload: Vec<u8>) -> Result<PublishHandle> {
        let snapshot = self.store.snapshot().await;
        if snapshot.role() != RaftRole::Leader {
            return Err(DiscoveryError::IllegalRole {
                required: RaftRole::Leader,
                actual: snapshot.role(),
            });
        }

        let term = snapshot.term();
        let version = self.applied.as_ref().map_or(0, |env| env.version) + 1;
        let envelope = StateEnvelope::new(term, version, self.local.id.clone(), payload);
        self.apply_envelope(&envelope).await?;

        let request = PublishRequest {
            term,
            cluster_id: self.config.cluster_id.clone(),
            source: self.local.clone(),
            members: self.members.clone(),
            envelope,
        };
        tracing::debug!(node_id = %self.local.id, term, version, followers = self.members.len().saturating_sub(1), "Publishing state");
        let handle = Broadcast {
            transport: self.transport.clone(),
            store: self.store.clone(),
            coordinator: self.tx.clone(),
            request,
            followers: self.followers(),
            required: self.config.required_publish_acks(),
            timeout: self.config.publish_timeout(),
        }
        .start();
        Ok(handle)
    }

    // Follower side

    async fn process_pending(&mut self) {
        let drained: Vec<PendingState> = self.pending.lock().await.drain(..).collect();
        if drained.is_empty() {
            return;
        }

        let batches = take_latest(drained, PendingState::ordering);
        for batch in batches {
            let result = self.apply_incoming(&batch.latest.request).await;
            for stale in batch.superseded {
                let _ = stale.reply.send(result.clone());
            }
            let _ = batch.latest.reply.send(result);
        }
    }

    async fn apply_incoming(&mut self, request: &PublishRequest) -> Result<PublishAck> {
        let envelope = &request.envelope;
        let local_term = self.store.term();
        match decide(local_term, self.applied.as_ref(), envelope) {
            Decision::Reject(e) => {
                tracing::debug!(node_id = %self.local.id, source = %request.source, error = %e, "Rejecting state");
                return Err(e);
            }
            Decision::Skip => {
                // Leader, membership and timers stay as they are.
                tracing::trace!(node_id = %self.local.id, term = envelope.term, version = envelope.version, "State already applied");
                return Ok(self.ack());
            }
            Decision::Apply => {
                self.apply_envelope(envelope).await?;
                let was_leader = self
                    .store
                    .update(|s| {
                        let was_leader = s.role() == RaftRole::Leader;
                        s.observe_term(envelope.term);
                        s.set_role(RaftRole::Follower);
                        was_leader
                    })
                    .await;
                if was_leader {
                    tracing::info!(node_id = %self.local.id, term = envelope.term, leader = %request.source, "Stepping down for new leader");
                }
            }
        }

        self.follow(request).await;
        Ok(self.ack())
    }

    fn ack(&self) -> PublishAck {
        PublishAck {
            term: self.store.term(),
            node_id: self.local.id.clone(),
        }
    }

    /// Record `request.source` as leader and watch it.
    async fn follow(&mut self, request: &PublishRequest) {
        self.members = request.members.clone();
        self.phase = Phase::Follower;
        // Cancels join retries and fallbacks.
        self.epoch += 1;

        let leader = &request.source;
        let watching = self.detector.mode().await == Some(MonitorMode::Leader)
            && self.leader.as_ref() == Some(leader);
        if !watching {
            tracing::info!(node_id = %self.local.id, leader = %leader, term = request.term, "Following leader");
            self.leader = Some(leader.clone());
            self.detector
                .start(MonitorMode::Leader, std::slice::from_ref(leader))
                .await;
        }
    }

    /// Hand `envelope` to the applier and record it as applied.
    async fn apply_envelope(&mut self, envelope: &StateEnvelope) -> Result<()> {
        if let Err(reason) = self.applier.apply(envelope) {
            tracing::warn!(
                node_id = %self.local.id,
                term = envelope.term,
                version = envelope.version,
                reason = %reason,
                "Failed to apply state"
            );
            return Err(DiscoveryError::CorruptState {
                term: envelope.term,
                version: envelope.version,
                reason,
            });
        }

        let (term, version) = envelope.ordering_key();
        self.applied = Some(envelope.clone());
        self.store
            .update(|s| s.set_last_accepted(term, version))
            .await;
        self.initial_state.send_if_modified(|applied| {
            if *applied {
                return false;
            }
            tracing::info!(node_id = %self.local.id, term, version, "Initial state applied");
            *applied = true;
            true
        });
        Ok(())
    }

    async fn flush_pending(&mut self, error: DiscoveryError) {
        let drained: Vec<PendingState> = self.pending.lock().await.drain(..).collect();
        for pending in drained {
            let _ = pending.reply.send(Err(error.clone()));
        }
    }

    async fn publish_view(&self) {
        let state = self.store.snapshot().await;
        let (applied_term, applied_version) = self
            .applied
            .as_ref()
            .map_or((0, 0), StateEnvelope::ordering_key);
        self.view_tx.send_replace(ClusterView {
            node: self.local.clone(),
            cluster_id: self.config.cluster_id.clone(),
            phase: self.phase,
            term: state.term(),
            role: state.role(),
            voted_for: state.voted_for().cloned(),
            leader: self.leader.clone(),
            applied_term,
            applied_version,
            members: self.members.clone(),
        });
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local.id
    }
}
