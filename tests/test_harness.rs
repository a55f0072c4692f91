//! Test harness for multi-node election and discovery tests.
//!
//! Nodes run on an in-process [`LocalNetwork`] so that partitions, isolation
//! and crashes can be injected without sockets.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use herald::config::DiscoveryConfig;
use herald::coordinator::{Coordinator, CoordinatorHandle, StateApplier};
use herald::raft::RaftRole;
use herald::transport::local::LocalNetwork;
use herald::transport::{
    LivenessPingResponse, PublishAck, Request, Response, Transport, VoteResponse,
};
use herald::{ClusterView, NodeId, StateEnvelope, TransportError};

pub fn address(index: usize) -> String {
    format!("node-{index}:9300")
}

/// Node configuration with short timeouts for faster tests.
pub fn test_config(index: usize, size: usize) -> DiscoveryConfig {
    let mut config = DiscoveryConfig::new(
        format!("node-{index}"),
        "127.0.0.1:0".parse().unwrap(),
    )
    .with_cluster_id("test-cluster")
    .with_advertise_addr(address(index))
    .with_seed(index as u64 * 7919);
    for peer in 1..=size {
        config = config.with_peer(address(peer));
    }
    config.election_timeout_ms = 200;
    config.discovery_ping_timeout_ms = 150;
    config.ping_interval_ms = 50;
    config.ping_timeout_ms = 100;
    config.ping_retries = 3;
    config.initial_election_delay_max_ms = 200;
    config.join_backoff_min_ms = 50;
    config.join_backoff_max_ms = 250;
    config.join_attempts_before_election = 3;
    config.publish_timeout_ms = 500;
    config
}

/// Applier that keeps every envelope it was given and can be told to fail.
#[derive(Default)]
pub struct RecordingApplier {
    applied: Mutex<Vec<StateEnvelope>>,
    fail: AtomicBool,
}

impl RecordingApplier {
    pub fn applied(&self) -> Vec<StateEnvelope> {
        self.applied.lock().unwrap().clone()
    }

    pub fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl StateApplier for RecordingApplier {
    fn apply(&self, envelope: &StateEnvelope) -> Result<(), String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("applier refused the state".to_string());
        }
        self.applied.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

/// Handle to a running test node
pub struct TestNode {
    pub id: NodeId,
    pub address: String,
    pub handle: CoordinatorHandle,
    pub applier: Arc<RecordingApplier>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl TestNode {
    pub fn view(&self) -> ClusterView {
        self.handle.view()
    }

    pub async fn is_leader(&self) -> bool {
        self.handle.store().role().await == RaftRole::Leader
    }

    pub fn current_term(&self) -> u64 {
        self.handle.store().term()
    }

    pub fn leader_id(&self) -> Option<NodeId> {
        self.view().leader.map(|l| l.id)
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.task.abort();
    }
}

/// Start a coordinator on `network` and register it under its address.
pub async fn start_node(network: &LocalNetwork, config: DiscoveryConfig) -> TestNode {
    let transport = Arc::new(network.transport(config.local_address()));
    let node = start_with_transport(config, transport);
    network
        .register(node.address.clone(), Arc::new(node.handle.clone()))
        .await;
    node
}

/// Start a coordinator talking through an arbitrary transport.
pub fn start_with_transport(config: DiscoveryConfig, transport: Arc<dyn Transport>) -> TestNode {
    let address = config.local_address();
    let id = config.node_id.clone();
    let applier = Arc::new(RecordingApplier::default());
    let (coordinator, handle, rx) =
        Coordinator::new(config, transport, applier.clone()).expect("valid test config");

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let task = tokio::spawn(async move {
        coordinator.run(rx, token).await;
    });

    TestNode {
        id,
        address,
        handle,
        applier,
        shutdown,
        task,
    }
}

/// Config for a node that never gets past discovery on its own: discovery
/// pings are expected to hang and the round deadline is far away.
pub fn idle_config() -> DiscoveryConfig {
    let mut config = test_config(1, 3);
    config.discovery_ping_timeout_ms = 600_000;
    config
}

/// Script for an idle node: liveness pings are answered as if every target
/// were a healthy leader, everything else hangs.
pub fn idle_script(_address: &str, request: &Request) -> Option<Result<Response, TransportError>> {
    match request {
        Request::LivenessPing(ping) => Some(Ok(Response::LivenessPing(LivenessPingResponse {
            term: 0,
            leader_id: Some(ping.target_id.clone()),
        }))),
        _ => None,
    }
}

/// Id of the node listening on `address`, following [`address`].
pub fn node_id_at(address: &str) -> NodeId {
    NodeId::from(address.trim_end_matches(":9300"))
}

/// Script for a node whose peers all cooperate: votes are granted, publishes
/// acked and liveness pings answered. Discovery pings and joins hang, so the
/// node finds no leader and elects itself.
pub fn granting_script(address: &str, request: &Request) -> Option<Result<Response, TransportError>> {
    match request {
        Request::Vote(vote) => Some(Ok(Response::Vote(VoteResponse {
            term: vote.for_term,
            voter_id: node_id_at(address),
            voted_for: Some(vote.candidate_id.clone()),
        }))),
        Request::Publish(publish) => Some(Ok(Response::PublishAck(PublishAck {
            term: publish.term,
            node_id: node_id_at(address),
        }))),
        Request::LivenessPing(_) => Some(Ok(Response::LivenessPing(LivenessPingResponse {
            term: 0,
            leader_id: None,
        }))),
        _ => None,
    }
}

/// Test cluster managing multiple nodes
pub struct TestCluster {
    pub network: LocalNetwork,
    pub nodes: BTreeMap<NodeId, TestNode>,
}

impl TestCluster {
    /// Create and start a cluster with n nodes
    pub async fn new(num_nodes: usize) -> Self {
        Self::with_config(num_nodes, |_| {}).await
    }

    pub async fn with_config(num_nodes: usize, tweak: impl Fn(&mut DiscoveryConfig)) -> Self {
        let network = LocalNetwork::new();
        let mut nodes = BTreeMap::new();
        for index in 1..=num_nodes {
            let mut config = test_config(index, num_nodes);
            tweak(&mut config);
            let node = start_node(&network, config).await;
            nodes.insert(node.id.clone(), node);
        }
        Self { network, nodes }
    }

    pub fn get_node(&self, id: &NodeId) -> Option<&TestNode> {
        self.nodes.get(id)
    }

    pub async fn leaders(&self) -> Vec<NodeId> {
        let mut leaders = Vec::new();
        for (id, node) in &self.nodes {
            if node.is_leader().await {
                leaders.push(id.clone());
            }
        }
        leaders
    }

    pub async fn count_leaders(&self) -> usize {
        self.leaders().await.len()
    }

    /// Wait until some node leads and every other live node follows it.
    pub async fn wait_for_leader(&self, timeout_duration: Duration) -> Option<NodeId> {
        let ids: Vec<NodeId> = self.nodes.keys().cloned().collect();
        self.wait_for_leader_in_group(&ids, timeout_duration).await
    }

    pub async fn wait_for_leader_in_group(
        &self,
        group: &[NodeId],
        timeout_duration: Duration,
    ) -> Option<NodeId> {
        let settled = wait_for(
            || async { self.settled_leader(group).await.is_some() },
            timeout_duration,
            Duration::from_millis(25),
        )
        .await;
        if settled {
            self.settled_leader(group).await
        } else {
            None
        }
    }

    async fn settled_leader(&self, group: &[NodeId]) -> Option<NodeId> {
        let mut leader = None;
        for id in group {
            let node = self.nodes.get(id)?;
            if node.is_leader().await {
                if leader.is_some() {
                    return None;
                }
                leader = Some(id.clone());
            }
        }
        let leader = leader?;
        let term = self.nodes.get(&leader)?.current_term();
        for id in group {
            let node = self.nodes.get(id)?;
            if node.leader_id().as_ref() != Some(&leader) || node.current_term() != term {
                return None;
            }
        }
        Some(leader)
    }

    /// Wait for a settled leader other than `excluded`.
    pub async fn wait_for_new_leader(
        &self,
        excluded: &NodeId,
        timeout_duration: Duration,
    ) -> Option<NodeId> {
        let group: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|id| *id != excluded)
            .cloned()
            .collect();
        self.wait_for_leader_in_group(&group, timeout_duration).await
    }

    /// Stop a node and remove it from the network, as if it crashed.
    pub async fn shutdown_node(&mut self, id: &NodeId) -> bool {
        match self.nodes.remove(id) {
            Some(node) => {
                self.network.deregister(&node.address).await;
                drop(node);
                true
            }
            None => false,
        }
    }

    pub async fn isolate_node(&self, id: &NodeId) {
        if let Some(node) = self.nodes.get(id) {
            self.network.isolate(&node.address).await;
        }
    }

    pub async fn heal(&self) {
        self.network.heal().await;
    }

    pub fn ids_except(&self, excluded: &NodeId) -> Vec<NodeId> {
        self.nodes
            .keys()
            .filter(|id| *id != excluded)
            .cloned()
            .collect()
    }
}

type Script = dyn Fn(&str, &Request) -> Option<Result<Response, TransportError>> + Send + Sync;

/// Transport answering requests from a closure.
///
/// Returning `None` from the script makes the request hang, like a peer
/// behind a partition.
pub struct ScriptedTransport {
    script: Box<Script>,
    requests: Mutex<Vec<(String, Request)>>,
    delays: Mutex<HashMap<String, Duration>>,
    reconnects: AtomicUsize,
    reconnect_ok: AtomicBool,
}

impl ScriptedTransport {
    pub fn new(
        script: impl Fn(&str, &Request) -> Option<Result<Response, TransportError>>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            requests: Mutex::new(Vec::new()),
            delays: Mutex::new(HashMap::new()),
            reconnects: AtomicUsize::new(0),
            reconnect_ok: AtomicBool::new(true),
        })
    }

    pub fn requests(&self) -> Vec<(String, Request)> {
        self.requests.lock().unwrap().clone()
    }

    /// Hold back every answer from `address` by `delay`.
    pub fn set_delay(&self, address: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(address.to_string(), delay);
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub fn set_reconnect_ok(&self, ok: bool) {
        self.reconnect_ok.store(ok, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(&self, address: &str, request: Request) -> Result<Response, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((address.to_string(), request.clone()));
        let result = (self.script)(address, &request);
        let delay = self.delays.lock().unwrap().get(address).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match result {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    async fn reconnect(&self, address: &str) -> Result<(), TransportError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        if self.reconnect_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Unreachable(address.to_string()))
        }
    }
}

/// Wait for a condition to become true with timeout
pub async fn wait_for<F, Fut>(condition: F, timeout_duration: Duration, poll_interval: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

/// Assert a condition eventually becomes true
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(25)).await;
    assert!(result, "Condition not met within {timeout_duration:?}: {message}");
}
