use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{DiscoveryError, Result};
use crate::raft::election::quorum_size;
use crate::types::NodeId;

/// Configuration for a single node taking part in leader election.
///
/// All timings are in milliseconds. `peers` is the static list of addresses
/// that make up the elector set; it may or may not contain this node's own
/// address.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub node_id: NodeId,
    pub cluster_id: String,
    pub listen_addr: SocketAddr,
    /// Address other nodes use to reach this one. Defaults to `listen_addr`.
    pub advertise_addr: Option<String>,
    pub peers: Vec<String>,

    /// Bound on each vote RPC.
    pub election_timeout_ms: u64,
    /// Single timeout shared by all pings of one discovery round.
    pub discovery_ping_timeout_ms: u64,

    /// Fault detection
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
    pub ping_retries: u32,
    pub reconnect_on_disconnect: bool,

    /// Upper bound of the randomized delay before the first join attempt.
    pub initial_election_delay_max_ms: u64,
    pub join_backoff_min_ms: u64,
    pub join_backoff_max_ms: u64,
    pub join_attempts_before_election: u32,

    pub publish_timeout_ms: u64,
    /// Follower acks a publish needs before it counts as successful.
    /// Defaults to a majority of the elector set, minus the leader itself.
    pub min_publish_acks: Option<usize>,

    /// Seed for the randomized delays. Fixed seeds make test runs repeatable.
    pub seed: Option<u64>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::generate(),
            cluster_id: "herald".to_string(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9300)),
            advertise_addr: None,
            peers: Vec::new(),
            election_timeout_ms: 3_000,
            discovery_ping_timeout_ms: 3_000,
            ping_interval_ms: 1_000,
            ping_timeout_ms: 30_000,
            ping_retries: 3,
            reconnect_on_disconnect: true,
            initial_election_delay_max_ms: 300,
            join_backoff_min_ms: 100,
            join_backoff_max_ms: 400,
            join_attempts_before_election: 3,
            publish_timeout_ms: 30_000,
            min_publish_acks: None,
            seed: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn new(node_id: impl Into<NodeId>, listen_addr: SocketAddr) -> Self {
        Self {
            node_id: node_id.into(),
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_cluster_id(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = cluster_id.into();
        self
    }

    pub fn with_peer(mut self, addr: impl Into<String>) -> Self {
        self.peers.push(addr.into());
        self
    }

    pub fn with_advertise_addr(mut self, addr: impl Into<String>) -> Self {
        self.advertise_addr = Some(addr.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn local_address(&self) -> String {
        self.advertise_addr
            .clone()
            .unwrap_or_else(|| self.listen_addr.to_string())
    }

    /// Every address of the elector set, this node included, without duplicates.
    pub fn elector_addresses(&self) -> Vec<String> {
        let local = self.local_address();
        let mut addresses = vec![local];
        for peer in &self.peers {
            if !addresses.contains(peer) {
                addresses.push(peer.clone());
            }
        }
        addresses
    }

    /// Peer addresses to contact, this node excluded.
    pub fn remote_addresses(&self) -> Vec<String> {
        let local = self.local_address();
        self.elector_addresses()
            .into_iter()
            .filter(|addr| *addr != local)
            .collect()
    }

    pub fn electorate_size(&self) -> usize {
        self.elector_addresses().len()
    }

    pub fn quorum(&self) -> usize {
        quorum_size(self.electorate_size())
    }

    pub fn required_publish_acks(&self) -> usize {
        self.min_publish_acks
            .unwrap_or_else(|| self.quorum().saturating_sub(1))
    }

    pub fn election_timeout(&self) -> Duration {
        Duration::from_millis(self.election_timeout_ms)
    }

    pub fn discovery_ping_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_ping_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cluster_id.trim().is_empty() {
            return Err(DiscoveryError::InvalidConfig(
                "cluster id must not be empty".to_string(),
            ));
        }
        if self.ping_retries == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "ping retries must be at least 1".to_string(),
            ));
        }
        if self.join_backoff_min_ms > self.join_backoff_max_ms {
            return Err(DiscoveryError::InvalidConfig(format!(
                "join backoff min ({}) exceeds max ({})",
                self.join_backoff_min_ms, self.join_backoff_max_ms
            )));
        }
        for (name, value) in [
            ("election timeout", self.election_timeout_ms),
            ("discovery ping timeout", self.discovery_ping_timeout_ms),
            ("ping interval", self.ping_interval_ms),
            ("ping timeout", self.ping_timeout_ms),
            ("publish timeout", self.publish_timeout_ms),
        ] {
            if value == 0 {
                return Err(DiscoveryError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}
