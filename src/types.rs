use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::raft::RaftRole;

/// Version tag advertised by every node of this build.
pub const NODE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Opaque node identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random id. Nodes take a new id on every start so a restarted
    /// process is never mistaken for its previous incarnation.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A cluster member: id, network address and version tag.
///
/// Immutable once created. Two nodes are equal when their ids are equal,
/// regardless of address or version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryNode {
    pub id: NodeId,
    pub address: String,
    pub version: String,
}

impl DiscoveryNode {
    pub fn new(id: impl Into<NodeId>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            version: NODE_VERSION.to_string(),
        }
    }
}

impl PartialEq for DiscoveryNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DiscoveryNode {}

impl Hash for DiscoveryNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for DiscoveryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{{{}}}", self.id, self.address)
    }
}

/// Authoritative cluster state as produced by a leader.
///
/// The payload is opaque here. Competing envelopes are ordered by
/// `(term, version)`, higher wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEnvelope {
    pub term: u64,
    pub version: u64,
    pub leader_id: NodeId,
    pub payload: Vec<u8>,
}

impl StateEnvelope {
    pub fn new(term: u64, version: u64, leader_id: NodeId, payload: Vec<u8>) -> Self {
        Self {
            term,
            version,
            leader_id,
            payload,
        }
    }

    pub fn ordering_key(&self) -> (u64, u64) {
        (self.term, self.version)
    }

    pub fn is_newer_than(&self, other: &StateEnvelope) -> bool {
        self.ordering_key() > other.ordering_key()
    }
}

/// Lifecycle phase of the coordinator. `Initializing` lasts until the node
/// first joins a leader or starts an election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Initializing,
    Follower,
    Candidate,
    Leader,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Initializing => write!(f, "initializing"),
            Phase::Follower => write!(f, "follower"),
            Phase::Candidate => write!(f, "candidate"),
            Phase::Leader => write!(f, "leader"),
        }
    }
}

/// Point-in-time snapshot of what a node believes about the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterView {
    pub node: DiscoveryNode,
    pub cluster_id: String,
    pub phase: Phase,
    pub term: u64,
    pub role: RaftRole,
    pub voted_for: Option<NodeId>,
    pub leader: Option<DiscoveryNode>,
    pub applied_term: u64,
    pub applied_version: u64,
    pub members: Vec<DiscoveryNode>,
}
