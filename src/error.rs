use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::raft::RaftRole;
use crate::types::NodeId;

/// Failures of the transport layer when talking to a single peer.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportError {
    #[error("no route to {0}")]
    Unreachable(String),

    #[error("connection to {0} was lost")]
    Disconnected(String),

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("codec error: {0}")]
    Codec(String),
}

/// Errors surfaced by the election, discovery and publishing machinery.
///
/// The type is serializable so a responder can hand it back to the caller as
/// part of a response.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryError {
    #[error("stale term {received}, current term is {current}")]
    StaleTerm { received: u64, current: u64 },

    #[error("operation requires role {required}, node is {actual}")]
    IllegalRole { required: RaftRole, actual: RaftRole },

    #[error("peer {address} unreachable: {source}")]
    PeerUnreachable {
        address: String,
        source: TransportError,
    },

    #[error("cluster identity mismatch: expected [{expected}], received [{received}]")]
    ClusterIdentityMismatch { expected: String, received: String },

    #[error("failed to apply state (term {term}, version {version}): {reason}")]
    CorruptState {
        term: u64,
        version: u64,
        reason: String,
    },

    #[error("ping addressed to node {target}, but this is node {actual}")]
    NotTarget { target: NodeId, actual: NodeId },

    #[error("publish of version {version} got {acked} of {required} required acks")]
    PublishFailed {
        version: u64,
        acked: usize,
        required: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("node dropped its leader and is rejoining")]
    Rejoining,

    #[error("coordinator is shutting down")]
    ShuttingDown,
}

impl DiscoveryError {
    pub fn unreachable(address: impl Into<String>, source: TransportError) -> Self {
        DiscoveryError::PeerUnreachable {
            address: address.into(),
            source,
        }
    }
}

impl From<std::io::Error> for DiscoveryError {
    fn from(e: std::io::Error) -> Self {
        DiscoveryError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
