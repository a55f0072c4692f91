use serde::{Deserialize, Serialize};

use crate::error::{DiscoveryError, Result};
use crate::types::{ClusterView, DiscoveryNode, NodeId, StateEnvelope};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub for_term: u64,
    pub candidate_last_term: u64,
    pub candidate_last_version: u64,
    pub candidate_id: NodeId,
    pub cluster_id: String,
}

/// A voter's answer. The candidate holds this voter's vote iff
/// `voted_for == Some(candidate_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub term: u64,
    pub voter_id: NodeId,
    pub voted_for: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryPingRequest {
    pub cluster_id: String,
    pub source_id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryPingResponse {
    pub term: u64,
    pub responder: DiscoveryNode,
    pub current_leader: Option<DiscoveryNode>,
    pub voted_for: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessPingRequest {
    pub target_id: NodeId,
    pub cluster_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessPingResponse {
    pub term: u64,
    /// Who the responder currently follows (itself when it leads).
    pub leader_id: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub term: u64,
    pub cluster_id: String,
    pub source: DiscoveryNode,
    /// Membership as the leader sees it, leader included.
    pub members: Vec<DiscoveryNode>,
    pub envelope: StateEnvelope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishAck {
    pub term: u64,
    pub node_id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub cluster_id: String,
    pub node: DiscoveryNode,
    pub term: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResponse {
    pub term: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    Vote(VoteRequest),
    DiscoveryPing(DiscoveryPingRequest),
    LivenessPing(LivenessPingRequest),
    Publish(PublishRequest),
    Join(JoinRequest),
    ClusterView,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Vote(_) => "vote",
            Request::DiscoveryPing(_) => "discovery_ping",
            Request::LivenessPing(_) => "liveness_ping",
            Request::Publish(_) => "publish",
            Request::Join(_) => "join",
            Request::ClusterView => "cluster_view",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Vote(VoteResponse),
    DiscoveryPing(DiscoveryPingResponse),
    LivenessPing(LivenessPingResponse),
    PublishAck(PublishAck),
    Join(JoinResponse),
    ClusterView(Box<ClusterView>),
    Error(DiscoveryError),
}

macro_rules! expect_variant {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(self) -> Result<$ty> {
            match self {
                Response::$variant(inner) => Ok(inner),
                Response::Error(e) => Err(e),
                other => Err(DiscoveryError::UnexpectedResponse(format!(
                    "expected {}, got {:?}",
                    stringify!($variant),
                    other
                ))),
            }
        }
    };
}

impl Response {
    expect_variant!(into_vote, Vote, VoteResponse);
    expect_variant!(into_discovery_ping, DiscoveryPing, DiscoveryPingResponse);
    expect_variant!(into_liveness_ping, LivenessPing, LivenessPingResponse);
    expect_variant!(into_publish_ack, PublishAck, PublishAck);
    expect_variant!(into_join, Join, JoinResponse);
    expect_variant!(into_cluster_view, ClusterView, Box<ClusterView>);
}

macro_rules! into_response {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Response {
            fn from(inner: $ty) -> Self {
                Response::$variant(inner)
            }
        }
    };
}

into_response!(VoteResponse, Vote);
into_response!(DiscoveryPingResponse, DiscoveryPing);
into_response!(LivenessPingResponse, LivenessPing);
into_response!(PublishAck, PublishAck);
into_response!(JoinResponse, Join);

impl Response {
    /// Wrap a handler result, turning errors into [`Response::Error`].
    pub fn from_result<T: Into<Response>>(result: Result<T>) -> Self {
        match result {
            Ok(inner) => inner.into(),
            Err(e) => Response::Error(e),
        }
    }
}
