//! Join handling on both sides: the leader admitting nodes and a joiner
//! giving up on an unreachable leader.

mod test_harness;

use std::time::Duration;

use herald::raft::RaftRole;
use herald::transport::{DiscoveryPingResponse, JoinRequest, Request, Response};
use herald::{DiscoveryError, DiscoveryNode, TransportError};
use test_harness::{
    address, assert_eventually, granting_script, idle_config, idle_script, node_id_at,
    start_with_transport, test_config, wait_for, ScriptedTransport, TestNode,
};

fn join(id: &str, address: String) -> JoinRequest {
    JoinRequest {
        cluster_id: "test-cluster".to_string(),
        node: DiscoveryNode::new(id, address),
        term: 0,
    }
}

async fn elected_leader(transport: std::sync::Arc<ScriptedTransport>) -> TestNode {
    let node = start_with_transport(test_config(1, 3), transport);
    assert_eventually(
        || async { node.is_leader().await },
        Duration::from_secs(5),
        "node should elect itself",
    )
    .await;
    node
}

/// Test 1: A node that is not leading refuses joins
#[tokio::test]
async fn test_follower_refuses_join() {
    let node = start_with_transport(idle_config(), ScriptedTransport::new(idle_script));

    let err = node
        .handle
        .join(join("node-9", "node-9:9300".to_string()))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DiscoveryError::IllegalRole {
            required: RaftRole::Leader,
            actual: RaftRole::Follower
        }
    );
    assert!(node.view().members.is_empty());
}

/// Test 2: A join from another cluster is refused before the role is looked at
#[tokio::test]
async fn test_foreign_cluster_join_is_refused() {
    let node = start_with_transport(idle_config(), ScriptedTransport::new(idle_script));
    let mut request = join("node-9", "node-9:9300".to_string());
    request.cluster_id = "elsewhere".to_string();

    let err = node.handle.join(request).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::ClusterIdentityMismatch { .. }));
}

/// Test 3: Every peer points at a leader that cannot be reached. After the
/// configured number of failed joins the node runs its own election
#[tokio::test]
async fn test_failed_joins_lead_to_election() {
    let transport = ScriptedTransport::new(|addr, request| match request {
        Request::DiscoveryPing(_) => Some(Ok(Response::DiscoveryPing(DiscoveryPingResponse {
            term: 0,
            responder: DiscoveryNode::new(node_id_at(addr), addr),
            current_leader: Some(DiscoveryNode::new("node-2", address(2))),
            voted_for: None,
        }))),
        Request::Join(_) => Some(Err(TransportError::Unreachable(addr.to_string()))),
        _ => None,
    });
    let node = start_with_transport(test_config(1, 3), transport.clone());

    let voted = wait_for(
        || async {
            transport
                .requests()
                .iter()
                .any(|(_, r)| matches!(r, Request::Vote(_)))
        },
        Duration::from_secs(5),
        Duration::from_millis(25),
    )
    .await;
    assert!(voted, "node should start an election");

    let requests = transport.requests();
    let first_vote = requests
        .iter()
        .position(|(_, r)| matches!(r, Request::Vote(_)))
        .unwrap();
    let joins: Vec<&String> = requests[..first_vote]
        .iter()
        .filter(|(_, r)| matches!(r, Request::Join(_)))
        .map(|(addr, _)| addr)
        .collect();
    assert_eq!(joins.len(), 3);
    assert!(joins.iter().all(|addr| **addr == address(2)));

    match &requests[first_vote].1 {
        Request::Vote(vote) => {
            assert_eq!(vote.for_term, 1);
            assert_eq!(vote.candidate_id, node.id);
        }
        other => panic!("expected a vote request, got {other:?}"),
    }
}

/// Test 4: The leader admits a joiner, publishes the new membership to it,
/// and a node coming back under a new id replaces the old entry at its address
#[tokio::test]
async fn test_leader_admits_joiner() {
    let transport = ScriptedTransport::new(granting_script);
    let node = elected_leader(transport.clone()).await;
    let term = node.current_term();

    let resp = node
        .handle
        .join(join("node-9", "node-9:9300".to_string()))
        .await
        .unwrap();
    assert_eq!(resp.term, term);

    assert_eventually(
        || async { node.view().members.iter().any(|m| m.id.as_str() == "node-9") },
        Duration::from_secs(2),
        "joiner should be a member",
    )
    .await;
    assert_eventually(
        || async {
            transport.requests().iter().any(|(addr, r)| match r {
                Request::Publish(p) => {
                    addr == "node-9:9300"
                        && p.members.iter().any(|m| m.id.as_str() == "node-9")
                }
                _ => false,
            })
        },
        Duration::from_secs(2),
        "joiner should receive the membership",
    )
    .await;

    node.handle.join(join("node-2", address(2))).await.unwrap();
    node.handle.join(join("node-2b", address(2))).await.unwrap();
    assert_eventually(
        || async {
            let at_address: Vec<String> = node
                .view()
                .members
                .iter()
                .filter(|m| m.address == address(2))
                .map(|m| m.id.to_string())
                .collect();
            at_address == vec!["node-2b".to_string()]
        },
        Duration::from_secs(2),
        "new id should replace the old one at the same address",
    )
    .await;
    assert!(node.is_leader().await);
}
