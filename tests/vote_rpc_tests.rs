//! Voter-side tests for the vote RPC, driven through a coordinator handle.

mod test_harness;

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use herald::raft::rpc::handle_request_vote;
use herald::raft::{RaftRole, RaftState};
use herald::transport::{PublishRequest, VoteRequest};
use herald::{DiscoveryError, DiscoveryNode, NodeId, StateEnvelope};
use test_harness::{idle_config, idle_script, start_with_transport, ScriptedTransport, TestNode};

fn vote_request(term: u64, last: (u64, u64), candidate: &str) -> VoteRequest {
    VoteRequest {
        for_term: term,
        candidate_last_term: last.0,
        candidate_last_version: last.1,
        candidate_id: NodeId::from(candidate),
        cluster_id: "test-cluster".to_string(),
    }
}

fn idle_node() -> TestNode {
    start_with_transport(idle_config(), ScriptedTransport::new(idle_script))
}

fn publish_from(leader: &str, term: u64, version: u64) -> PublishRequest {
    let source = DiscoveryNode::new(leader, format!("{leader}:9300"));
    PublishRequest {
        term,
        cluster_id: "test-cluster".to_string(),
        source: source.clone(),
        members: vec![source],
        envelope: StateEnvelope::new(term, version, NodeId::from(leader), b"state".to_vec()),
    }
}

/// Test 1: First candidate in a term gets the vote, and the term is adopted
#[tokio::test]
async fn test_first_candidate_gets_vote() {
    let node = idle_node();

    let resp = node.handle.vote(vote_request(1, (0, 0), "a")).await.unwrap();
    assert_eq!(resp.term, 1);
    assert_eq!(resp.voter_id, node.id);
    assert_eq!(resp.voted_for, Some(NodeId::from("a")));
    assert_eq!(node.current_term(), 1);
}

/// Test 2: Duplicate and competing requests in a decided term get the same answer
#[tokio::test]
async fn test_decided_term_answers_are_idempotent() {
    let node = idle_node();

    let first = node.handle.vote(vote_request(4, (0, 0), "a")).await.unwrap();
    let again = node.handle.vote(vote_request(4, (0, 0), "a")).await.unwrap();
    let rival = node.handle.vote(vote_request(4, (0, 0), "b")).await.unwrap();

    assert_eq!(first, again);
    assert_eq!(rival.voted_for, Some(NodeId::from("a")));
}

/// Test 3: A candidate from an older term is refused without a vote
#[tokio::test]
async fn test_older_term_is_refused() {
    let node = idle_node();
    node.handle.vote(vote_request(5, (0, 0), "a")).await.unwrap();

    let resp = node.handle.vote(vote_request(3, (9, 9), "b")).await.unwrap();
    assert_eq!(resp.term, 5);
    assert_eq!(resp.voted_for, None);
}

/// Test 4: A candidate holding older state never wins this voter, whatever its term
#[tokio::test]
async fn test_candidate_with_stale_state_is_refused() {
    let node = idle_node();
    node.handle
        .receive_state(publish_from("leader", 2, 5))
        .await
        .unwrap();
    assert_eq!(node.current_term(), 2);

    let resp = node.handle.vote(vote_request(9, (2, 4), "stale")).await.unwrap();
    assert_eq!(resp.voted_for, None);
    assert_eq!(node.current_term(), 2, "stale candidate must not move the term");

    let resp = node.handle.vote(vote_request(9, (2, 5), "fresh")).await.unwrap();
    assert_eq!(resp.voted_for, Some(NodeId::from("fresh")));
    assert_eq!(node.current_term(), 9);
}

/// Test 5: Vote requests tagged with another cluster are rejected outright
#[tokio::test]
async fn test_foreign_cluster_is_rejected() {
    let node = idle_node();
    let mut req = vote_request(1, (0, 0), "a");
    req.cluster_id = "other-cluster".to_string();

    let err = node.handle.vote(req).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::ClusterIdentityMismatch { .. }));
    assert_eq!(node.current_term(), 0);
}

/// Test 6: Over a random request sequence the term never decreases and a
/// voter never hands out two different votes in the same term
#[test]
fn test_random_requests_preserve_vote_safety() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let me = NodeId::from("voter");
    let candidates: Vec<NodeId> = ["a", "b", "c", "d"].into_iter().map(NodeId::from).collect();

    for _ in 0..50 {
        let mut state = RaftState::new();
        let mut votes: HashMap<u64, NodeId> = HashMap::new();
        let mut last_term = 0;

        for _ in 0..200 {
            if rng.gen_bool(0.1) {
                let (t, v) = state.last_accepted();
                state.set_last_accepted(t.max(state.term()), v + rng.gen_range(0..3));
            }
            let req = VoteRequest {
                for_term: rng.gen_range(0..12),
                candidate_last_term: rng.gen_range(0..12),
                candidate_last_version: rng.gen_range(0..20),
                candidate_id: candidates[rng.gen_range(0..candidates.len())].clone(),
                cluster_id: "c".to_string(),
            };
            let resp = handle_request_vote(&mut state, &req, &me);

            assert!(state.term() >= last_term, "term went backwards");
            last_term = state.term();

            if let Some(voted) = resp.voted_for {
                assert_eq!(resp.term, req.for_term);
                let previous = votes.entry(resp.term).or_insert_with(|| voted.clone());
                assert_eq!(*previous, voted, "two votes in term {}", resp.term);
                if voted == req.candidate_id {
                    assert!(
                        state.last_accepted()
                            <= (req.candidate_last_term, req.candidate_last_version),
                        "granted a vote to a candidate with older state"
                    );
                }
            }
            assert_ne!(state.role(), RaftRole::Leader);
        }
    }
}
