use crate::error::{DiscoveryError, Result};
use crate::raft::state::RaftState;
use crate::transport::{VoteRequest, VoteResponse};
use crate::types::NodeId;

/// Reject messages tagged with a foreign cluster identity.
pub fn verify_cluster_id(expected: &str, received: &str) -> Result<()> {
    if expected != received {
        return Err(DiscoveryError::ClusterIdentityMismatch {
            expected: expected.to_string(),
            received: received.to_string(),
        });
    }
    Ok(())
}

/// Handle a vote request against the local state.
///
/// The request term is only adopted when the candidate is eligible for a
/// vote; a stale candidate does not push this node into its term.
pub fn handle_request_vote(
    state: &mut RaftState,
    req: &VoteRequest,
    local_id: &NodeId,
) -> VoteResponse {
    if req.for_term < state.term() {
        tracing::debug!(
            node_id = %local_id,
            candidate = %req.candidate_id,
            term = req.for_term,
            current_term = state.term(),
            "Rejecting vote: stale term"
        );
        return VoteResponse {
            term: state.term(),
            voter_id: local_id.clone(),
            voted_for: None,
        };
    }

    let candidate_last = (req.candidate_last_term, req.candidate_last_version);
    if state.last_accepted() > candidate_last {
        tracing::debug!(
            node_id = %local_id,
            candidate = %req.candidate_id,
            term = req.for_term,
            local_last = ?state.last_accepted(),
            candidate_last = ?candidate_last,
            "Rejecting vote: candidate state is behind"
        );
        return VoteResponse {
            term: state.term(),
            voter_id: local_id.clone(),
            voted_for: None,
        };
    }

    state.observe_term(req.for_term);
    let vote = state.vote_for(req.candidate_id.clone()).clone();

    tracing::debug!(
        node_id = %local_id,
        candidate = %req.candidate_id,
        term = req.for_term,
        granted = vote == req.candidate_id,
        "RequestVote response"
    );

    VoteResponse {
        term: state.term(),
        voter_id: local_id.clone(),
        voted_for: Some(vote),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raft::RaftRole;

    fn request(term: u64, last_term: u64, last_version: u64, candidate: &str) -> VoteRequest {
        VoteRequest {
            for_term: term,
            candidate_last_term: last_term,
            candidate_last_version: last_version,
            candidate_id: NodeId::from(candidate),
            cluster_id: "test".to_string(),
        }
    }

    fn me() -> NodeId {
        NodeId::from("voter")
    }

    #[test]
    fn test_grants_first_vote_and_adopts_term() {
        let mut state = RaftState::new();
        let resp = handle_request_vote(&mut state, &request(1, 0, 0, "a"), &me());

        assert_eq!(resp.term, 1);
        assert_eq!(resp.voted_for, Some(NodeId::from("a")));
        assert_eq!(state.term(), 1);
        assert_eq!(state.voted_for(), Some(&NodeId::from("a")));
    }

    #[test]
    fn test_rejects_lower_term() {
        let mut state = RaftState::new();
        state.set_term(5).unwrap();

        let resp = handle_request_vote(&mut state, &request(4, 9, 9, "a"), &me());
        assert_eq!(resp.term, 5);
        assert_eq!(resp.voted_for, None);
        assert_eq!(state.voted_for(), None);
    }

    #[test]
    fn test_rejects_candidate_with_stale_state_in_higher_term() {
        let mut state = RaftState::new();
        state.set_term(2).unwrap();
        state.set_last_accepted(2, 10);

        let resp = handle_request_vote(&mut state, &request(7, 2, 9, "a"), &me());
        assert_eq!(resp.voted_for, None);
        assert_eq!(resp.term, 2);
        assert_eq!(state.term(), 2, "stale candidate must not bump our term");
        assert_eq!(state.voted_for(), None);

        let resp = handle_request_vote(&mut state, &request(7, 1, 50, "b"), &me());
        assert_eq!(resp.voted_for, None);
    }

    #[test]
    fn test_equal_state_is_eligible() {
        let mut state = RaftState::new();
        state.set_last_accepted(3, 4);

        let resp = handle_request_vote(&mut state, &request(4, 3, 4, "a"), &me());
        assert_eq!(resp.voted_for, Some(NodeId::from("a")));
    }

    #[test]
    fn test_duplicate_request_gets_same_answer() {
        let mut state = RaftState::new();
        let first = handle_request_vote(&mut state, &request(3, 0, 0, "a"), &me());
        let again = handle_request_vote(&mut state, &request(3, 0, 0, "a"), &me());
        let other = handle_request_vote(&mut state, &request(3, 0, 0, "b"), &me());

        assert_eq!(first, again);
        assert_eq!(other.voted_for, Some(NodeId::from("a")));
    }

    #[test]
    fn test_higher_term_demotes_leader_and_votes() {
        let mut state = RaftState::new();
        state.set_term(2).unwrap();
        state.set_role(RaftRole::Leader);
        state.vote_for(me());

        let resp = handle_request_vote(&mut state, &request(3, 0, 0, "a"), &me());
        assert_eq!(resp.voted_for, Some(NodeId::from("a")));
        assert_eq!(state.role(), RaftRole::Follower);
        assert_eq!(state.term(), 3);
    }

    #[test]
    fn test_candidate_keeps_self_vote_in_same_term() {
        let mut state = RaftState::new();
        state.set_term(4).unwrap();
        state.set_role(RaftRole::Candidate);
        state.vote_for(me());

        let resp = handle_request_vote(&mut state, &request(4, 0, 0, "a"), &me());
        assert_eq!(resp.voted_for, Some(me()));
        assert_eq!(state.role(), RaftRole::Candidate);
    }

    #[test]
    fn test_cluster_id_check() {
        assert!(verify_cluster_id("prod", "prod").is_ok());
        assert_eq!(
            verify_cluster_id("prod", "staging").unwrap_err(),
            DiscoveryError::ClusterIdentityMismatch {
                expected: "prod".to_string(),
                received: "staging".to_string()
            }
        );
    }
}
