use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::error::TransportError;
use crate::transport::{Request, Transport, VoteRequest, VoteResponse};
use crate::types::{DiscoveryNode, NodeId};

/// Votes needed out of an electorate of `n`.
pub fn quorum_size(n: usize) -> usize {
    n / 2 + 1
}

/// Tally of one candidacy.
///
/// Silent or failed peers count as "no vote". The round is decided as soon
/// as a quorum is reached, a higher term shows up, or every peer has been
/// accounted for.
#[derive(Debug, Clone)]
pub struct ElectionRound {
    term: u64,
    candidate: NodeId,
    quorum: usize,
    votes: HashSet<NodeId>,
    pending: usize,
    live: Vec<DiscoveryNode>,
    highest_term: u64,
}

impl ElectionRound {
    /// `peers` is the number of remote electors asked for a vote.
    pub fn new(term: u64, candidate: NodeId, electorate: usize, peers: usize, self_vote: bool) -> Self {
        let mut votes = HashSet::new();
        if self_vote {
            votes.insert(candidate.clone());
        }
        Self {
            term,
            candidate,
            quorum: quorum_size(electorate),
            votes,
            pending: peers,
            live: Vec::new(),
            highest_term: term,
        }
    }

    pub fn term(&self) -> u64 {
        self.term
    }

    pub fn votes(&self) -> usize {
        self.votes.len()
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn record_response(&mut self, address: &str, resp: &VoteResponse) {
        self.pending = self.pending.saturating_sub(1);
        self.highest_term = self.highest_term.max(resp.term);
        self.live
            .push(DiscoveryNode::new(resp.voter_id.clone(), address.to_string()));
        if resp.voted_for.as_ref() == Some(&self.candidate) && resp.term == self.term {
            self.votes.insert(resp.voter_id.clone());
        }
    }

    pub fn record_silence(&mut self) {
        self.pending = self.pending.saturating_sub(1);
    }

    pub fn superseded(&self) -> bool {
        self.highest_term > self.term
    }

    pub fn has_quorum(&self) -> bool {
        !self.superseded() && self.votes.len() >= self.quorum
    }

    pub fn is_decided(&self) -> bool {
        self.pending == 0 || self.has_quorum() || self.superseded()
    }

    pub fn outcome(self) -> ElectionOutcome {
        if self.has_quorum() {
            ElectionOutcome::Won {
                term: self.term,
                votes: self.votes.len(),
                live: self.live,
            }
        } else {
            ElectionOutcome::Lost {
                term: self.term,
                votes: self.votes.len(),
                quorum: self.quorum,
                higher_term: self.superseded().then_some(self.highest_term),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// `live` lists every elector that answered before the round closed.
    Won {
        term: u64,
        votes: usize,
        live: Vec<DiscoveryNode>,
    },
    Lost {
        term: u64,
        votes: usize,
        quorum: usize,
        higher_term: Option<u64>,
    },
}

impl ElectionOutcome {
    pub fn is_won(&self) -> bool {
        matches!(self, ElectionOutcome::Won { .. })
    }

    pub fn term(&self) -> u64 {
        match self {
            ElectionOutcome::Won { term, .. } | ElectionOutcome::Lost { term, .. } => *term,
        }
    }
}

/// Ask every peer for its vote and tally the answers.
///
/// Each request is bounded by `timeout`; requests still in flight when the
/// round is decided are dropped.
pub async fn run_election(
    transport: Arc<dyn Transport>,
    request: VoteRequest,
    peers: Vec<String>,
    electorate: usize,
    self_vote: bool,
    timeout: Duration,
) -> ElectionOutcome {
    let mut round = ElectionRound::new(
        request.for_term,
        request.candidate_id.clone(),
        electorate,
        peers.len(),
        self_vote,
    );

    tracing::info!(
        node_id = %request.candidate_id,
        term = request.for_term,
        electorate,
        quorum = round.quorum(),
        "Starting election"
    );

    let mut inflight = JoinSet::new();
    for address in peers {
        let transport = transport.clone();
        let req = Request::Vote(request.clone());
        inflight.spawn(async move {
            let result = match tokio::time::timeout(timeout, transport.request(&address, req)).await
            {
                Ok(Ok(resp)) => resp.into_vote().map_err(|e| e.to_string()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(TransportError::Timeout(address.clone()).to_string()),
            };
            (address, result)
        });
    }

    while !round.is_decided() {
        let Some(joined) = inflight.join_next().await else {
            break;
        };
        match joined {
            Ok((address, Ok(resp))) => {
                tracing::debug!(
                    peer = %address,
                    voter = %resp.voter_id,
                    term = resp.term,
                    voted_for = ?resp.voted_for,
                    "Vote response"
                );
                round.record_response(&address, &resp);
            }
            Ok((address, Err(e))) => {
                tracing::debug!(peer = %address, error = %e, "No vote from peer");
                round.record_silence();
            }
            Err(e) => {
                tracing::error!(error = %e, "Vote request task failed");
                round.record_silence();
            }
        }
    }
    inflight.abort_all();

    let outcome = round.outcome();
    match &outcome {
        ElectionOutcome::Won { term, votes, .. } => {
            tracing::info!(node_id = %request.candidate_id, term, votes, "Won election");
        }
        ElectionOutcome::Lost {
            term,
            votes,
            quorum,
            higher_term,
        } => {
            tracing::info!(
                node_id = %request.candidate_id,
                term,
                votes,
                quorum,
                higher_term = ?higher_term,
                "Lost election"
            );
        }
    }
    outcome
}
