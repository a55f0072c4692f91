use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{DiscoveryError, Result};
use crate::types::NodeId;

/// Raft node role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaftRole {
    Follower,
    Candidate,
    Leader,
}

impl std::fmt::Display for RaftRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaftRole::Follower => write!(f, "follower"),
            RaftRole::Candidate => write!(f, "candidate"),
            RaftRole::Leader => write!(f, "leader"),
        }
    }
}

/// Term, vote and role of the local node, plus the ordering key of the last
/// state it accepted.
///
/// # Invariants
///
/// - `current_term` never decreases.
/// - `voted_for` belongs to `current_term`: it is cleared exactly when the
///   term strictly advances, and once set it is never replaced within a term.
///
/// Role legality (e.g. only Candidate -> Leader) is enforced by the
/// coordinator, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftState {
    current_term: u64,
    voted_for: Option<NodeId>,
    role: RaftRole,
    last_accepted_term: u64,
    last_accepted_version: u64,
}

impl RaftState {
    pub fn new() -> Self {
        Self {
            current_term: 0,
            voted_for: None,
            role: RaftRole::Follower,
            last_accepted_term: 0,
            last_accepted_version: 0,
        }
    }

    pub fn term(&self) -> u64 {
        self.current_term
    }

    pub fn role(&self) -> RaftRole {
        self.role
    }

    pub fn voted_for(&self) -> Option<&NodeId> {
        self.voted_for.as_ref()
    }

    /// `(term, version)` of the last state this node accepted.
    pub fn last_accepted(&self) -> (u64, u64) {
        (self.last_accepted_term, self.last_accepted_version)
    }

    /// Set the term. A different term clears the vote; a lower one is refused.
    ///
    /// Returns whether the term changed.
    pub fn set_term(&mut self, term: u64) -> Result<bool> {
        if term < self.current_term {
            return Err(DiscoveryError::StaleTerm {
                received: term,
                current: self.current_term,
            });
        }
        if term == self.current_term {
            return Ok(false);
        }
        self.current_term = term;
        self.voted_for = None;
        Ok(true)
    }

    /// Adopt `term` if it is higher than ours and fall back to follower.
    ///
    /// Returns whether anything changed.
    pub fn observe_term(&mut self, term: u64) -> bool {
        if term <= self.current_term {
            return false;
        }
        self.current_term = term;
        self.voted_for = None;
        self.role = RaftRole::Follower;
        true
    }

    /// Record a vote for the current term and return the vote in effect.
    ///
    /// An existing vote is kept: asking again within the same term gets the
    /// same answer.
    pub fn vote_for(&mut self, candidate: NodeId) -> &NodeId {
        self.voted_for.get_or_insert(candidate)
    }

    pub fn set_role(&mut self, role: RaftRole) {
        self.role = role;
    }

    pub fn set_last_accepted(&mut self, term: u64, version: u64) {
        self.last_accepted_term = term;
        self.last_accepted_version = version;
    }
}

impl Default for RaftState {
    fn default() -> Self {
        Self::new()
    }
}

/// Single owner of the local [`RaftState`].
///
/// Every mutation goes through one write lock so term, vote and role change
/// together. The lock is only taken for synchronous sections and never held
/// across network I/O. The term is mirrored in an atomic so it can be read
/// without waiting on a writer.
#[derive(Debug, Default)]
pub struct TermStore {
    state: RwLock<RaftState>,
    term: AtomicU64,
}

impl TermStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current term, without taking the lock.
    pub fn term(&self) -> u64 {
        self.term.load(Ordering::Acquire)
    }

    pub async fn set_term(&self, term: u64) -> Result<bool> {
        self.update(|state| state.set_term(term)).await
    }

    pub async fn vote(&self) -> Option<NodeId> {
        self.state.read().await.voted_for.clone()
    }

    pub async fn set_vote(&self, candidate: NodeId) -> NodeId {
        self.update(|state| state.vote_for(candidate).clone()).await
    }

    pub async fn role(&self) -> RaftRole {
        self.state.read().await.role
    }

    pub async fn set_role(&self, role: RaftRole) {
        self.update(|state| state.set_role(role)).await
    }

    pub async fn snapshot(&self) -> RaftState {
        self.state.read().await.clone()
    }

    /// Run `f` under the write lock as one atomic read-modify-write.
    pub async fn update<R>(&self, f: impl FnOnce(&mut RaftState) -> R) -> R {
        let mut state = self.state.write().await;
        let result = f(&mut state);
        self.term.store(state.current_term, Ordering::Release);
        result
    }
}
