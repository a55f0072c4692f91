use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::DiscoveryError;
use crate::transport::{DiscoveryPingRequest, DiscoveryPingResponse, Request, Transport};
use crate::types::DiscoveryNode;

/// What one discovery round learned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingResult {
    /// Highest term reported by any responder, 0 when nobody answered.
    pub observed_term: u64,
    pub live: Vec<DiscoveryNode>,
    /// Node to join, if the responders agree on one.
    pub advice: Option<DiscoveryNode>,
}

/// Pick the node to follow from a set of ping responses.
///
/// The responder with the highest term is authoritative; at equal terms a
/// responder that knows a leader outranks one that only knows its vote.
/// Ties beyond that go to the lowest responder id so every node reading the
/// same responses reaches the same answer.
pub fn resolve_advice(
    responses: &[DiscoveryPingResponse],
    local: &DiscoveryNode,
) -> Option<DiscoveryNode> {
    let authoritative = responses.iter().max_by(|a, b| {
        (a.term, a.current_leader.is_some())
            .cmp(&(b.term, b.current_leader.is_some()))
            .then_with(|| b.responder.id.cmp(&a.responder.id))
    })?;

    if let Some(leader) = &authoritative.current_leader {
        return Some(leader.clone());
    }

    let voted_for = authoritative.voted_for.as_ref()?;
    if *voted_for == local.id {
        return Some(local.clone());
    }
    responses
        .iter()
        .map(|r| &r.responder)
        .find(|node| node.id == *voted_for)
        .cloned()
}

/// Broadcast probe used while no leader is known.
#[derive(Clone)]
pub struct DiscoveryProbe {
    transport: Arc<dyn Transport>,
    cluster_id: String,
    local: DiscoveryNode,
    timeout: Duration,
}

impl DiscoveryProbe {
    pub fn new(
        transport: Arc<dyn Transport>,
        cluster_id: impl Into<String>,
        local: DiscoveryNode,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            cluster_id: cluster_id.into(),
            local,
            timeout,
        }
    }

    /// Ping every address in parallel and collect whatever answers arrive
    /// before the shared deadline. Silence is not an error.
    pub async fn ping(&self, addresses: &[String]) -> PingResult {
        let deadline = Instant::now() + self.timeout;
        let mut inflight = JoinSet::new();
        for address in addresses.iter().filter(|a| **a != self.local.address) {
            let transport = self.transport.clone();
            let address = address.clone();
            let req = Request::DiscoveryPing(DiscoveryPingRequest {
                cluster_id: self.cluster_id.clone(),
                source_id: self.local.id.clone(),
            });
            inflight.spawn(async move {
                let result = match transport.request(&address, req).await {
                    Ok(resp) => resp.into_discovery_ping(),
                    Err(e) => Err(DiscoveryError::unreachable(address.clone(), e)),
                };
                (address, result)
            });
        }

        let mut responses = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, inflight.join_next()).await {
                Ok(Some(Ok((_, Ok(resp))))) => responses.push(resp),
                Ok(Some(Ok((address, Err(e))))) => match e {
                    DiscoveryError::ClusterIdentityMismatch { .. } => {
                        tracing::warn!(peer = %address, error = %e, "Ignoring ping response from foreign cluster");
                    }
                    _ => tracing::trace!(peer = %address, error = %e, "No ping response"),
                },
                Ok(Some(Err(e))) => tracing::error!(error = %e, "Ping task failed"),
                Ok(None) => break,
                Err(_) => {
                    tracing::debug!(outstanding = inflight.len(), "Discovery ping round timed out");
                    break;
                }
            }
        }
        inflight.abort_all();

        let result = PingResult {
            observed_term: responses.iter().map(|r| r.term).max().unwrap_or(0),
            live: responses.iter().map(|r| r.responder.clone()).collect(),
            advice: resolve_advice(&responses, &self.local),
        };
        tracing::debug!(
            node_id = %self.local.id,
            responders = result.live.len(),
            observed_term = result.observed_term,
            advice = ?result.advice.as_ref().map(|n| &n.id),
            "Discovery ping round finished"
        );
        result
    }
}
