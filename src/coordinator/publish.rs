use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use crate::coordinator::CoordinatorMessage;
use crate::error::{DiscoveryError, Result};
use crate::raft::{RaftRole, TermStore};
use crate::transport::{PublishRequest, Request, Transport};
use crate::types::DiscoveryNode;

/// Outcome of sending a publish to one follower.
#[derive(Debug, Clone)]
pub struct NodeAck {
    pub node: DiscoveryNode,
    pub result: Result<()>,
}

/// Caller's view of an in-flight publish.
///
/// Per-node acks stream through [`PublishHandle::next_ack`]; the overall
/// result resolves once enough followers acked, or once every follower has
/// answered or timed out.
#[derive(Debug)]
pub struct PublishHandle {
    pub term: u64,
    pub version: u64,
    acks: mpsc::UnboundedReceiver<NodeAck>,
    completion: oneshot::Receiver<Result<usize>>,
}

impl PublishHandle {
    pub async fn next_ack(&mut self) -> Option<NodeAck> {
        self.acks.recv().await
    }

    /// Wait for the publish to complete. Returns the number of followers
    /// that had acked at that point.
    pub async fn wait(self) -> Result<usize> {
        self.completion
            .await
            .unwrap_or(Err(DiscoveryError::ShuttingDown))
    }
}

pub(crate) struct Broadcast {
    pub transport: Arc<dyn Transport>,
    pub store: Arc<TermStore>,
    pub coordinator: mpsc::Sender<CoordinatorMessage>,
    pub request: PublishRequest,
    pub followers: Vec<DiscoveryNode>,
    pub required: usize,
    pub timeout: Duration,
}

impl Broadcast {
    /// Spawn the broadcast and return the handle observing it.
    pub fn start(self) -> PublishHandle {
        let (ack_tx, acks) = mpsc::unbounded_channel();
        let (done_tx, completion) = oneshot::channel();
        let handle = PublishHandle {
            term: self.request.term,
            version: self.request.envelope.version,
            acks,
            completion,
        };
        tokio::spawn(self.run(ack_tx, done_tx));
        handle
    }

    async fn run(
        self,
        ack_tx: mpsc::UnboundedSender<NodeAck>,
        done_tx: oneshot::Sender<Result<usize>>,
    ) {
        let term = self.request.term;
        let version = self.request.envelope.version;
        let mut done_tx = Some(done_tx);
        let mut acked = 0usize;

        if self.required == 0 {
            if let Some(tx) = done_tx.take() {
                let _ = tx.send(self.still_leading(term, 0).await);
            }
        }

        let mut inflight = JoinSet::new();
        for node in self.followers.iter().cloned() {
            let transport = self.transport.clone();
            let req = Request::Publish(self.request.clone());
            let timeout = self.timeout;
            inflight.spawn(async move {
                let result = match tokio::time::timeout(timeout, transport.request(&node.address, req)).await {
                    Ok(Ok(resp)) => resp.into_publish_ack().map(|_| ()),
                    Ok(Err(e)) => Err(DiscoveryError::unreachable(node.address.clone(), e)),
                    Err(_) => Err(DiscoveryError::unreachable(
                        node.address.clone(),
                        crate::error::TransportError::Timeout(node.address.clone()),
                    )),
                };
                NodeAck { node, result }
            });
        }

        while let Some(joined) = inflight.join_next().await {
            let ack = match joined {
                Ok(ack) => ack,
                Err(e) => {
                    tracing::error!(error = %e, "Publish task failed");
                    continue;
                }
            };

            match &ack.result {
                Ok(()) => acked += 1,
                Err(DiscoveryError::StaleTerm { current, .. }) => {
                    tracing::info!(peer = %ack.node, term = current, "Publish rejected with higher term");
                    let _ = self
                        .coordinator
                        .send(CoordinatorMessage::HigherTermObserved {
                            term: *current,
                            source: ack.node.address.clone(),
                        })
                        .await;
                }
                Err(e) => {
                    tracing::debug!(peer = %ack.node, version, error = %e, "Publish not acked");
                }
            }
            let _ = ack_tx.send(ack);

            if acked >= self.required {
                if let Some(tx) = done_tx.take() {
                    let _ = tx.send(self.still_leading(term, acked).await);
                }
            }
        }

        if let Some(tx) = done_tx.take() {
            tracing::warn!(term, version, acked, required = self.required, "Publish did not reach enough followers");
            let _ = tx.send(Err(DiscoveryError::PublishFailed {
                version,
                acked,
                required: self.required,
            }));
        }
    }

    /// Acks collected after a step-down say nothing about this node's state.
    async fn still_leading(&self, term: u64, acked: usize) -> Result<usize> {
        let role = self.store.role().await;
        if role != RaftRole::Leader || self.store.term() != term {
            return Err(DiscoveryError::IllegalRole {
                required: RaftRole::Leader,
                actual: role,
            });
        }
        Ok(acked)
    }
}
