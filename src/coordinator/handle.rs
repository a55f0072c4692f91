use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};

use crate::coordinator::{CoordinatorMessage, PendingBuffer, PendingState, PublishHandle};
use crate::error::{DiscoveryError, Result};
use crate::raft::rpc::verify_cluster_id;
use crate::raft::TermStore;
use crate::transport::{
    DiscoveryPingRequest, DiscoveryPingResponse, JoinRequest, JoinResponse, LivenessPingRequest,
    LivenessPingResponse, PublishAck, PublishRequest, Request, RequestHandler, Response,
    VoteRequest, VoteResponse,
};
use crate::types::{ClusterView, DiscoveryNode};

/// Cloneable front door to a running coordinator.
///
/// Votes, joins, incoming state and publishes are queued to the coordinator
/// loop. Pings are answered directly from the term store and the latest
/// [`ClusterView`] so that liveness checks never wait behind an election.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorMessage>,
    store: Arc<TermStore>,
    local: DiscoveryNode,
    cluster_id: String,
    pending: PendingBuffer,
    view: watch::Receiver<ClusterView>,
    initial_state: watch::Receiver<bool>,
}

impl CoordinatorHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<CoordinatorMessage>,
        store: Arc<TermStore>,
        local: DiscoveryNode,
        cluster_id: String,
        pending: PendingBuffer,
        view: watch::Receiver<ClusterView>,
        initial_state: watch::Receiver<bool>,
    ) -> Self {
        Self {
            tx,
            store,
            local,
            cluster_id,
            pending,
            view,
            initial_state,
        }
    }

    pub fn local_node(&self) -> &DiscoveryNode {
        &self.local
    }

    pub fn store(&self) -> &Arc<TermStore> {
        &self.store
    }

    pub fn view(&self) -> ClusterView {
        self.view.borrow().clone()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<ClusterView> {
        self.view.clone()
    }

    /// Flips to `true` once, when this node applies its first state.
    pub fn subscribe_initial_state(&self) -> watch::Receiver<bool> {
        self.initial_state.clone()
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> CoordinatorMessage,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| DiscoveryError::ShuttingDown)?;
        rx.await.unwrap_or(Err(DiscoveryError::ShuttingDown))
    }

    /// Publish `payload` as the next cluster state. Fails with
    /// [`DiscoveryError::IllegalRole`] unless this node leads.
    pub async fn publish(&self, payload: Vec<u8>) -> Result<PublishHandle> {
        self.call(|reply| CoordinatorMessage::Publish { payload, reply })
            .await
    }

    pub async fn vote(&self, request: VoteRequest) -> Result<VoteResponse> {
        verify_cluster_id(&self.cluster_id, &request.cluster_id)?;
        self.call(|reply| CoordinatorMessage::Vote { request, reply })
            .await
    }

    pub async fn join(&self, request: JoinRequest) -> Result<JoinResponse> {
        self.call(|reply| CoordinatorMessage::Join { request, reply })
            .await
    }

    /// Buffer an incoming envelope and wait until the coordinator has dealt
    /// with it, or with a newer one from the same leader.
    pub async fn receive_state(&self, request: PublishRequest) -> Result<PublishAck> {
        verify_cluster_id(&self.cluster_id, &request.cluster_id)?;
        let (reply, rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .push_back(PendingState { request, reply });
        self.tx
            .send(CoordinatorMessage::ProcessPending)
            .await
            .map_err(|_| DiscoveryError::ShuttingDown)?;
        rx.await.unwrap_or(Err(DiscoveryError::ShuttingDown))
    }

    pub async fn discovery_ping(&self, request: DiscoveryPingRequest) -> Result<DiscoveryPingResponse> {
        verify_cluster_id(&self.cluster_id, &request.cluster_id)?;
        let leader = self.view.borrow().leader.clone();
        Ok(DiscoveryPingResponse {
            term: self.store.term(),
            responder: self.local.clone(),
            current_leader: leader,
            voted_for: self.store.vote().await,
        })
    }

    pub fn liveness_ping(&self, request: LivenessPingRequest) -> Result<LivenessPingResponse> {
        verify_cluster_id(&self.cluster_id, &request.cluster_id)?;
        if request.target_id != self.local.id {
            return Err(DiscoveryError::NotTarget {
                target: request.target_id,
                actual: self.local.id.clone(),
            });
        }
        let leader_id = self.view.borrow().leader.as_ref().map(|l| l.id.clone());
        Ok(LivenessPingResponse {
            term: self.store.term(),
            leader_id,
        })
    }
}

#[async_trait]
impl RequestHandler for CoordinatorHandle {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Vote(req) => Response::from_result(self.vote(req).await),
            Request::DiscoveryPing(req) => Response::from_result(self.discovery_ping(req).await),
            Request::LivenessPing(req) => Response::from_result(self.liveness_ping(req)),
            Request::Publish(req) => Response::from_result(self.receive_state(req).await),
            Request::Join(req) => Response::from_result(self.join(req).await),
            Request::ClusterView => Response::ClusterView(Box::new(self.view())),
        }
    }
}
