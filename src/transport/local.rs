use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::TransportError;
use crate::transport::{Request, RequestHandler, Response, Transport};

#[derive(Default)]
struct NetworkState {
    handlers: HashMap<String, Arc<dyn RequestHandler>>,
    /// Addresses cut off from everyone. Requests to or from them hang.
    isolated: HashSet<String>,
    /// Directed links that drop traffic.
    blocked: HashSet<(String, String)>,
    /// Addresses whose connections were reset; requests fail fast until a
    /// reconnect succeeds.
    disconnected: HashSet<String>,
}

/// In-process network connecting handlers by address.
///
/// Cheap to clone; all clones share the same routing table. Failures are
/// injected per address or per link: an isolated node or a blocked link
/// swallows requests (the caller's timeout fires), while a disconnected
/// address fails fast with [`TransportError::Disconnected`].
#[derive(Clone, Default)]
pub struct LocalNetwork {
    state: Arc<RwLock<NetworkState>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, address: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        self.state
            .write()
            .await
            .handlers
            .insert(address.into(), handler);
    }

    /// Remove a node from the network, as if its process had died.
    pub async fn deregister(&self, address: &str) {
        let mut state = self.state.write().await;
        state.handlers.remove(address);
        state.disconnected.remove(address);
    }

    /// Transport for the node listening on `local_address`.
    pub fn transport(&self, local_address: impl Into<String>) -> LocalTransport {
        LocalTransport {
            network: self.clone(),
            local: local_address.into(),
        }
    }

    pub async fn isolate(&self, address: &str) {
        self.state.write().await.isolated.insert(address.to_string());
    }

    /// Drop traffic between `a` and `b` in both directions.
    pub async fn partition(&self, a: &str, b: &str) {
        let mut state = self.state.write().await;
        state.blocked.insert((a.to_string(), b.to_string()));
        state.blocked.insert((b.to_string(), a.to_string()));
    }

    pub async fn disconnect(&self, address: &str) {
        self.state
            .write()
            .await
            .disconnected
            .insert(address.to_string());
    }

    /// Undo all isolation, partitions and disconnects.
    pub async fn heal(&self) {
        let mut state = self.state.write().await;
        state.isolated.clear();
        state.blocked.clear();
        state.disconnected.clear();
    }
}

enum Route {
    Deliver(Arc<dyn RequestHandler>),
    BlackHole,
    Fail(TransportError),
}

/// A node's view of a [`LocalNetwork`].
#[derive(Clone)]
pub struct LocalTransport {
    network: LocalNetwork,
    local: String,
}

impl LocalTransport {
    async fn route(&self, address: &str) -> Route {
        let state = self.network.state.read().await;
        if state.isolated.contains(&self.local)
            || state.isolated.contains(address)
            || state
                .blocked
                .contains(&(self.local.clone(), address.to_string()))
        {
            return Route::BlackHole;
        }
        if state.disconnected.contains(address) {
            return Route::Fail(TransportError::Disconnected(address.to_string()));
        }
        match state.handlers.get(address) {
            Some(handler) => Route::Deliver(handler.clone()),
            None => Route::Fail(TransportError::Unreachable(address.to_string())),
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn request(
        &self,
        address: &str,
        request: Request,
    ) -> Result<Response, TransportError> {
        match self.route(address).await {
            Route::Deliver(handler) => Ok(handler.handle(request).await),
            Route::Fail(e) => Err(e),
            Route::BlackHole => {
                tracing::trace!(from = %self.local, to = address, request = request.name(), "Dropping request");
                std::future::pending().await
            }
        }
    }

    async fn reconnect(&self, address: &str) -> Result<(), TransportError> {
        let mut state = self.network.state.write().await;
        if state.isolated.contains(address) || !state.handlers.contains_key(address) {
            return Err(TransportError::Unreachable(address.to_string()));
        }
        state.disconnected.remove(address);
        Ok(())
    }
}
