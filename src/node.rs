use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::DiscoveryConfig;
use crate::coordinator::{Coordinator, CoordinatorHandle, CoordinatorMessage, StateApplier};
use crate::error::Result;
use crate::transport::tcp::{TcpServer, TcpTransport};

/// A coordinator wired to the TCP transport.
pub struct Node {
    pub config: DiscoveryConfig,
    coordinator: Coordinator,
    handle: CoordinatorHandle,
    rx: tokio::sync::mpsc::Receiver<CoordinatorMessage>,
}

impl Node {
    pub fn new(config: DiscoveryConfig, applier: Arc<dyn StateApplier>) -> Result<Self> {
        let transport = Arc::new(TcpTransport::new(config.discovery_ping_timeout()));
        let (coordinator, handle, rx) = Coordinator::new(config.clone(), transport, applier)?;
        Ok(Self {
            config,
            coordinator,
            handle,
            rx,
        })
    }

    pub fn handle(&self) -> CoordinatorHandle {
        self.handle.clone()
    }

    /// Run the node until `shutdown` is cancelled.
    ///
    /// The listener is bound before the coordinator starts so that peers
    /// probing this node during its first election can reach it.
    ///
    /// # Errors
    ///
    /// Returns an error if the listen address cannot be bound.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let server = TcpServer::bind(self.config.listen_addr, Arc::new(self.handle.clone())).await?;
        let server_task = tokio::spawn(server.run(shutdown.clone()));

        self.coordinator.run(self.rx, shutdown).await;

        if let Err(e) = server_task.await {
            tracing::error!(error = %e, "Transport server task failed");
        }
        Ok(())
    }
}
