pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod fault;
pub mod node;
pub mod raft;
pub mod shutdown;
pub mod transport;
pub mod types;

pub use config::DiscoveryConfig;
pub use coordinator::{Coordinator, CoordinatorHandle, LoggingApplier, StateApplier};
pub use error::{DiscoveryError, Result, TransportError};
pub use types::{ClusterView, DiscoveryNode, NodeId, Phase, StateEnvelope};
