//! Message exchange between nodes.
//!
//! The election and discovery logic only needs two seams:
//!
//! - [`Transport`]: send one [`Request`] to an address and get one
//!   [`Response`] back. Callers bound every call with their own timeout.
//! - [`RequestHandler`]: the inbound side, implemented by the coordinator
//!   handle.
//!
//! Two implementations ship with the crate: [`local::LocalNetwork`], an
//! in-process network with fault injection, and [`tcp::TcpTransport`] with
//! length-prefixed JSON frames.

pub mod local;
pub mod messages;
pub mod tcp;

use async_trait::async_trait;

use crate::error::TransportError;

pub use messages::{
    DiscoveryPingRequest, DiscoveryPingResponse, JoinRequest, JoinResponse, LivenessPingRequest,
    LivenessPingResponse, PublishAck, PublishRequest, Request, Response, VoteRequest, VoteResponse,
};

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn request(&self, address: &str, request: Request)
        -> Result<Response, TransportError>;

    /// Re-establish a lost connection to `address`.
    async fn reconnect(&self, address: &str) -> Result<(), TransportError>;
}

#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, request: Request) -> Response;
}
