use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::transport::{Request, RequestHandler, Response, Transport};

/// Frames larger than this are treated as corrupt.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// How long an accepted connection may take to send its request.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Write `value` as a big-endian u32 length followed by its JSON encoding.
pub async fn write_frame<W, T>(stream: &mut W, value: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = serde_json::to_vec(value).map_err(|e| TransportError::Codec(e.to_string()))?;
    if data.len() > MAX_FRAME_LEN {
        return Err(TransportError::Codec(format!(
            "frame of {} bytes exceeds limit of {MAX_FRAME_LEN}",
            data.len()
        )));
    }
    let len = data.len() as u32;
    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| TransportError::Disconnected(e.to_string()))?;
    stream
        .write_all(&data)
        .await
        .map_err(|e| TransportError::Disconnected(e.to_string()))?;
    stream
        .flush()
        .await
        .map_err(|e| TransportError::Disconnected(e.to_string()))
}

pub async fn read_frame<R, T>(stream: &mut R) -> Result<T, TransportError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| TransportError::Disconnected(e.to_string()))?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::Codec(format!(
            "frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}"
        )));
    }

    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| TransportError::Disconnected(e.to_string()))?;
    serde_json::from_slice(&buf).map_err(|e| TransportError::Codec(e.to_string()))
}

/// Client side of the TCP transport. Opens one connection per request.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn connect(&self, address: &str) -> Result<TcpStream, TransportError> {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                Ok(stream)
            }
            Ok(Err(e)) => Err(match e.kind() {
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                    TransportError::Disconnected(address.to_string())
                }
                _ => TransportError::Unreachable(address.to_string()),
            }),
            Err(_) => Err(TransportError::Timeout(address.to_string())),
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn request(
        &self,
        address: &str,
        request: Request,
    ) -> Result<Response, TransportError> {
        let mut stream = self.connect(address).await?;
        write_frame(&mut stream, &request).await?;
        read_frame(&mut stream).await.map_err(|e| match e {
            TransportError::Disconnected(_) => TransportError::Disconnected(address.to_string()),
            other => other,
        })
    }

    async fn reconnect(&self, address: &str) -> Result<(), TransportError> {
        // Connections are not pooled, so a reconnect is a connectivity probe.
        self.connect(address).await.map(|_| ())
    }
}

/// Accept loop serving requests to a [`RequestHandler`].
pub struct TcpServer {
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
    read_timeout: Duration,
}

impl TcpServer {
    pub async fn bind(addr: SocketAddr, handler: Arc<dyn RequestHandler>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            handler,
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(addr = ?self.listener.local_addr().ok(), "Transport server listening");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Transport server stopped");
                    return;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handler = self.handler.clone();
                        let read_timeout = self.read_timeout;
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, peer, handler, read_timeout).await {
                                tracing::debug!(%peer, error = %e, "Connection closed with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn RequestHandler>,
    read_timeout: Duration,
) -> Result<(), TransportError> {
    // A peer that connects and goes quiet must not hold the task forever.
    let request: Request = tokio::time::timeout(read_timeout, read_frame(&mut stream))
        .await
        .map_err(|_| TransportError::Timeout(peer.to_string()))??;
    tracing::trace!(request = request.name(), "Handling request");
    let response = handler.handle(request).await;
    write_frame(&mut stream, &response).await
}
