//! Byte-stream transports a link runs over.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// A duplex byte stream: serial port, socket, or in-memory pipe.
pub trait Duplex: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Duplex for T {}

/// An owned, type-erased transport stream.
pub type Transport = Box<dyn Duplex>;

/// Opens fresh transports, used at construction and to reconnect after a
/// stream failure.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> io::Result<Transport>;

    /// Human-readable target, for logging.
    fn target(&self) -> String;
}

/// Connects to a device (or proxy) over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> io::Result<Transport> {
        debug!("dialing {}", self.addr);
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    fn target(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}
