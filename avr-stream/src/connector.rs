//! Opening the byte stream the supervisor reads from

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Duplex byte stream to a receiver
pub trait EventStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> EventStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn EventStream>;

/// Opens a fresh connection on every call.
///
/// The supervisor calls this for the initial connect and for every reconnect attempt, and wraps
/// each call in its connect timeout.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> std::io::Result<BoxedStream>;

    /// Target shown in logs and errors
    fn describe(&self) -> String;
}

/// Plain TCP connection to `host:port`
#[derive(Debug, Clone)]
pub struct TcpConnector {
    target: String,
}

impl TcpConnector {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            target: format!("{}:{}", host, port),
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> std::io::Result<BoxedStream> {
        let stream = TcpStream::connect(&self.target).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    fn describe(&self) -> String {
        self.target.clone()
    }
}
