use std::time::Duration;

use tokio::net::TcpStream;

use crate::protocol::error::{MinirpcError, Result};
use crate::protocol::{Request, Response};
use crate::transport::frame::{read_frame, write_frame};

/// Default timeout for establishing a connection (3 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Async TCP transport for minirpc clients.
///
/// Dials connections and moves whole frames over them. A stream produced by
/// [`TcpTransport::connect`] carries any number of request/response
/// exchanges, one at a time.
///
/// # Example
///
/// ```no_run
/// use minirpc_common::transport::TcpTransport;
/// use minirpc_common::protocol::Request;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = TcpTransport::default();
/// let mut stream = transport.connect("127.0.0.1:8081").await?;
///
/// let request = Request::new("user-service", "GetById").with_payload(br#"{"Id":123}"#.to_vec());
/// TcpTransport::send_request(&mut stream, &request).await?;
/// let response = TcpTransport::receive_response(&mut stream).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Connects to a remote endpoint.
    ///
    /// The address may resolve to several socket addresses; each is tried in
    /// turn, with the connect timeout applied per attempt.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the address cannot be resolved or every
    /// attempt fails or times out.
    pub async fn connect(&self, addr: &str) -> Result<TcpStream> {
        let socket_addrs = tokio::net::lookup_host(addr)
            .await
            .map_err(|e| MinirpcError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

        // Try each resolved address until one succeeds
        let mut last_err = None;
        for socket_addr in socket_addrs {
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(socket_addr)).await {
                Ok(Ok(stream)) => {
                    // Frames are written whole, Nagle only adds latency.
                    stream
                        .set_nodelay(true)
                        .map_err(|e| MinirpcError::Connection(format!("Failed to set TCP_NODELAY: {}", e)))?;
                    tracing::debug!(%socket_addr, "Connected");
                    return Ok(stream);
                }
                Ok(Err(e)) => last_err = Some(e.to_string()),
                Err(_) => {
                    last_err = Some(format!("timed out after {}ms", self.connect_timeout.as_millis()))
                }
            }
        }

        Err(MinirpcError::Connection(format!(
            "Failed to connect to {}: {}",
            addr,
            last_err.unwrap_or_else(|| "no addresses resolved".to_string())
        )))
    }

    /// Encodes a request and writes it as one frame.
    pub async fn send_request(stream: &mut TcpStream, request: &Request) -> Result<()> {
        let encoded = request.encode()?;
        write_frame(stream, &encoded).await
    }

    /// Reads one frame and decodes it as a response.
    pub async fn receive_response(stream: &mut TcpStream) -> Result<Response> {
        let frame = read_frame(stream).await?;
        Response::decode(&frame)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}
