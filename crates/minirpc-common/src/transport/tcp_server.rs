use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::protocol::error::{MinirpcError, Result};
use crate::protocol::{Request, Response};
use crate::transport::frame::{read_frame, write_frame};

/// Async TCP server for minirpc.
///
/// Accepts connections and runs one task per connection. Each connection
/// carries a sequence of requests; the handler decides per request whether a
/// response is written (oneway requests get none).
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    /// Creates a new TCP server bound to the specified address.
    ///
    /// # Arguments
    /// * `bind_addr` - The address to bind to (e.g., "127.0.0.1:8081", or port 0 for any free port)
    pub async fn new(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| MinirpcError::Connection(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self { listener })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| MinirpcError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Runs the server with the given request handler.
    ///
    /// This accepts connections in a loop and spawns an async task for each
    /// connection. A connection ends when the peer closes it, a frame cannot
    /// be read or decoded, or a response cannot be written.
    ///
    /// # Arguments
    /// * `handler` - Handles each decoded request; `None` means no response is sent
    pub async fn run_with_handler<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Response>> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            let (stream, peer_addr) = self
                .listener
                .accept()
                .await
                .map_err(|e| MinirpcError::Connection(format!("Failed to accept connection: {}", e)))?;

            tracing::debug!(%peer_addr, "Connection established");

            let handler = handler.clone();
            tokio::spawn(async move {
                match handle_connection(stream, handler).await {
                    Ok(()) => tracing::debug!(%peer_addr, "Connection closed by peer"),
                    Err(e) => tracing::warn!(%peer_addr, error = %e, "Connection error"),
                }
            });
        }
    }
}

/// Handle a single TCP connection.
///
/// Processes requests sequentially until the connection is closed.
async fn handle_connection<F, Fut>(mut stream: TcpStream, handler: Arc<F>) -> Result<()>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Response>> + Send + 'static,
{
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
    }

    loop {
        let frame = match read_frame(&mut stream).await {
            Ok(frame) => frame,
            Err(MinirpcError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };

        // There is no way to resynchronise after a bad frame.
        let request = Request::decode(&frame)?;

        if let Some(response) = handler(request).await {
            let encoded = response.encode()?;
            write_frame(&mut stream, &encoded).await?;
        }
    }
}
