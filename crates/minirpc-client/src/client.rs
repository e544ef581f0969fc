use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use minirpc_common::protocol::error::{MinirpcError, Result};
use minirpc_common::protocol::{Request, Response, META_ONEWAY};
use minirpc_common::serialize::{JsonSerializer, Serializer};
use minirpc_common::Context;

use crate::pool::{ConnectionPool, PoolConfig, PooledConnection};
use crate::stub::{ServiceClient, StubBinder};

/// minirpc client for making RPC calls
///
/// Calls go over pooled connections to one server. Cloning the client is
/// cheap; clones share the pool and the request id counter.
#[derive(Clone)]
pub struct Client {
    pool: ConnectionPool,
    next_id: Arc<AtomicU32>,
}

impl Client {
    /// Create a new client with the default pool configuration
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::with_config(addr, PoolConfig::default()).await
    }

    /// Create a new client with a custom pool configuration
    pub async fn with_config(addr: &str, config: PoolConfig) -> Result<Self> {
        let pool = ConnectionPool::connect(addr, config).await?;
        Ok(Self {
            pool,
            next_id: Arc::new(AtomicU32::new(1)),
        })
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Next request id from this client's counter.
    pub fn next_request_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Binds a service descriptor using the JSON serializer.
    pub fn init_service<S: ServiceClient>(&self, service_name: &str) -> S {
        self.init_service_with(service_name, Arc::new(JsonSerializer))
    }

    /// Binds a service descriptor using the given serializer.
    pub fn init_service_with<S: ServiceClient>(&self, service_name: &str, serializer: Arc<dyn Serializer>) -> S {
        let binder = StubBinder::new(self.clone(), service_name, serializer);
        S::bind(&binder)
    }

    /// Invoke an RPC call
    ///
    /// Assigns a request id and copies the context's deadline and oneway flag
    /// into the request metadata. The exchange runs on its own task and is
    /// raced against the context: if the context finishes first the call
    /// returns `Cancelled` or `DeadlineExceeded` and the exchange is left to
    /// complete in the background, releasing its connection when it does.
    ///
    /// # Errors
    ///
    /// - `Oneway` once a oneway request has been written
    /// - `Cancelled` / `DeadlineExceeded` when the context finishes first
    /// - transport and format errors from the exchange
    pub async fn invoke(&self, ctx: &Context, mut request: Request) -> Result<Response> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        request.request_id = self.next_request_id();
        if let Some(deadline) = ctx.deadline() {
            request.set_deadline(deadline);
        }
        if ctx.is_oneway() {
            request.metadata.insert(META_ONEWAY.to_string(), "true".to_string());
        }

        let frame = request.encode()?;
        let request_id = request.request_id;
        let oneway = ctx.is_oneway();

        let client = self.clone();
        let exchange = tokio::spawn(async move {
            let mut conn = client.round_trip(oneway, &frame).await?;
            let bytes = conn.read_frame().await?;
            match Response::decode(&bytes) {
                Ok(response) if response.request_id == request_id => Ok(response),
                Ok(response) => {
                    conn.mark_broken();
                    Err(MinirpcError::MalformedMessage(format!(
                        "response id {} does not match request id {}",
                        response.request_id, request_id
                    )))
                }
                Err(e) => {
                    conn.mark_broken();
                    Err(e)
                }
            }
        });

        tokio::select! {
            joined = exchange => {
                joined.map_err(|e| MinirpcError::Transport(format!("call task failed: {}", e)))?
            }
            err = ctx.done() => {
                tracing::debug!(request_id, error = %err, "Call abandoned");
                Err(err)
            }
        }
    }

    /// Sends an already encoded request frame and returns the raw response frame.
    ///
    /// For a oneway context this returns `Err(Oneway)` as soon as the frame is
    /// written.
    pub async fn send(&self, ctx: &Context, data: Vec<u8>) -> Result<Vec<u8>> {
        let mut conn = self.round_trip(ctx.is_oneway(), &data).await?;
        conn.read_frame().await
    }

    /// Checks out a connection and writes `frame` to it. The returned
    /// connection is ready to read the response.
    async fn round_trip(&self, oneway: bool, frame: &[u8]) -> Result<PooledConnection> {
        let mut conn = self.pool.acquire().await?;
        conn.write_frame(frame).await?;
        if oneway {
            return Err(MinirpcError::Oneway);
        }
        Ok(conn)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("pool", &self.pool).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minirpc_common::transport::TcpServer;
    use minirpc_common::META_DEADLINE;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Echo server that records every request it sees.
    async fn echo_server(delay: Duration) -> (String, Arc<Mutex<Vec<Request>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let server = TcpServer::new("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap().to_string();

        let log = seen.clone();
        tokio::spawn(async move {
            server
                .run_with_handler(move |request: Request| {
                    let log = log.clone();
                    async move {
                        tokio::time::sleep(delay).await;
                        log.lock().unwrap().push(request.clone());
                        if request.is_oneway() {
                            return None;
                        }
                        Some(Response::for_request(&request).with_payload(request.payload))
                    }
                })
                .await
        });

        (addr, seen)
    }

    #[tokio::test]
    async fn test_connect_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = Client::connect(&addr).await;
        assert!(matches!(result, Err(MinirpcError::Connection(_))));
    }

    #[tokio::test]
    async fn test_invoke_round_trip() {
        let (addr, _) = echo_server(Duration::ZERO).await;
        let client = Client::connect(&addr).await.unwrap();

        let request = Request::new("echo", "Echo").with_payload(b"ping".to_vec());
        let response = client.invoke(&Context::background(), request).await.unwrap();
        assert_eq!(response.payload, b"ping");
        assert!(response.error_message().is_none());
    }

    #[tokio::test]
    async fn test_request_ids_increase() {
        let (addr, seen) = echo_server(Duration::ZERO).await;
        let client = Client::connect(&addr).await.unwrap();

        for _ in 0..3 {
            client
                .invoke(&Context::background(), Request::new("echo", "Echo"))
                .await
                .unwrap();
        }

        let ids: Vec<u32> = seen.lock().unwrap().iter().map(|r| r.request_id).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids: {:?}", ids);
    }

    #[tokio::test]
    async fn test_deadline_is_propagated() {
        let (addr, seen) = echo_server(Duration::ZERO).await;
        let client = Client::connect(&addr).await.unwrap();

        let ctx = Context::background().with_timeout(Duration::from_secs(10));
        client.invoke(&ctx, Request::new("echo", "Echo")).await.unwrap();

        let request = seen.lock().unwrap()[0].clone();
        assert!(request.metadata.contains_key(META_DEADLINE));
        let sent = request.deadline().unwrap();
        let wanted = ctx.deadline().unwrap();
        let skew = wanted.duration_since(sent).unwrap_or_else(|e| e.duration());
        assert!(skew < Duration::from_millis(1), "deadline travels in whole milliseconds");
    }

    #[tokio::test]
    async fn test_oneway_returns_after_write() {
        let (addr, seen) = echo_server(Duration::ZERO).await;
        let client = Client::connect(&addr).await.unwrap();

        let ctx = Context::background().with_oneway();
        let err = client
            .invoke(&ctx, Request::new("echo", "Notify"))
            .await
            .unwrap_err();
        assert!(matches!(err, MinirpcError::Oneway));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_oneway());
    }

    #[tokio::test]
    async fn test_deadline_exceeded_on_slow_server() {
        let (addr, _) = echo_server(Duration::from_millis(500)).await;
        let client = Client::connect(&addr).await.unwrap();

        let ctx = Context::background().with_timeout(Duration::from_millis(100));
        let start = std::time::Instant::now();
        let err = client.invoke(&ctx, Request::new("echo", "Slow")).await.unwrap_err();
        assert!(matches!(err, MinirpcError::DeadlineExceeded));
        assert!(start.elapsed() < Duration::from_millis(400));

        // The abandoned exchange still finishes and returns its connection.
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(client.pool().in_use_count(), 0);
        assert_eq!(client.pool().idle_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let (addr, seen) = echo_server(Duration::from_millis(300)).await;
        let client = Client::connect(&addr).await.unwrap();

        let (ctx, handle) = Context::background().with_cancel();
        handle.cancel();
        let err = client.invoke(&ctx, Request::new("echo", "Echo")).await.unwrap_err();
        assert!(matches!(err, MinirpcError::Cancelled));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(seen.lock().unwrap().is_empty(), "a finished context sends nothing");
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let (addr, _) = echo_server(Duration::from_millis(300)).await;
        let client = Client::connect(&addr).await.unwrap();

        let (ctx, handle) = Context::background().with_cancel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });

        let err = client.invoke(&ctx, Request::new("echo", "Echo")).await.unwrap_err();
        assert!(matches!(err, MinirpcError::Cancelled));
    }

    #[tokio::test]
    async fn test_send_raw_frame() {
        let (addr, _) = echo_server(Duration::ZERO).await;
        let client = Client::connect(&addr).await.unwrap();

        let frame = Request::new("echo", "Echo")
            .with_request_id(77)
            .with_payload(b"raw".to_vec())
            .encode()
            .unwrap();
        let bytes = client.send(&Context::background(), frame).await.unwrap();
        let response = Response::decode(&bytes).unwrap();
        assert_eq!(response.request_id, 77);
        assert_eq!(response.payload, b"raw");
    }

    #[tokio::test]
    async fn test_concurrent_invokes_use_separate_connections() {
        let (addr, _) = echo_server(Duration::from_millis(50)).await;
        let client = Client::connect(&addr).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..4u8 {
            let client = client.clone();
            tasks.push(tokio::spawn(async move {
                let request = Request::new("echo", "Echo").with_payload(vec![i]);
                client.invoke(&Context::background(), request).await
            }));
        }
        for (i, task) in tasks.into_iter().enumerate() {
            let response = task.await.unwrap().unwrap();
            assert_eq!(response.payload, vec![i as u8]);
        }
        assert_eq!(client.pool().idle_count(), 4);
    }
}
