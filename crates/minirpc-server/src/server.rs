use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use minirpc_common::protocol::error::{MinirpcError, Result};
use minirpc_common::protocol::{Request, Response};
use minirpc_common::serialize::{Serializer, SerializerRegistry};
use minirpc_common::transport::{TcpServer, MAX_FRAME_SIZE};
use minirpc_common::Context;

use crate::registry::{HandlerOutput, ServiceDef};

/// minirpc server
///
/// Owns the services and serializers it dispatches to. Register everything
/// first, then call [`Server::bind`] or [`Server::serve`]; the registries are
/// read-only once the server runs.
///
/// # Example
///
/// ```no_run
/// use minirpc_server::{Server, ServiceDef};
/// use minirpc_common::Context;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut server = Server::new();
/// server.register_service(ServiceDef::new("echo").method("Echo", |_ctx: Context, msg: String| async move {
///     Ok::<_, String>(msg)
/// }));
///
/// server.serve("127.0.0.1:8081").await?;
/// # Ok(())
/// # }
/// ```
pub struct Server {
    services: HashMap<String, ServiceDef>,
    serializers: SerializerRegistry,
}

impl Server {
    /// Creates a server with no services and the built-in serializers.
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
            serializers: SerializerRegistry::new(),
        }
    }

    /// Registers a service under its name, replacing one of the same name.
    pub fn register_service(&mut self, service: ServiceDef) -> &mut Self {
        tracing::info!(service = service.name(), methods = ?service.method_names(), "Registered service");
        self.services.insert(service.name().to_string(), service);
        self
    }

    /// Registers a payload serializer under its code.
    pub fn register_serializer(&mut self, serializer: Arc<dyn Serializer>) -> &mut Self {
        self.serializers.register(serializer);
        self
    }

    pub fn serializers(&self) -> &SerializerRegistry {
        &self.serializers
    }

    /// Dispatches one request and builds its response.
    ///
    /// Lookup failures (unknown service, method or serializer) and method
    /// failures all end up in the response's error field. The method runs on
    /// its own task, so a panic inside it becomes the error `method panicked`.
    ///
    /// A `deadline` in the metadata is handed to the method through its
    /// [`Context`]; the method decides whether to honour it.
    ///
    /// A result too large for one frame is dropped and replaced by an error.
    pub async fn handle_request(&self, request: Request) -> Response {
        let response = Response::for_request(&request);

        let output = match self.invoke(&request).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(
                    request_id = request.request_id,
                    service = %request.service_name,
                    method = %request.method_name,
                    error = %e,
                    "Dispatch failed"
                );
                HandlerOutput {
                    payload: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        };

        let response = response.with_payload(output.payload);
        let response = match output.error {
            Some(error) => response.with_error(error),
            None => response,
        };

        let size = response.header_len() + response.body_len();
        if size > MAX_FRAME_SIZE {
            tracing::warn!(
                request_id = request.request_id,
                service = %request.service_name,
                method = %request.method_name,
                size,
                "Response exceeds the frame size limit"
            );
            return Response::for_request(&request).with_error(format!(
                "response too large: {} bytes (max {} bytes)",
                size, MAX_FRAME_SIZE
            ));
        }
        response
    }

    async fn invoke(&self, request: &Request) -> Result<HandlerOutput> {
        let service = self
            .services
            .get(&request.service_name)
            .ok_or_else(|| MinirpcError::ServiceNotFound(request.service_name.clone()))?;

        let handler = service
            .get(&request.method_name)
            .ok_or_else(|| MinirpcError::MethodNotFound {
                service: request.service_name.clone(),
                method: request.method_name.clone(),
            })?;

        let serializer = self.serializers.get(request.serializer)?;

        tracing::debug!(
            request_id = request.request_id,
            service = %request.service_name,
            method = %request.method_name,
            serializer = serializer.name(),
            "Invoking method"
        );

        let ctx = request_context(request);
        let payload = request.payload.clone();
        tokio::spawn(handler.call(ctx, serializer, payload))
            .await
            .map_err(|e| {
                if e.is_panic() {
                    MinirpcError::Remote("method panicked".into())
                } else {
                    MinirpcError::Remote(format!("method task failed: {}", e))
                }
            })
    }

    /// Handles a request read from a connection. Oneway requests run on a
    /// detached task and produce no response.
    async fn dispatch(self: Arc<Self>, request: Request) -> Option<Response> {
        if !request.is_oneway() {
            return Some(self.handle_request(request).await);
        }

        let request_id = request.request_id;
        let service = request.service_name.clone();
        let method = request.method_name.clone();
        let task = tokio::spawn(async move {
            let response = self.handle_request(request).await;
            if let Some(error) = response.error_message() {
                tracing::error!(request_id, %service, %method, %error, "Oneway call failed");
            }
        });

        // Failures are logged, never surfaced to the connection loop.
        tokio::spawn(async move {
            if let Err(e) = task.await {
                tracing::error!(request_id, error = %e, "Oneway task aborted");
            }
        });

        None
    }

    /// Binds a listener without starting to accept connections.
    pub async fn bind(self, addr: &str) -> Result<BoundServer> {
        let listener = TcpServer::new(addr).await?;
        Ok(BoundServer {
            server: Arc::new(self),
            listener,
        })
    }

    /// Binds and runs until accepting fails.
    pub async fn serve(self, addr: &str) -> Result<()> {
        self.bind(addr).await?.run().await
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut services: Vec<&String> = self.services.keys().collect();
        services.sort();
        f.debug_struct("Server")
            .field("services", &services)
            .field("serializers", &self.serializers)
            .finish()
    }
}

/// A server with a bound listener.
pub struct BoundServer {
    server: Arc<Server>,
    listener: TcpServer,
}

impl BoundServer {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until accepting fails.
    pub async fn run(self) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!(%addr, "minirpc server listening");

        let server = self.server;
        self.listener
            .run_with_handler(move |request| Arc::clone(&server).dispatch(request))
            .await
    }
}

/// Rebuilds the caller's context from request metadata.
fn request_context(request: &Request) -> Context {
    let mut ctx = Context::background();
    if let Some(deadline) = request.deadline() {
        ctx = ctx.with_deadline(deadline);
    }
    if request.is_oneway() {
        ctx = ctx.with_oneway();
    }
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use minirpc_common::serialize::{self, BinarySerializer, JsonSerializer};
    use minirpc_common::transport::TcpTransport;
    use minirpc_common::META_ONEWAY;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct GetByIdReq {
        #[serde(rename = "Id")]
        id: i64,
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct GetByIdResp {
        #[serde(rename = "Msg")]
        msg: String,
    }

    fn user_service() -> ServiceDef {
        ServiceDef::new("user-service")
            .method("GetById", |_ctx: Context, req: GetByIdReq| async move {
                if req.id == 123 {
                    Ok(GetByIdResp { msg: "hello, world".into() })
                } else {
                    Err(format!("no user {}", req.id))
                }
            })
            .method("Panic", |_ctx: Context, _req: GetByIdReq| async move {
                if true {
                    panic!("boom");
                }
                Ok::<GetByIdResp, String>(GetByIdResp::default())
            })
    }

    fn server() -> Server {
        let mut server = Server::new();
        server.register_service(user_service());
        server
    }

    fn get_by_id(id: i64) -> Request {
        Request::new("user-service", "GetById")
            .with_request_id(9)
            .with_payload(serialize::encode(&JsonSerializer, &GetByIdReq { id }).unwrap())
    }

    #[tokio::test]
    async fn test_handle_request() {
        let response = server().handle_request(get_by_id(123)).await;
        assert_eq!(response.request_id, 9);
        assert!(response.error_message().is_none());
        let resp: GetByIdResp = serialize::decode(&JsonSerializer, &response.payload).unwrap();
        assert_eq!(resp.msg, "hello, world");
    }

    #[tokio::test]
    async fn test_oversized_result_becomes_error() {
        let mut server = Server::new();
        server.register_service(ServiceDef::new("blob").method("Big", |_ctx: Context, _req: ()| async move {
            Ok::<_, String>("a".repeat(MAX_FRAME_SIZE))
        }));

        let request = Request::new("blob", "Big")
            .with_request_id(4)
            .with_serializer(BinarySerializer.code())
            .with_payload(serialize::encode(&BinarySerializer, &()).unwrap());
        let response = server.handle_request(request).await;

        assert_eq!(response.request_id, 4);
        assert!(response.payload.is_empty());
        assert!(response.error_message().unwrap().starts_with("response too large"));
        assert!(response.encode().is_ok());
    }

    #[tokio::test]
    async fn test_method_error() {
        let response = server().handle_request(get_by_id(7)).await;
        assert_eq!(response.error_message().as_deref(), Some("no user 7"));
        assert!(response.payload.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let request = Request::new("nope", "GetById").with_request_id(3);
        let response = server().handle_request(request).await;
        assert_eq!(response.request_id, 3);
        assert_eq!(response.error_message().as_deref(), Some("service not found: nope"));
        assert!(response.payload.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let request = Request::new("user-service", "getById");
        let response = server().handle_request(request).await;
        assert_eq!(
            response.error_message().as_deref(),
            Some("method not found: user-service.getById")
        );
        assert!(response.payload.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_serializer_skips_method() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let mut server = Server::new();
        server.register_service(ServiceDef::new("svc").method("M", move |_ctx: Context, _req: ()| {
            let flag = flag.clone();
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, String>(())
            }
        }));

        let request = Request::new("svc", "M").with_serializer(42).with_payload(b"null".to_vec());
        let response = server.handle_request(request).await;
        assert_eq!(response.serializer, 42);
        assert_eq!(response.error_message().as_deref(), Some("unsupported serializer code: 42"));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panicking_method() {
        let request = Request::new("user-service", "Panic")
            .with_payload(serialize::encode(&JsonSerializer, &GetByIdReq::default()).unwrap());
        let response = server().handle_request(request).await;
        assert_eq!(response.error_message().as_deref(), Some("method panicked"));
    }

    #[tokio::test]
    async fn test_deadline_reaches_method() {
        let mut server = Server::new();
        server.register_service(ServiceDef::new("svc").method("Deadline", |ctx: Context, _req: ()| async move {
            Ok::<_, String>(ctx.deadline().map(|d| d.duration_since(SystemTime::UNIX_EPOCH).unwrap().as_millis() as u64))
        }));

        let deadline = SystemTime::UNIX_EPOCH + Duration::from_millis(4_000_000_000_000);
        let mut request = Request::new("svc", "Deadline").with_payload(b"null".to_vec());
        request.set_deadline(deadline);
        let response = server.handle_request(request).await;
        assert_eq!(response.payload, b"4000000000000");

        let request = Request::new("svc", "Deadline").with_payload(b"null".to_vec());
        let response = server.handle_request(request).await;
        assert_eq!(response.payload, b"null");
    }

    #[tokio::test]
    async fn test_binary_serializer_dispatch() {
        let request = Request::new("user-service", "GetById")
            .with_serializer(2)
            .with_payload(serialize::encode(&BinarySerializer, &GetByIdReq { id: 123 }).unwrap());
        let response = server().handle_request(request).await;
        assert_eq!(response.serializer, 2);
        let resp: GetByIdResp = serialize::decode(&BinarySerializer, &response.payload).unwrap();
        assert_eq!(resp.msg, "hello, world");
    }

    #[tokio::test]
    async fn test_oneway_over_tcp_keeps_connection() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let mut server = server();
        server.register_service(ServiceDef::new("events").method("Record", move |_ctx: Context, _req: ()| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            }
        }));

        let bound = server.bind("127.0.0.1:0").await.unwrap();
        let addr = bound.local_addr().unwrap().to_string();
        tokio::spawn(bound.run());

        let mut stream = TcpTransport::default().connect(&addr).await.unwrap();
        let oneway = Request::new("events", "Record")
            .with_metadata(META_ONEWAY, "true")
            .with_payload(b"null".to_vec());
        TcpTransport::send_request(&mut stream, &oneway).await.unwrap();

        TcpTransport::send_request(&mut stream, &get_by_id(123)).await.unwrap();
        let response = TcpTransport::receive_response(&mut stream).await.unwrap();
        assert_eq!(response.request_id, 9);
        assert!(response.error_message().is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_oneway_does_not_kill_connection() {
        let bound = server().bind("127.0.0.1:0").await.unwrap();
        let addr = bound.local_addr().unwrap().to_string();
        tokio::spawn(bound.run());

        let mut stream = TcpTransport::default().connect(&addr).await.unwrap();
        let oneway = Request::new("user-service", "Panic")
            .with_metadata(META_ONEWAY, "true")
            .with_payload(br#"{"Id":0}"#.to_vec());
        TcpTransport::send_request(&mut stream, &oneway).await.unwrap();

        TcpTransport::send_request(&mut stream, &get_by_id(123)).await.unwrap();
        let response = TcpTransport::receive_response(&mut stream).await.unwrap();
        assert!(response.error_message().is_none());
    }
}
