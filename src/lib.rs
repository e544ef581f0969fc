//! minirpc
//!
//! A minimal RPC framework: a compact binary wire protocol over TCP, pooled
//! client connections with deadline and cancellation support, typed service
//! stubs, and a server that dispatches to registered services.
//!
//! This crate re-exports the pieces most programs need:
//!
//! - [`common`]: wire protocol, serializers, [`Context`], transport
//! - [`client`]: [`Client`], connection pool, typed stubs
//! - [`server`]: [`Server`] and service definitions
//!
//! # Example
//!
//! ```no_run
//! use minirpc::{Client, Context, Server, ServiceClient, ServiceDef, Stub, StubBinder};
//!
//! struct Echo {
//!     echo: Stub<String, String>,
//! }
//!
//! impl ServiceClient for Echo {
//!     fn bind(binder: &StubBinder) -> Self {
//!         Self { echo: binder.stub("Echo") }
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = Server::new();
//! server.register_service(ServiceDef::new("echo").method("Echo", |_ctx: Context, msg: String| async move {
//!     Ok::<_, String>(msg)
//! }));
//! let bound = server.bind("127.0.0.1:0").await?;
//! let addr = bound.local_addr()?.to_string();
//! tokio::spawn(bound.run());
//!
//! let client = Client::connect(&addr).await?;
//! let svc: Echo = client.init_service("echo");
//! let reply = svc.echo.call(&Context::background(), &"hi".to_string()).await.into_result()?;
//! assert_eq!(reply, "hi");
//! # Ok(())
//! # }
//! ```

pub use minirpc_client as client;
pub use minirpc_common as common;
pub use minirpc_server as server;

pub use minirpc_client::{Client, PoolConfig, Reply, ServiceClient, Stub, StubBinder};
pub use minirpc_common::{CancelHandle, Context, MinirpcError, Request, Response, Result};
pub use minirpc_server::{Outcome, Server, ServiceDef};
