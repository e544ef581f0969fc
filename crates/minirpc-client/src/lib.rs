//! minirpc client
//!
//! - [`Client`]: pooled connections to one server, context-aware `invoke`
//! - [`ConnectionPool`]: bounded pool with idle reuse and lazy expiry
//! - [`Stub`] / [`ServiceClient`]: typed per-method call slots

pub mod client;
pub mod pool;
pub mod stub;

pub use client::Client;
pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
pub use stub::{Reply, ServiceClient, Stub, StubBinder};
