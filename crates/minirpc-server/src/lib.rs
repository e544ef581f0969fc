//! minirpc server
//!
//! This crate provides the service registry and the TCP server that
//! dispatches requests to registered methods.

pub mod registry;
pub mod server;

pub use registry::{BoxFuture, HandlerOutput, IntoOutcome, MethodHandler, Outcome, ServiceDef};
pub use server::{BoundServer, Server};
