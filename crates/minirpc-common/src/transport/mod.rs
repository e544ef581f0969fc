//! minirpc Transport Layer
//!
//! This module moves encoded messages over TCP.
//!
//! # Architecture
//!
//! - **Transport**: TCP with long-lived connections, one exchange at a time
//! - **Framing**: every message announces its own length in its first eight
//!   bytes (`headerLen`, `bodyLen`), so frames need no extra prefix
//!
//! # Components
//!
//! - **[`read_frame`]** / **[`write_frame`]**: move one whole frame
//! - **[`TcpTransport`]**: async dialer used by the client connection pool
//! - **[`TcpServer`]**: async accept loop used by the server
//!
//! # Message Size Limits
//!
//! Frames larger than [`MAX_FRAME_SIZE`] (100 MB) are rejected before any
//! buffer is allocated.

pub mod frame;
pub mod tcp;
pub mod tcp_server;

pub use frame::{read_frame, write_frame, LENGTH_PREFIX_LEN, MAX_FRAME_SIZE};
pub use tcp::{TcpTransport, DEFAULT_CONNECT_TIMEOUT};
pub use tcp_server::TcpServer;
