//! minirpc Common Types and Transport
//!
//! This crate provides the wire protocol, payload serializers, call context
//! and TCP transport shared by the minirpc client and server.
//!
//! # Overview
//!
//! - **Protocol Layer**: [`Request`]/[`Response`] binary codec and [`MinirpcError`]
//! - **Serializers**: pluggable payload codecs selected by a one-byte code
//! - **Context**: per-call deadline, oneway flag and cancellation
//! - **Transport Layer**: length-delimited frames over TCP
//!
//! # Wire Format
//!
//! ```text
//! [headerLen:4][bodyLen:4][requestId:4][version:1][compression:1][serializer:1]
//! request header:  service \n method \n (key \r value \n)*
//! response header: error \n
//! [payload]
//! ```
//!
//! All integers are big-endian. `headerLen` counts the whole header
//! including the 15-byte preamble.
//!
//! # Example
//!
//! ```
//! use minirpc_common::{Request, Response};
//!
//! let request = Request::new("user-service", "GetById")
//!     .with_request_id(1)
//!     .with_payload(br#"{"Id":123}"#.to_vec());
//! let bytes = request.encode().unwrap();
//! assert_eq!(Request::decode(&bytes).unwrap(), request);
//!
//! let response = Response::for_request(&request).with_payload(br#"{"Msg":"hello, world"}"#.to_vec());
//! assert_eq!(response.request_id, 1);
//! ```

pub mod context;
pub mod protocol;
pub mod serialize;
pub mod transport;

pub use context::{CancelHandle, Context};
pub use protocol::*;
pub use serialize::{Serializer, SerializerRegistry};
