//! Payload serializers
//!
//! A serializer turns an in-memory value into the opaque payload bytes of a
//! message and back. Each one is identified on the wire by a one-byte code
//! carried in the message preamble:
//!
//! - **[`JsonSerializer`]** (code 1): structured text via `serde_json`
//! - **[`BinarySerializer`]** (code 2): compact binary via `postcard`, where
//!   the Rust type is the schema
//!
//! The [`Serializer`] trait is object safe so a [`SerializerRegistry`] can
//! hold codecs registered at runtime. Typed code goes through the [`encode`]
//! and [`decode`] helpers.
//!
//! # Example
//!
//! ```
//! use minirpc_common::serialize::{self, JsonSerializer, Serializer};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct GetByIdReq {
//!     #[serde(rename = "Id")]
//!     id: i64,
//! }
//!
//! let json = JsonSerializer;
//! let bytes = serialize::encode(&json, &GetByIdReq { id: 123 }).unwrap();
//! assert_eq!(bytes, br#"{"Id":123}"#);
//!
//! let back: GetByIdReq = serialize::decode(&json, &bytes).unwrap();
//! assert_eq!(back, GetByIdReq { id: 123 });
//! ```

mod binary;
mod json;
mod registry;

pub use binary::BinarySerializer;
pub use json::JsonSerializer;
pub use registry::SerializerRegistry;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::{MinirpcError, Result};

/// Wire code of the structured-text serializer.
pub const JSON_CODE: u8 = 1;

/// Wire code of the schema-based binary serializer.
pub const BINARY_CODE: u8 = 2;

/// Callback handed a type-erased deserializer positioned at the payload.
pub type DecodeVisitor<'a> =
    dyn FnMut(&mut dyn erased_serde::Deserializer<'_>) -> std::result::Result<(), erased_serde::Error> + 'a;

/// A payload codec identified on the wire by a one-byte code.
pub trait Serializer: Send + Sync {
    /// The code written into the message preamble.
    fn code(&self) -> u8;

    /// Human-readable name used in logs.
    fn name(&self) -> &'static str;

    /// Encodes a value into payload bytes.
    fn encode(&self, value: &dyn erased_serde::Serialize) -> Result<Vec<u8>>;

    /// Runs `visit` against a deserializer reading `data`.
    ///
    /// The visitor decides the target type; this keeps the trait object safe
    /// while still deserializing straight into typed values.
    fn decode_with(&self, data: &[u8], visit: &mut DecodeVisitor<'_>) -> Result<()>;
}

/// Encodes `value` with `serializer`.
pub fn encode<T: Serialize>(serializer: &dyn Serializer, value: &T) -> Result<Vec<u8>> {
    serializer.encode(value)
}

/// Decodes payload bytes into a fresh `T` with `serializer`.
pub fn decode<T: DeserializeOwned>(serializer: &dyn Serializer, data: &[u8]) -> Result<T> {
    let mut out = None;
    serializer.decode_with(data, &mut |de| {
        out = Some(erased_serde::deserialize::<T>(de)?);
        Ok(())
    })?;
    out.ok_or_else(|| MinirpcError::Decoding(format!("{} produced no value", serializer.name())))
}
