use crate::protocol::error::{MinirpcError, Result};

use super::{DecodeVisitor, Serializer, JSON_CODE};

/// Structured-text serializer (code 1).
///
/// Payloads are plain JSON documents, so field names on the wire follow the
/// serde names of the Rust types (use `#[serde(rename = "...")]` to match
/// peers written against another naming convention).
///
/// # Example
///
/// ```
/// use minirpc_common::serialize::{self, JsonSerializer, Serializer};
/// use std::collections::BTreeMap;
///
/// let mut value = BTreeMap::new();
/// value.insert("Msg", "hello, world");
///
/// let bytes = serialize::encode(&JsonSerializer, &value).unwrap();
/// assert_eq!(bytes, br#"{"Msg":"hello, world"}"#);
/// assert_eq!(JsonSerializer.code(), 1);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn code(&self) -> u8 {
        JSON_CODE
    }

    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &dyn erased_serde::Serialize) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| MinirpcError::Encoding(format!("json: {}", e)))
    }

    fn decode_with(&self, data: &[u8], visit: &mut DecodeVisitor<'_>) -> Result<()> {
        let mut de = serde_json::Deserializer::from_slice(data);
        {
            let mut erased = <dyn erased_serde::Deserializer>::erase(&mut de);
            visit(&mut erased).map_err(|e| MinirpcError::Decoding(format!("json: {}", e)))?;
        }
        // Reject trailing garbage after the document.
        de.end().map_err(|e| MinirpcError::Decoding(format!("json: {}", e)))
    }
}
