use crate::protocol::error::{MinirpcError, Result};

use super::{DecodeVisitor, Serializer, BINARY_CODE};

/// Schema-based binary serializer (code 2), backed by `postcard`.
///
/// The encoding is not self-describing: both peers must agree on the Rust
/// type, which acts as the schema. Types that need `deserialize_any` (such as
/// `serde_json::Value`) cannot be decoded with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinarySerializer;

impl Serializer for BinarySerializer {
    fn code(&self) -> u8 {
        BINARY_CODE
    }

    fn name(&self) -> &'static str {
        "binary"
    }

    fn encode(&self, value: &dyn erased_serde::Serialize) -> Result<Vec<u8>> {
        postcard::to_allocvec(value).map_err(|e| MinirpcError::Encoding(format!("binary: {}", e)))
    }

    fn decode_with(&self, data: &[u8], visit: &mut DecodeVisitor<'_>) -> Result<()> {
        let mut de = postcard::Deserializer::from_bytes(data);
        let mut erased = <dyn erased_serde::Deserializer>::erase(&mut de);
        visit(&mut erased).map_err(|e| MinirpcError::Decoding(format!("binary: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::{decode, encode};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct GetByIdReq {
        id: i64,
        tags: Vec<String>,
    }

    #[test]
    fn test_binary_round_trip() {
        let value = GetByIdReq {
            id: 123,
            tags: vec!["a".into(), "bc".into()],
        };
        let bytes = encode(&BinarySerializer, &value).unwrap();
        let back: GetByIdReq = decode(&BinarySerializer, &bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_binary_is_compact() {
        let value = GetByIdReq { id: 1, tags: vec![] };
        let binary = encode(&BinarySerializer, &value).unwrap();
        let json = encode(&crate::serialize::JsonSerializer, &value).unwrap();
        assert!(binary.len() < json.len());
    }

    #[test]
    fn test_binary_truncated_input() {
        let value = GetByIdReq {
            id: 99,
            tags: vec!["long enough tag".into()],
        };
        let bytes = encode(&BinarySerializer, &value).unwrap();
        let err = decode::<GetByIdReq>(&BinarySerializer, &bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, MinirpcError::Decoding(_)));
    }

    #[test]
    fn test_binary_code() {
        assert_eq!(BinarySerializer.code(), 2);
        assert_eq!(BinarySerializer.name(), "binary");
    }
}
