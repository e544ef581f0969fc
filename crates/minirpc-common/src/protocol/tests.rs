//! Tests across the protocol module
//!
//! These exercise requests and responses together the way a client and a
//! server use them, rather than each codec in isolation.

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::collections::HashMap;

    #[test]
    fn test_request_response_flow() {
        let request = Request::new("user-service", "GetById")
            .with_request_id(31)
            .with_serializer(1)
            .with_payload(br#"{"Id":123}"#.to_vec());

        let received = Request::decode(&request.encode().unwrap()).unwrap();
        let response = Response::for_request(&received).with_payload(br#"{"Msg":"hello, world"}"#.to_vec());
        let returned = Response::decode(&response.encode().unwrap()).unwrap();

        assert_eq!(returned.request_id, request.request_id);
        assert_eq!(returned.serializer, request.serializer);
        assert_eq!(returned.version, PROTOCOL_VERSION);
        assert!(returned.error_message().is_none());
        assert_eq!(returned.payload, br#"{"Msg":"hello, world"}"#);
    }

    #[test]
    fn test_oversized_messages_are_not_encoded() {
        let max = crate::transport::MAX_FRAME_SIZE;
        let request = Request::new("svc", "Upload").with_payload(vec![0u8; max]);
        assert!(matches!(request.encode(), Err(MinirpcError::MalformedMessage(_))));

        let response = Response::for_request(&Request::new("svc", "Upload")).with_payload(request.payload);
        assert!(matches!(response.encode(), Err(MinirpcError::MalformedMessage(_))));
    }

    #[test]
    fn test_metadata_is_unordered() {
        let mut a = Request::new("svc", "m");
        let mut b = Request::new("svc", "m");
        let pairs = [("deadline", "1"), ("one-way", "true"), ("trace id", "abc")];
        for (k, v) in pairs {
            a.metadata.insert(k.to_string(), v.to_string());
        }
        for (k, v) in pairs.iter().rev() {
            b.metadata.insert(k.to_string(), v.to_string());
        }

        let da = Request::decode(&a.encode().unwrap()).unwrap();
        let db = Request::decode(&b.encode().unwrap()).unwrap();
        assert_eq!(da.metadata, db.metadata);
        assert_eq!(da.metadata.len(), 3);
    }

    #[test]
    fn test_large_metadata_map() {
        let metadata: HashMap<String, String> = (0..200)
            .map(|i| (format!("key-{}", i), format!("value-{}", i * 7)))
            .collect();
        let request = Request {
            metadata,
            ..Request::new("svc", "method")
        };

        let encoded = request.encode().unwrap();
        assert_eq!(u32::from_be_bytes(encoded[0..4].try_into().unwrap()) as usize, request.header_len());
        assert_eq!(Request::decode(&encoded).unwrap(), request);
    }

    #[test]
    fn test_response_bytes_are_not_a_request() {
        // A response frame has a single header field, so decoding it as a
        // request must fail rather than read past the header.
        let response = Response::empty().with_error("boom");
        let err = Request::decode(&response.encode().unwrap()).unwrap_err();
        assert!(matches!(err, MinirpcError::MalformedMessage(_)));
    }
}
