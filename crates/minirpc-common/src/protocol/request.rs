//! minirpc Request
//!
//! One RPC call on the wire. After the preamble the variable header holds the
//! service name, the method name and any metadata pairs, then the payload:
//!
//! ```text
//! [preamble:15][service]\n[method]\n([key]\r[value]\n)*[payload]
//! ```

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::error::{MinirpcError, Result};
use super::wire::{
    self, Preamble, COMPRESSION_NONE, FIELD_SEPARATOR, PAIR_SEPARATOR, PREAMBLE_LEN, PROTOCOL_VERSION,
};

/// Metadata key carrying the caller's absolute deadline in milliseconds since
/// the Unix epoch.
pub const META_DEADLINE: &str = "deadline";

/// Metadata key marking a fire-and-forget call.
pub const META_ONEWAY: &str = "one-way";

/// Smallest valid request header: preamble plus two empty, terminated names.
const MIN_HEADER_LEN: usize = PREAMBLE_LEN + 2;

/// An RPC request sent from a client to a server.
///
/// The header and body lengths are not stored; they are derived from the
/// fields by [`header_len`](Self::header_len) and [`body_len`](Self::body_len)
/// when encoding, and checked when decoding.
///
/// # Example
///
/// ```
/// use minirpc_common::protocol::Request;
///
/// let request = Request::new("user-service", "GetById")
///     .with_serializer(1)
///     .with_payload(br#"{"Id":123}"#.to_vec());
///
/// let encoded = request.encode().unwrap();
/// assert_eq!(Request::decode(&encoded).unwrap(), request);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub request_id: u32,
    pub version: u8,
    /// Reserved; always [`COMPRESSION_NONE`].
    pub compression: u8,
    pub serializer: u8,
    pub service_name: String,
    pub method_name: String,
    pub metadata: HashMap<String, String>,
    pub payload: Vec<u8>,
}

impl Request {
    /// Creates a request for the current protocol version, using the JSON
    /// serializer code until [`Request::with_serializer`] says otherwise.
    pub fn new(service_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Request {
            request_id: 0,
            version: PROTOCOL_VERSION,
            compression: COMPRESSION_NONE,
            serializer: crate::serialize::JSON_CODE,
            service_name: service_name.into(),
            method_name: method_name.into(),
            metadata: HashMap::new(),
            payload: Vec::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: u32) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_serializer(mut self, code: u8) -> Self {
        self.serializer = code;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Header length as written on the wire.
    pub fn header_len(&self) -> usize {
        let meta: usize = self
            .metadata
            .iter()
            .map(|(key, value)| key.len() + 1 + value.len() + 1)
            .sum();
        PREAMBLE_LEN + self.service_name.len() + 1 + self.method_name.len() + 1 + meta
    }

    pub fn body_len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the caller asked for fire-and-forget semantics.
    pub fn is_oneway(&self) -> bool {
        self.metadata.get(META_ONEWAY).map(String::as_str) == Some("true")
    }

    /// Attaches an absolute deadline as milliseconds since the Unix epoch.
    pub fn set_deadline(&mut self, deadline: SystemTime) {
        let millis = deadline
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.metadata.insert(META_DEADLINE.to_string(), millis.to_string());
    }

    /// The propagated deadline, if present and parseable.
    pub fn deadline(&self) -> Option<SystemTime> {
        let millis: u64 = self.metadata.get(META_DEADLINE)?.parse().ok()?;
        UNIX_EPOCH.checked_add(Duration::from_millis(millis))
    }

    /// Encodes the request into a single frame.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` if a name or metadata entry contains one of
    /// the header separators, or if the frame would exceed
    /// [`MAX_FRAME_SIZE`](crate::transport::MAX_FRAME_SIZE).
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.check_format()?;

        wire::check_frame_size(self.header_len(), self.body_len())?;
        let header_len = wire::to_wire_len(self.header_len(), "request header")?;
        let body_len = wire::to_wire_len(self.body_len(), "request body")?;

        let mut buf = Vec::with_capacity(header_len as usize + body_len as usize);
        Preamble {
            header_len,
            body_len,
            request_id: self.request_id,
            version: self.version,
            compression: self.compression,
            serializer: self.serializer,
        }
        .write(&mut buf);

        buf.extend_from_slice(self.service_name.as_bytes());
        buf.push(FIELD_SEPARATOR);
        buf.extend_from_slice(self.method_name.as_bytes());
        buf.push(FIELD_SEPARATOR);

        for (key, value) in &self.metadata {
            buf.extend_from_slice(key.as_bytes());
            buf.push(PAIR_SEPARATOR);
            buf.extend_from_slice(value.as_bytes());
            buf.push(FIELD_SEPARATOR);
        }

        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes a request from a complete frame.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (preamble, header, payload) = wire::split_message(data, MIN_HEADER_LEN)?;

        let (service, header) = wire::take_field(header, "service name")?;
        let (method, mut header) = wire::take_field(header, "method name")?;

        let mut metadata = HashMap::new();
        while !header.is_empty() {
            let (pair, rest) = wire::take_field(header, "metadata entry")?;
            let split = pair.iter().position(|&b| b == PAIR_SEPARATOR).ok_or_else(|| {
                MinirpcError::MalformedMessage("metadata entry without key/value separator".to_string())
            })?;
            let key = wire::utf8_field(&pair[..split], "metadata key")?;
            let value = wire::utf8_field(&pair[split + 1..], "metadata value")?;
            metadata.insert(key, value);
            header = rest;
        }

        Ok(Request {
            request_id: preamble.request_id,
            version: preamble.version,
            compression: preamble.compression,
            serializer: preamble.serializer,
            service_name: wire::utf8_field(service, "service name")?,
            method_name: wire::utf8_field(method, "method name")?,
            metadata,
            payload: payload.to_vec(),
        })
    }

    fn check_format(&self) -> Result<()> {
        if self.service_name.as_bytes().contains(&FIELD_SEPARATOR) {
            return Err(MinirpcError::MalformedMessage("service name contains a newline".to_string()));
        }
        if self.method_name.as_bytes().contains(&FIELD_SEPARATOR) {
            return Err(MinirpcError::MalformedMessage("method name contains a newline".to_string()));
        }
        let bad = |s: &String| s.bytes().any(|b| b == FIELD_SEPARATOR || b == PAIR_SEPARATOR);
        if let Some((key, _)) = self.metadata.iter().find(|(k, v)| bad(k) || bad(v)) {
            return Err(MinirpcError::MalformedMessage(format!(
                "metadata entry '{}' contains a separator byte",
                key.escape_debug()
            )));
        }
        Ok(())
    }
}
