//! minirpc Response
//!
//! One RPC result. After the preamble the variable header is the error
//! message terminated by a newline, then the payload:
//!
//! ```text
//! [preamble:15][error]\n[payload]
//! ```

use super::error::{MinirpcError, Result};
use super::request::Request;
use super::wire::{self, Preamble, COMPRESSION_NONE, FIELD_SEPARATOR, PREAMBLE_LEN, PROTOCOL_VERSION};

const MIN_HEADER_LEN: usize = PREAMBLE_LEN + 1;

/// An RPC response returned from a server to the client.
///
/// An empty `error` means the call succeeded. A response may carry both an
/// error and a payload when the method produced a partial result.
///
/// # Example
///
/// ```
/// use minirpc_common::protocol::{Request, Response};
///
/// let request = Request::new("user-service", "GetById").with_request_id(9);
/// let response = Response::for_request(&request)
///     .with_payload(br#"{"Msg":"hello, world"}"#.to_vec());
///
/// assert_eq!(response.request_id, 9);
/// assert!(response.error_message().is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub request_id: u32,
    pub version: u8,
    pub compression: u8,
    pub serializer: u8,
    pub error: Vec<u8>,
    pub payload: Vec<u8>,
}

impl Response {
    /// Creates an empty response mirroring the request's id, version,
    /// compression and serializer bytes.
    pub fn for_request(request: &Request) -> Self {
        Response {
            request_id: request.request_id,
            version: request.version,
            compression: request.compression,
            serializer: request.serializer,
            error: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Creates an empty response not tied to any request.
    pub fn empty() -> Self {
        Response {
            version: PROTOCOL_VERSION,
            compression: COMPRESSION_NONE,
            ..Default::default()
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the error field. Newlines become spaces so the message fits the
    /// single-line error field.
    pub fn with_error(mut self, message: impl AsRef<str>) -> Self {
        self.error = message.as_ref().replace('\n', " ").into_bytes();
        self
    }

    /// The error field as text, `None` when empty.
    pub fn error_message(&self) -> Option<String> {
        if self.error.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.error).into_owned())
        }
    }

    pub fn header_len(&self) -> usize {
        PREAMBLE_LEN + self.error.len() + 1
    }

    pub fn body_len(&self) -> usize {
        self.payload.len()
    }

    /// Encodes the response into a single frame.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` if the error message contains a newline or
    /// the frame would exceed [`MAX_FRAME_SIZE`](crate::transport::MAX_FRAME_SIZE).
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.error.contains(&FIELD_SEPARATOR) {
            return Err(MinirpcError::MalformedMessage("error message contains a newline".to_string()));
        }

        wire::check_frame_size(self.header_len(), self.body_len())?;
        let header_len = wire::to_wire_len(self.header_len(), "response header")?;
        let body_len = wire::to_wire_len(self.body_len(), "response body")?;

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

        buf.extend_from_slice(&self.error);
        buf.push(FIELD_SEPARATOR);
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes a response from a complete frame.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (preamble, header, payload) = wire::split_message(data, MIN_HEADER_LEN)?;

        let (error, rest) = wire::take_field(header, "error message")?;
        if !rest.is_empty() {
            return Err(MinirpcError::MalformedMessage(
                "unexpected bytes after the error message".to_string(),
            ));
        }

        Ok(Response {
            request_id: preamble.request_id,
            version: preamble.version,
            compression: preamble.compression,
            serializer: preamble.serializer,
            error: error.to_vec(),
            payload: payload.to_vec(),
        })
    }
}
