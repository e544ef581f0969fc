use thiserror::Error;

#[derive(Error, Debug)]
pub enum MinirpcError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("method not found: {service}.{method}")]
    MethodNotFound { service: String, method: String },

    #[error("unsupported serializer code: {0}")]
    UnsupportedSerializer(u8),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),

    /// Returned instead of a response for fire-and-forget calls.
    #[error("oneway call, no response will arrive")]
    Oneway,

    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// Error message carried back in a response's error field.
    #[error("{0}")]
    Remote(String),

    #[error("Connection pool acquire timed out after {0}ms")]
    PoolTimeout(u64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MinirpcError {
    /// Whether the connection this error occurred on must be discarded
    /// rather than returned to a pool.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            MinirpcError::Transport(_)
                | MinirpcError::ConnectionClosed
                | MinirpcError::Connection(_)
                | MinirpcError::MalformedMessage(_)
                | MinirpcError::Io(_)
        )
    }

    /// Whether this error is the end of a caller's context rather than a
    /// failure of the call itself.
    pub fn is_context_error(&self) -> bool {
        matches!(self, MinirpcError::Cancelled | MinirpcError::DeadlineExceeded)
    }
}

impl From<std::net::AddrParseError> for MinirpcError {
    fn from(err: std::net::AddrParseError) -> Self {
        MinirpcError::Connection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MinirpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_fatal_classification() {
        assert!(MinirpcError::Transport("reset".into()).is_connection_fatal());
        assert!(MinirpcError::ConnectionClosed.is_connection_fatal());
        assert!(MinirpcError::MalformedMessage("short".into()).is_connection_fatal());

        assert!(!MinirpcError::Oneway.is_connection_fatal());
        assert!(!MinirpcError::ServiceNotFound("x".into()).is_connection_fatal());
        assert!(!MinirpcError::UnsupportedSerializer(9).is_connection_fatal());
        assert!(!MinirpcError::Remote("boom".into()).is_connection_fatal());
    }

    #[test]
    fn test_remote_error_displays_message_verbatim() {
        let err = MinirpcError::Remote("mock error".into());
        assert_eq!(err.to_string(), "mock error");
    }

    #[test]
    fn test_method_not_found_message() {
        let err = MinirpcError::MethodNotFound {
            service: "user-service".into(),
            method: "Missing".into(),
        };
        assert_eq!(err.to_string(), "method not found: user-service.Missing");
    }
}
