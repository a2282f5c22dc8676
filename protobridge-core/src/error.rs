use std::fmt;

/// All error types produced by the gateway core.
#[derive(Debug)]
pub enum GatewayError {
    /// The JSON tokenizer encountered a token it could not use in the current position.
    UnexpectedToken(String),

    /// A `\uXXXX` escape or a byte sequence could not be turned into valid UTF-8.
    Unescape(String),

    /// A JSON value did not match the kind the schema expected for the field.
    TypeMismatch(String),

    /// A proto wire value's wire type did not match the one the schema expected.
    InvalidWireType { field: String, expected: u8, got: u8 },

    /// Low-level wire decoding failure (truncated varint, negative length, short read).
    ParseError(i32),

    /// Descriptor resolution failed (missing message, bad annotation, validation failure).
    Resolve(String),

    /// A route registration conflicted with an existing route during rebuild.
    RouteConflict(String),

    /// Dialing a backend failed during rebuild.
    Dial(String),

    /// A field binding referenced a source value that did not parse into the field's kind.
    BindingTypeMismatch(String),

    /// An I/O error (file read, body read, network).
    Io(std::io::Error),

    /// A gRPC status error returned by a backend.
    GrpcStatus(tonic::Status),

    /// Any other error.
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::UnexpectedToken(ctx) => write!(f, "unexpected token: {ctx}"),
            GatewayError::Unescape(msg) => write!(f, "invalid string escape: {msg}"),
            GatewayError::TypeMismatch(msg) => write!(f, "type mismatch: {msg}"),
            GatewayError::InvalidWireType {
                field,
                expected,
                got,
            } => write!(f, "field {field}: expected wire type {expected}, got {got}"),
            GatewayError::ParseError(code) => write!(f, "wire decode error (code {code})"),
            GatewayError::Resolve(msg) => write!(f, "descriptor resolution failed: {msg}"),
            GatewayError::RouteConflict(msg) => write!(f, "route conflict: {msg}"),
            GatewayError::Dial(msg) => write!(f, "dial failed: {msg}"),
            GatewayError::BindingTypeMismatch(msg) => write!(f, "binding type mismatch: {msg}"),
            GatewayError::Io(err) => write!(f, "I/O error: {err}"),
            GatewayError::GrpcStatus(status) => {
                write!(f, "gRPC error: {} - {}", status.code(), status.message())
            }
            GatewayError::Other(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GatewayError::Io(err) => Some(err),
            GatewayError::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Io(err)
    }
}

impl From<tonic::Status> for GatewayError {
    fn from(status: tonic::Status) -> Self {
        GatewayError::GrpcStatus(status)
    }
}

/// Convenience type alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unexpected_token() {
        let err = GatewayError::UnexpectedToken("expected '{' at offset 0".into());
        assert_eq!(err.to_string(), "unexpected token: expected '{' at offset 0");
    }

    #[test]
    fn display_invalid_wire_type() {
        let err = GatewayError::InvalidWireType {
            field: "age".into(),
            expected: 0,
            got: 2,
        };
        assert_eq!(err.to_string(), "field age: expected wire type 0, got 2");
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: GatewayError = io_err.into();
        assert!(matches!(err, GatewayError::Io(_)));
    }

    #[test]
    fn grpc_status_conversion() {
        let status = tonic::Status::unavailable("backend down");
        let err: GatewayError = status.into();
        assert!(matches!(err, GatewayError::GrpcStatus(_)));
        assert!(err.to_string().contains("backend down"));
    }
}
