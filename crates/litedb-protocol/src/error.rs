//! Response error codes and protocol-level errors.

use std::fmt;

use thiserror::Error;

/// Error codes carried in `CommandResult::error_code`.
///
/// Every per-message failure is reported with one of these codes; the
/// connection itself stays open.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The inbound bytes did not decode into a `Command`.
    DecodeFailure,
    /// No registered route matched the command path.
    UnknownPath,
    /// A route matched but has no handler for the parsed operation.
    OperationNotSupported,
    /// The handler requires a payload and the command carried none.
    MissingPayload,
    /// The payload type identifier does not match the handler's type,
    /// or the payload bytes could not be decoded into it.
    PayloadTypeMismatch,
    /// The handler failed or panicked.
    InternalServerError,
    /// The dispatch was cancelled because the server is stopping.
    ServerShuttingDown,

    // Handler-defined code
    Custom(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DecodeFailure => "decode-failure",
            Self::UnknownPath => "unknown-path",
            Self::OperationNotSupported => "operation-not-supported",
            Self::MissingPayload => "missing-payload",
            Self::PayloadTypeMismatch => "payload-type-mismatch",
            Self::InternalServerError => "internal-server-error",
            Self::ServerShuttingDown => "server-shutting-down",
            Self::Custom(code) => code,
        }
    }

    pub fn from_wire(code: &str) -> Self {
        match code {
            "decode-failure" => Self::DecodeFailure,
            "unknown-path" => Self::UnknownPath,
            "operation-not-supported" => Self::OperationNotSupported,
            "missing-payload" => Self::MissingPayload,
            "payload-type-mismatch" => Self::PayloadTypeMismatch,
            "internal-server-error" => Self::InternalServerError,
            "server-shutting-down" => Self::ServerShuttingDown,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        Self::from_wire(code)
    }
}

/// Failure to encode or decode an envelope.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("empty frame")]
    EmptyFrame,
}
