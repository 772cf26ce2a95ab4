//! Command and result envelopes.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, ProtocolError};
use crate::payload::TypedPayload;

/// Client → server request.
///
/// `path` is a command string such as `collections/users:create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Optional correlation number echoed back in the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<TypedPayload>,
}

/// Server → client response, used for successes and failures alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub success: bool,
    #[serde(rename = "errorCode", default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Handler-specific result data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<TypedPayload>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper constructors
// ─────────────────────────────────────────────────────────────────────────────

impl Command {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            id: None,
            path: path.into(),
            data: None,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_data(mut self, data: TypedPayload) -> Self {
        self.data = Some(data);
        self
    }
}

impl CommandResult {
    pub fn ok() -> Self {
        Self {
            id: None,
            success: true,
            error_code: None,
            data: None,
        }
    }

    pub fn ok_with(data: TypedPayload) -> Self {
        Self {
            data: Some(data),
            ..Self::ok()
        }
    }

    pub fn failure(code: impl Into<ErrorCode>) -> Self {
        Self {
            id: None,
            success: false,
            error_code: Some(code.into().as_str().to_string()),
            data: None,
        }
    }

    pub fn with_id(mut self, id: Option<u64>) -> Self {
        self.id = id;
        self
    }

    pub fn error(&self) -> Option<ErrorCode> {
        self.error_code.as_deref().map(ErrorCode::from_wire)
    }
}

pub fn decode_command(bytes: &[u8]) -> Result<Command, ProtocolError> {
    if bytes.is_empty() {
        return Err(ProtocolError::EmptyFrame);
    }
    serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
}

pub fn encode_command(command: &Command) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(command).map_err(ProtocolError::Encode)
}

pub fn decode_result(bytes: &[u8]) -> Result<CommandResult, ProtocolError> {
    if bytes.is_empty() {
        return Err(ProtocolError::EmptyFrame);
    }
    serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
}

pub fn encode_result(result: &CommandResult) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(result).map_err(ProtocolError::Encode)
}
