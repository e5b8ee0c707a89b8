//! Tool-level errors for the shellcache server.
//!
//! Agent failures use `shellcache_core::Error`; these cover what only the
//! tool surface can get wrong.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// No open client session with this id.
    #[error("UNKNOWN_CLIENT: {0}")]
    UnknownClient(String),

    /// Tool output could not be serialized.
    #[error("INTERNAL: {0}")]
    Serialize(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match &err {
            ToolError::UnknownClient(id) => (-32022, format!("no open client session: {id}")),
            ToolError::Serialize(msg) => (-32603, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
