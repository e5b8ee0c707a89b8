//! Lifecycle tools: sw_install, sw_activate, sw_message, sw_status.
//!
//! The host drives the agent's lifecycle through these; each maps to one
//! agent event.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::{Agent, ClientMessage, Phase};

use super::json_result;

/// Parameters for the sw_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwMessageParams {
    /// Message posted by a page, e.g. `{"type": "SKIP_WAITING"}`.
    /// Unrecognized messages are ignored.
    pub message: serde_json::Value,
}

/// Output from the sw_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwMessageOutput {
    /// Whether the message was recognized.
    pub handled: bool,
    /// Phase before the message, if it caused a transition.
    pub from: Option<Phase>,
    /// Phase after handling.
    pub phase: Phase,
}

pub async fn install_impl(agent: &Agent) -> Result<CallToolResult, McpError> {
    let report = agent.install().await?;
    json_result(&report)
}

pub async fn activate_impl(agent: &Agent) -> Result<CallToolResult, McpError> {
    let report = agent.activate().await?;
    json_result(&report)
}

pub async fn message_impl(agent: &Agent, params: SwMessageParams) -> Result<CallToolResult, McpError> {
    let message = ClientMessage::from_value(params.message);
    let transition = agent.handle_message(message).await?;

    let output = SwMessageOutput {
        handled: message != ClientMessage::Unknown,
        from: transition.filter(|t| t.changed()).map(|t| t.from),
        phase: agent.phase().await,
    };
    json_result(&output)
}

pub async fn status_impl(agent: &Agent) -> Result<CallToolResult, McpError> {
    json_result(&agent.status().await)
}
