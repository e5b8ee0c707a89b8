//! Client session tools: sw_client_open, sw_client_close, sw_client_poll.
//!
//! A session stands in for one open page. Messages the agent broadcasts
//! queue in the session's mailbox until polled.

use std::collections::HashMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::{Agent, AgentMessage, ClientId};
use tokio::sync::{Mutex, mpsc};

use super::json_result;
use crate::error::ToolError;

/// Receiving ends of open sessions' mailboxes.
#[derive(Debug, Default)]
pub struct Mailboxes {
    inner: Mutex<HashMap<ClientId, mpsc::UnboundedReceiver<AgentMessage>>>,
}

impl Mailboxes {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parameters naming an open session.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientParams {
    /// Session id returned by sw_client_open.
    pub client_id: String,
}

/// Output from the sw_client_open tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientOpenOutput {
    pub client_id: ClientId,
    /// Version controlling the page; new pages start uncontrolled.
    pub controller: Option<String>,
}

/// Output from the sw_client_poll tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientPollOutput {
    pub client_id: ClientId,
    pub controller: Option<String>,
    /// Messages received since the last poll, oldest first.
    pub messages: Vec<AgentMessage>,
}

pub async fn open_impl(agent: &Agent, mailboxes: &Mailboxes) -> Result<CallToolResult, McpError> {
    let (client_id, rx) = agent.clients().connect().await;
    mailboxes.inner.lock().await.insert(client_id.clone(), rx);

    json_result(&ClientOpenOutput { client_id, controller: None })
}

pub async fn close_impl(agent: &Agent, mailboxes: &Mailboxes, params: ClientParams) -> Result<CallToolResult, McpError> {
    let id = ClientId::from(params.client_id);
    if mailboxes.inner.lock().await.remove(&id).is_none() {
        return Err(ToolError::UnknownClient(id.to_string()).into());
    }
    agent.clients().disconnect(&id).await;

    json_result(&serde_json::json!({ "client_id": id, "closed": true }))
}

pub async fn poll_impl(agent: &Agent, mailboxes: &Mailboxes, params: ClientParams) -> Result<CallToolResult, McpError> {
    let id = ClientId::from(params.client_id);

    let mut messages = Vec::new();
    {
        let mut inner = mailboxes.inner.lock().await;
        let rx = inner
            .get_mut(&id)
            .ok_or_else(|| ToolError::UnknownClient(id.to_string()))?;
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
    }

    let controller = agent
        .clients()
        .list()
        .await
        .into_iter()
        .find(|c| c.id == id)
        .and_then(|c| c.controller);

    json_result(&ClientPollOutput { client_id: id, controller, messages })
}
