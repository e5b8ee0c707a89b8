//! Client sessions (open tabs/windows) and the messages exchanged with them.
//!
//! The host owns the sessions. The agent keeps a registry entry per open
//! session with a mailbox for outbound messages; delivery is best-effort.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};

/// Message posted from the agent to its pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentMessage {
    /// A new version took control.
    Activated { version: String },
}

/// Message posted from a page to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Activate the waiting version now instead of after all pages close.
    SkipWaiting,
    /// Anything else; ignored.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Interpret an arbitrary posted value. Malformed data is `Unknown`.
    pub fn from_value(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or(ClientMessage::Unknown)
    }
}

/// Identifier of an open client session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
struct Session {
    /// Version of the agent controlling this page, if any.
    controller: Option<String>,
    mailbox: mpsc::UnboundedSender<AgentMessage>,
}

/// Snapshot of one session for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ClientInfo {
    pub id: ClientId,
    pub controller: Option<String>,
}

/// Registry of open client sessions, shared by every deployed version.
///
/// The host owns it and hands the same registry to each agent, so a newly
/// activated version claims pages loaded under its predecessor.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    state: Mutex<RegistryState>,
    next_id: AtomicU64,
}

#[derive(Debug, Default)]
struct RegistryState {
    sessions: BTreeMap<ClientId, Session>,
    /// Version that most recently claimed the sessions.
    controller: Option<String>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened page. It starts uncontrolled; the receiver
    /// gets every message the agent posts to it.
    pub async fn connect(&self) -> (ClientId, mpsc::UnboundedReceiver<AgentMessage>) {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let id = ClientId(format!("client-{n}"));
        let (tx, rx) = mpsc::unbounded_channel();

        self.state
            .lock()
            .await
            .sessions
            .insert(id.clone(), Session { controller: None, mailbox: tx });
        tracing::debug!(client = %id, "client session opened");

        (id, rx)
    }

    /// Forget a closed page. Returns whether it was known.
    pub async fn disconnect(&self, id: &ClientId) -> bool {
        let removed = self.state.lock().await.sessions.remove(id).is_some();
        if removed {
            tracing::debug!(client = %id, "client session closed");
        }
        removed
    }

    /// Take control of every open session for `version` and record it as the
    /// controlling version. Returns the sessions whose controller changed.
    pub async fn claim(&self, version: &str) -> Vec<ClientId> {
        let mut state = self.state.lock().await;
        if state.controller.as_deref() != Some(version) {
            if let Some(previous) = &state.controller {
                tracing::info!(from = %previous, to = %version, "controller replaced");
            }
            state.controller = Some(version.to_string());
        }

        let mut claimed = Vec::new();
        for (id, session) in state.sessions.iter_mut() {
            if session.controller.as_deref() != Some(version) {
                session.controller = Some(version.to_string());
                claimed.push(id.clone());
            }
        }
        claimed
    }

    /// Version that last claimed the sessions, if any has.
    pub async fn controller(&self) -> Option<String> {
        self.state.lock().await.controller.clone()
    }

    /// Post `message` to every open session without waiting for receipt.
    /// Returns how many mailboxes accepted it.
    pub async fn broadcast(&self, message: &AgentMessage) -> usize {
        let state = self.state.lock().await;
        state
            .sessions
            .iter()
            .filter(|(id, session)| deliver(id, session, message))
            .count()
    }

    /// Post `message` to the listed sessions only. Unknown ids are skipped.
    pub async fn post(&self, ids: &[ClientId], message: &AgentMessage) -> usize {
        let state = self.state.lock().await;
        ids.iter()
            .filter(|id| state.sessions.get(*id).is_some_and(|session| deliver(id, session, message)))
            .count()
    }

    pub async fn is_controlled(&self, id: &ClientId, version: &str) -> bool {
        self.state
            .lock()
            .await
            .sessions
            .get(id)
            .is_some_and(|s| s.controller.as_deref() == Some(version))
    }

    pub async fn list(&self) -> Vec<ClientInfo> {
        self.state
            .lock()
            .await
            .sessions
            .iter()
            .map(|(id, s)| ClientInfo { id: id.clone(), controller: s.controller.clone() })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.sessions.len()
    }
}

fn deliver(id: &ClientId, session: &Session, message: &AgentMessage) -> bool {
    match session.mailbox.send(message.clone()) {
        Ok(()) => true,
        Err(_) => {
            tracing::warn!(client = %id, "client mailbox closed; message dropped");
            false
        }
    }
}
