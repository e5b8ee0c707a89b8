//! MCP server handler implementation.
//!
//! Each tool delivers one host event to the agent or reads its state.
use std::sync::Arc;

use crate::tools::Mailboxes;
use crate::tools::cache::{CacheGetParams, get_impl, list_impl};
use crate::tools::clients::{ClientParams, close_impl, open_impl, poll_impl};
use crate::tools::fetch::{SwFetchParams, fetch_impl};
use crate::tools::lifecycle::{SwMessageParams, activate_impl, install_impl, message_impl, status_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use shellcache_core::Agent;

/// The MCP server handler for shellcache.
#[derive(Clone)]
pub struct ShellcacheServer {
    agent: Arc<Agent>,
    mailboxes: Arc<Mailboxes>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ShellcacheServer {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self { agent, mailboxes: Arc::new(Mailboxes::new()), tool_router: Self::tool_router() }
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    #[tool(
        description = "Deliver the install event: fetch every precache manifest entry and store them all, or none. Fails if any entry cannot be fetched."
    )]
    async fn sw_install(&self) -> Result<CallToolResult, McpError> {
        install_impl(&self.agent).await
    }

    #[tool(
        description = "Deliver the activate event: evict caches of other versions, take control of open pages and notify them with ACTIVATED."
    )]
    async fn sw_activate(&self) -> Result<CallToolResult, McpError> {
        activate_impl(&self.agent).await
    }

    #[tool(
        description = "Deliver an intercepted request. Returns passthrough, or the response the agent serves and where it came from."
    )]
    async fn sw_fetch(&self, params: Parameters<SwFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.agent, params.0).await
    }

    #[tool(description = "Deliver a message posted by a page. {\"type\":\"SKIP_WAITING\"} activates a waiting agent.")]
    async fn sw_message(&self, params: Parameters<SwMessageParams>) -> Result<CallToolResult, McpError> {
        message_impl(&self.agent, params.0).await
    }

    #[tool(description = "Report the agent version, lifecycle phase, open pages and pending cache refreshes.")]
    async fn sw_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.agent).await
    }

    #[tool(description = "Open a page session. Returns its client id; the page starts uncontrolled.")]
    async fn sw_client_open(&self) -> Result<CallToolResult, McpError> {
        open_impl(&self.agent, &self.mailboxes).await
    }

    #[tool(description = "Close a page session.")]
    async fn sw_client_close(&self, params: Parameters<ClientParams>) -> Result<CallToolResult, McpError> {
        close_impl(&self.agent, &self.mailboxes, params.0).await
    }

    #[tool(description = "Drain messages the agent sent to a page session and report its controller.")]
    async fn sw_client_poll(&self, params: Parameters<ClientParams>) -> Result<CallToolResult, McpError> {
        poll_impl(&self.agent, &self.mailboxes, params.0).await
    }

    #[tool(description = "List cache names with their stored request identities.")]
    async fn cache_list(&self) -> Result<CallToolResult, McpError> {
        list_impl(&self.agent).await
    }

    #[tool(description = "Get one stored response by cache name and URL, with its body digest.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.agent, params.0).await
    }
}

impl ServerHandler for ShellcacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "shellcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
