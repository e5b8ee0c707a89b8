//! shellcache server entry point.
//!
//! Boots the cache agent behind an MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use shellcache_client::{FetchClient, FetchConfig};
use shellcache_core::{Agent, AgentManifest, AppConfig, CacheDb, ClientRegistry};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    let origin = config.origin_url()?;
    let manifest = AgentManifest::builtin();

    tracing::info!(
        version = manifest.version(),
        origin = %origin,
        db_path = %config.db_path.display(),
        "Starting shellcache server on stdio transport"
    );

    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache database {}", config.db_path.display()))?;
    let network = FetchClient::new(FetchConfig::from(&config), origin.clone())?;
    let clients = Arc::new(ClientRegistry::new());
    let agent = Agent::new(manifest, origin, Arc::new(db), Arc::new(network), clients, config.skip_waiting)?;

    let handler = handler::ShellcacheServer::new(Arc::new(agent));
    let agent = handler.agent().clone();
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;
    agent.settle().await;

    Ok(())
}
