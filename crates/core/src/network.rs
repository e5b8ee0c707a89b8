//! The network collaborator seen from the agent.

use async_trait::async_trait;

use crate::Error;
use crate::http::{Request, Response};

/// Performs real network requests on the agent's behalf.
///
/// Implementations resolve with whatever response the server sent, including
/// 4xx/5xx statuses, and fail with [`Error::Network`] only when no response
/// could be obtained at all.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}
