//! The request handler seam supplied by the owning system.

use super::context::RequestContext;
pub use super::error::HandlerError;
use crate::protocol::{Request, Response};

/// Executes a single procedure call.
///
/// Implementations are invoked concurrently from arbitrary executor tasks.
/// A handler that blocks occupies an executor slot for its duration; handlers
/// that do long work should watch `ctx` and return early once it is done.
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle_request(
        &self,
        ctx: &RequestContext,
        request: &Request,
    ) -> Result<Response, HandlerError>;
}
