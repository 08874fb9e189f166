//! Single-use pairing of one request with its eventual result.
//!
//! [`WorkItem::new`] returns the item (moved to whichever executor runs it)
//! and a [`PendingResult`] the caller awaits. The item is consumed by
//! [`WorkItem::deliver`], so a result is delivered at most once.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::context::{ContextError, RequestContext};
use super::error::DispatchError;
use super::handler::RequestHandler;
use crate::protocol::{Request, Response};

pub type DispatchResult = Result<Response, DispatchError>;

pub(crate) struct WorkItem {
    pub(crate) ctx: RequestContext,
    pub(crate) request: Request,
    slot: oneshot::Sender<DispatchResult>,
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.request.id)
            .field("method", &self.request.method)
            .field("done", &self.ctx.err())
            .finish()
    }
}

/// Outcome of offering a result to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// The caller gave up or the dispatcher is shutting down.
    Abandoned,
}

impl WorkItem {
    pub(crate) fn new(ctx: RequestContext, request: Request) -> (Self, PendingResult) {
        let (slot, rx) = oneshot::channel();
        (Self { ctx, request, slot }, PendingResult { rx })
    }

    /// Offer the result. Never blocks: an abandoned caller is skipped.
    pub(crate) fn deliver(self, result: DispatchResult, shutdown: &CancellationToken) -> Delivery {
        if self.ctx.err().is_some() || shutdown.is_cancelled() {
            return Delivery::Abandoned;
        }
        match self.slot.send(result) {
            Ok(()) => Delivery::Delivered,
            Err(_) => Delivery::Abandoned,
        }
    }
}

/// Caller half of a [`WorkItem`].
#[derive(Debug)]
pub(crate) struct PendingResult {
    rx: oneshot::Receiver<DispatchResult>,
}

impl PendingResult {
    /// Wait for whichever comes first: the result, the caller's context, or shutdown.
    pub(crate) async fn wait(self, ctx: &RequestContext, shutdown: &CancellationToken) -> DispatchResult {
        tokio::select! {
            biased;
            // A dropped slot means the item was discarded during shutdown.
            result = self.rx => result.unwrap_or(Err(ContextError::Cancelled.into())),
            err = ctx.done() => Err(err.into()),
            () = shutdown.cancelled() => Err(ContextError::Cancelled.into()),
        }
    }
}

/// Run the handler once, turning a panic into [`DispatchError::HandlerPanicked`].
pub(crate) async fn invoke(
    handler: &dyn RequestHandler,
    ctx: &RequestContext,
    request: &Request,
) -> DispatchResult {
    match AssertUnwindSafe(handler.handle_request(ctx, request)).catch_unwind().await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(err)) => Err(DispatchError::Handler(err)),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(method = %request.method, panic = %message, "handler panicked");
            Err(DispatchError::HandlerPanicked(message))
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
