//! Error taxonomy for the dispatch core.

use serde_json::json;
use thiserror::Error;

use super::context::ContextError;
use crate::protocol::{RpcError, INTERNAL_ERROR};

/// Error type returned by a [`RequestHandler`](super::RequestHandler).
///
/// Opaque to the dispatch core: it is passed back to the caller unchanged.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum DispatchError {
    /// Rejected before admission. Safe to retry: the handler never ran.
    #[error("server at capacity: {active} active requests (max {max})")]
    CapacityExceeded { active: u64, max: u64 },

    /// Caller cancellation, caller deadline, or dispatcher shutdown.
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("handler error: {0}")]
    Handler(#[source] HandlerError),

    #[error("handler panicked: {0}")]
    HandlerPanicked(String),
}

impl DispatchError {
    /// Only capacity rejection is retryable without risking duplicate side effects.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Context(ContextError::Cancelled))
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::Context(ContextError::DeadlineExceeded))
    }

    /// Map to a JSON-RPC error object for the protocol layer.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Self::CapacityExceeded { active, max } => RpcError::new(
                INTERNAL_ERROR,
                "server at capacity",
                Some(json!({ "retryable": true, "active": active, "max": max })),
            ),
            Self::Context(err) => RpcError::new(INTERNAL_ERROR, err.to_string(), None),
            Self::Handler(err) => RpcError::new(INTERNAL_ERROR, err.to_string(), None),
            Self::HandlerPanicked(msg) => {
                RpcError::new(INTERNAL_ERROR, "internal handler failure", Some(json!(msg)))
            }
        }
    }
}
