//! Span utilities and extension traits for dispatch-core tracing.
//!
//! Provides standardized span creation and result recording.

use tracing::{debug_span, Span};

use crate::dispatch::Strategy;

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for the spans executor tasks run under.
pub struct ExecutorSpan;

impl ExecutorSpan {
    pub fn new(strategy: Strategy, executor_id: usize) -> Span {
        debug_span!("executor", strategy = strategy.as_str(), executor_id)
    }
}

/// Factory for per-call spans.
pub struct RequestSpan;

impl RequestSpan {
    /// Fields included:
    /// - `request_id`, `method`: taken from the request
    /// - `status`, `error.message`: filled in by `SpanExt::record_result`
    pub fn new(strategy: Strategy, request_id: &str, method: &str) -> Span {
        debug_span!(
            "dispatch_request",
            strategy = strategy.as_str(),
            request_id = %request_id,
            method = %method,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}
