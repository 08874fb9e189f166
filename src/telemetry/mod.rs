//! Telemetry module for dispatch-core.
//!
//! Provides structured logging, span helpers, and metrics facade exports.

mod logging;
mod metrics;
mod spans;

pub use logging::{build_logger, init_logging, LogConfig, LogError, LogFormat, Logger};
pub use self::metrics::{
    record_active, record_execution, record_group_flush, record_rejection, record_request,
};
pub use spans::{ExecutorSpan, RequestSpan, SpanExt};
