//! Request dispatch strategies.
//!
//! Three interchangeable ways to run inbound calls against one
//! [`RequestHandler`]:
//!
//! - [`WorkerPoolDispatcher`]: fixed executor pool, fast-fail admission control.
//! - [`AdmissionGroupDispatcher`]: coalesces concurrent calls into groups
//!   bounded by size or elapsed time, then fans each group out.
//! - [`PipelineDispatcher`]: fixed executor pool with blocking backpressure.
//!
//! All three implement [`Dispatcher`] and are chosen at deployment time.

mod context;
mod error;
mod executor;
mod group;
mod handler;
mod metrics;
mod pipeline;
#[cfg(test)]
mod testing;
mod work;
mod worker_pool;

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use context::{ContextError, RequestContext};
pub use error::{DispatchError, HandlerError};
pub use group::{AdmissionGroupConfig, AdmissionGroupDispatcher, FlushTrigger};
pub use handler::RequestHandler;
pub use self::metrics::{ActiveGuard, DispatchCounters, DispatchMetrics};
pub use pipeline::{PipelineConfig, PipelineDispatcher};
pub use work::DispatchResult;
pub use worker_pool::{WorkerPoolConfig, WorkerPoolDispatcher};

use crate::protocol::Request;

/// Which dispatch strategy a deployment uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    WorkerPool,
    AdmissionGroup,
    Pipeline,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkerPool => "worker_pool",
            Self::AdmissionGroup => "admission_group",
            Self::Pipeline => "pipeline",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dispatch strategy: {0}")]
pub struct UnknownStrategy(pub String);

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "worker_pool" | "pool" => Ok(Self::WorkerPool),
            "admission_group" | "group" | "batch" => Ok(Self::AdmissionGroup),
            "pipeline" => Ok(Self::Pipeline),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

/// Uniform contract over the three strategies.
#[async_trait::async_trait]
pub trait Dispatcher: Send + Sync {
    /// Run `request` and wait for its result, the caller's context, or shutdown.
    async fn handle_request(
        &self,
        ctx: &RequestContext,
        request: Request,
    ) -> Result<crate::protocol::Response, DispatchError>;

    /// Stop accepting work and drain, giving up after `timeout`.
    ///
    /// On timeout returns [`ContextError::DeadlineExceeded`]; work still
    /// running is left to finish on its own.
    async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), DispatchError>;

    fn metrics(&self) -> DispatchMetrics;

    fn strategy(&self) -> Strategy;
}
