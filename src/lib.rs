//! Dispatch Core
//!
//! Concurrent request dispatch for a JSON-RPC style server. Inbound calls are
//! run against a single [`RequestHandler`] using one of three strategies,
//! chosen at deployment time:
//!
//! - **Worker pool**: fixed executors, fast-fail admission control.
//! - **Admission group**: concurrent calls coalesced by size or elapsed time,
//!   then fanned out.
//! - **Pipeline**: fixed executors, blocking backpressure.
//!
//! # Guarantees
//!
//! - Every admitted call gets exactly one result unless its caller gives up
//!   or the dispatcher shuts down.
//! - A caller's cancellation or deadline is honored promptly, never waiting
//!   on queue space or handler completion.
//! - No ordering between calls.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod protocol;
pub mod shutdown;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use dispatch::{
    AdmissionGroupConfig, AdmissionGroupDispatcher, DispatchMetrics, DispatchResult,
    PipelineConfig, PipelineDispatcher, WorkerPoolConfig, WorkerPoolDispatcher,
};
use protocol::Request;
use telemetry::Logger;

pub use dispatch::{DispatchError, Dispatcher, RequestContext, RequestHandler, Strategy};

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub strategy: Strategy,
    pub worker_pool: WorkerPoolConfig,
    pub group: AdmissionGroupConfig,
    pub pipeline: PipelineConfig,
    /// Bound applied by [`Runtime::shutdown`].
    pub shutdown_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            worker_pool: WorkerPoolConfig::default(),
            group: AdmissionGroupConfig::default(),
            pipeline: PipelineConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// One dispatcher of the configured strategy, wired to a handler.
pub struct Runtime {
    config: RuntimeConfig,
    dispatcher: Arc<dyn Dispatcher>,
}

impl Runtime {
    /// Create a runtime. Must be called within a Tokio runtime.
    pub fn new(handler: Arc<dyn RequestHandler>, config: RuntimeConfig, logger: Logger) -> Self {
        let dispatcher: Arc<dyn Dispatcher> = match config.strategy {
            Strategy::WorkerPool => Arc::new(WorkerPoolDispatcher::new(
                handler,
                config.worker_pool.clone(),
                logger,
            )),
            Strategy::AdmissionGroup => Arc::new(AdmissionGroupDispatcher::new(
                handler,
                config.group.clone(),
                logger,
            )),
            Strategy::Pipeline => Arc::new(PipelineDispatcher::new(
                handler,
                config.pipeline.clone(),
                logger,
            )),
        };
        Self { config, dispatcher }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn strategy(&self) -> Strategy {
        self.dispatcher.strategy()
    }

    /// Shared handle for serving tasks.
    pub fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub async fn handle_request(&self, ctx: &RequestContext, request: Request) -> DispatchResult {
        self.dispatcher.handle_request(ctx, request).await
    }

    pub fn metrics(&self) -> DispatchMetrics {
        self.dispatcher.metrics()
    }

    /// Drain the dispatcher, bounded by the configured shutdown timeout.
    pub async fn shutdown(&self) -> Result<(), DispatchError> {
        self.dispatcher
            .shutdown_with_timeout(self.config.shutdown_timeout)
            .await
    }
}
