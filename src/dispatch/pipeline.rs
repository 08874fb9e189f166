//! Fixed executor pool with blocking backpressure.
//!
//! Like the worker pool but without admission control: submission waits on
//! the bounded queue (capacity `2 * workers`) until space frees, the caller
//! gives up, or shutdown begins. Nothing is ever rejected.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::context::{ContextError, RequestContext};
use super::error::DispatchError;
use super::executor;
use super::handler::RequestHandler;
use super::metrics::{DispatchCounters, DispatchMetrics};
use super::work::{DispatchResult, WorkItem};
use super::{Dispatcher, Strategy};
use crate::protocol::Request;
use crate::shutdown::ShutdownCoordinator;
use crate::telemetry::{self, Logger};

const STRATEGY: Strategy = Strategy::Pipeline;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workers: usize,
}

impl PipelineConfig {
    pub fn queue_capacity(&self) -> usize {
        self.workers.max(1) * 2
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { workers: num_cpus::get().max(1) }
    }
}

pub struct PipelineDispatcher {
    config: PipelineConfig,
    queue: mpsc::Sender<WorkItem>,
    counters: DispatchCounters,
    coordinator: ShutdownCoordinator,
    logger: Logger,
}

impl PipelineDispatcher {
    /// Start the executors. Must be called within a Tokio runtime.
    pub fn new(handler: Arc<dyn RequestHandler>, config: PipelineConfig, logger: Logger) -> Self {
        let config = PipelineConfig { workers: config.workers.max(1) };
        let (queue, receiver) = executor::work_queue(config.queue_capacity());
        let coordinator = ShutdownCoordinator::new();
        coordinator.register(executor::spawn_executors(
            config.workers,
            STRATEGY,
            &receiver,
            &handler,
            coordinator.token(),
            &logger,
        ));
        logger.in_scope(|| {
            tracing::info!(
                workers = config.workers,
                queue_capacity = config.queue_capacity(),
                "pipeline started"
            )
        });

        Self { config, queue, counters: DispatchCounters::new(), coordinator, logger }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn handle_request(&self, ctx: &RequestContext, request: Request) -> DispatchResult {
        self.counters.record_request();
        telemetry::record_request(STRATEGY);
        let token = self.coordinator.token();
        if token.is_cancelled() {
            return Err(ContextError::Cancelled.into());
        }
        let _active = self.counters.admit();
        telemetry::record_active(STRATEGY, self.counters.active());

        let (item, pending) = WorkItem::new(ctx.clone(), request);
        tokio::select! {
            biased;
            () = token.cancelled() => return Err(ContextError::Cancelled.into()),
            err = ctx.done() => return Err(err.into()),
            sent = self.queue.send(item) => {
                if sent.is_err() {
                    return Err(ContextError::Cancelled.into());
                }
            }
        }

        pending.wait(ctx, token).await
    }

    /// Cancel executors and wait for all of them. Unbounded; callers that
    /// need a bound use [`Dispatcher::shutdown_with_timeout`].
    pub async fn shutdown(&self) {
        self.coordinator.initiate(None).await;
        self.logger.in_scope(|| tracing::info!("pipeline stopped"));
    }

    pub fn metrics(&self) -> DispatchMetrics {
        let queued = self.queue.max_capacity() - self.queue.capacity();
        DispatchMetrics::from_counters(
            STRATEGY,
            &self.counters,
            self.config.workers,
            self.config.queue_capacity(),
            queued,
        )
    }
}

#[async_trait::async_trait]
impl Dispatcher for PipelineDispatcher {
    async fn handle_request(
        &self,
        ctx: &RequestContext,
        request: Request,
    ) -> Result<crate::protocol::Response, DispatchError> {
        PipelineDispatcher::handle_request(self, ctx, request).await
    }

    async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), DispatchError> {
        tokio::time::timeout(timeout, self.shutdown())
            .await
            .map_err(|_| ContextError::DeadlineExceeded.into())
    }

    fn metrics(&self) -> DispatchMetrics {
        PipelineDispatcher::metrics(self)
    }

    fn strategy(&self) -> Strategy {
        STRATEGY
    }
}
