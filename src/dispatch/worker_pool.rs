//! Fixed executor pool with fast-fail admission control.
//!
//! A call is rejected with [`DispatchError::CapacityExceeded`] when
//! `max_queue_size` calls are already active; nothing is queued and the
//! caller never blocks on admission. Admitted calls go through a bounded
//! queue (capacity `max_queue_size`) to `num_workers` executors.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::context::{ContextError, RequestContext};
use super::error::DispatchError;
use super::executor::{self, SharedQueue};
use super::handler::RequestHandler;
use super::metrics::{DispatchCounters, DispatchMetrics};
use super::work::{DispatchResult, WorkItem};
use super::{Dispatcher, Strategy};
use crate::protocol::Request;
use crate::shutdown::{ShutdownCoordinator, ShutdownResult};
use crate::telemetry::{self, Logger};

const STRATEGY: Strategy = Strategy::WorkerPool;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Executor count.
    pub num_workers: usize,
    /// Admission bound, also the queue capacity.
    pub max_queue_size: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get().max(1) * 2,
            max_queue_size: 1000,
        }
    }
}

pub struct WorkerPoolDispatcher {
    config: WorkerPoolConfig,
    queue: mpsc::Sender<WorkItem>,
    counters: DispatchCounters,
    coordinator: ShutdownCoordinator,
    logger: Logger,
}

impl WorkerPoolDispatcher {
    /// Start the pool. Must be called within a Tokio runtime.
    pub fn new(handler: Arc<dyn RequestHandler>, config: WorkerPoolConfig, logger: Logger) -> Self {
        let config = WorkerPoolConfig {
            num_workers: config.num_workers.max(1),
            max_queue_size: config.max_queue_size.max(1),
        };
        let (queue, receiver): (_, SharedQueue) = executor::work_queue(config.max_queue_size);
        let coordinator = ShutdownCoordinator::new();
        coordinator.register(executor::spawn_executors(
            config.num_workers,
            STRATEGY,
            &receiver,
            &handler,
            coordinator.token(),
            &logger,
        ));
        logger.in_scope(|| {
            tracing::info!(
                workers = config.num_workers,
                max_queue_size = config.max_queue_size,
                "worker pool started"
            )
        });

        Self { config, queue, counters: DispatchCounters::new(), coordinator, logger }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    pub async fn handle_request(&self, ctx: &RequestContext, request: Request) -> DispatchResult {
        self.counters.record_request();
        telemetry::record_request(STRATEGY);
        if !self.coordinator.is_accepting() {
            return Err(ContextError::Cancelled.into());
        }

        let max = self.config.max_queue_size as u64;
        let Some(_active) = self.counters.try_admit(max) else {
            self.counters.record_rejection();
            telemetry::record_rejection(STRATEGY);
            self.logger.in_scope(|| {
                tracing::warn!(method = %request.method, max, "worker pool at capacity, rejecting")
            });
            return Err(DispatchError::CapacityExceeded { active: self.counters.active(), max });
        };
        telemetry::record_active(STRATEGY, self.counters.active());

        let token = self.coordinator.token();
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

    /// Cancel executors and wait for them, bounded by `timeout`.
    ///
    /// Executors finish the item in hand first. If they do not all stop in
    /// time this returns [`ContextError::DeadlineExceeded`] and the
    /// stragglers keep running detached.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), DispatchError> {
        match self.coordinator.initiate(Some(timeout)).await {
            ShutdownResult::Complete => {
                self.logger.in_scope(|| tracing::info!("worker pool stopped"));
                Ok(())
            }
            ShutdownResult::Timeout { remaining } => {
                self.logger.in_scope(|| {
                    tracing::warn!(
                        remaining,
                        timeout_ms = timeout.as_millis() as u64,
                        "worker pool shutdown timed out, leaving executors running"
                    )
                });
                Err(ContextError::DeadlineExceeded.into())
            }
        }
    }

    pub fn metrics(&self) -> DispatchMetrics {
        let queued = self.queue.max_capacity() - self.queue.capacity();
        DispatchMetrics::from_counters(
            STRATEGY,
            &self.counters,
            self.config.num_workers,
            self.config.max_queue_size,
            queued,
        )
    }
}

#[async_trait::async_trait]
impl Dispatcher for WorkerPoolDispatcher {
    async fn handle_request(
        &self,
        ctx: &RequestContext,
        request: Request,
    ) -> Result<crate::protocol::Response, DispatchError> {
        WorkerPoolDispatcher::handle_request(self, ctx, request).await
    }

    async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), DispatchError> {
        self.shutdown(timeout).await
    }

    fn metrics(&self) -> DispatchMetrics {
        WorkerPoolDispatcher::metrics(self)
    }

    fn strategy(&self) -> Strategy {
        STRATEGY
    }
}

#[cfg(test)]
#[path = "worker_pool_tests.rs"]
mod tests;
