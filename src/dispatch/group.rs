//! Admission-group dispatcher.
//!
//! Concurrent calls are coalesced into an admission group, which is flushed
//! by whichever fires first:
//!
//! - **size**: the call that brings the group to `group_size` swaps it out
//!   and starts processing it before waiting for its own result;
//! - **time**: a single-shot timer, armed when the group goes from empty to
//!   non-empty, flushes whatever accumulated after `group_timeout`.
//!
//! The group is swapped for an empty one under the lock and processed
//! outside it, so submissions never wait on in-flight processing. Each
//! flushed group fans out one task per item behind a completion barrier.
//!
//! This is admission-time grouping only. The handler still sees one
//! request per invocation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::instrument::WithSubscriber;
use tracing::Instrument;

use super::context::{ContextError, RequestContext};
use super::error::DispatchError;
use super::executor;
use super::handler::RequestHandler;
use super::metrics::{DispatchCounters, DispatchMetrics};
use super::work::{Delivery, DispatchResult, WorkItem};
use super::{Dispatcher, Strategy};
use crate::protocol::Request;
use crate::shutdown::ShutdownCoordinator;
use crate::telemetry::{self, Logger};

const STRATEGY: Strategy = Strategy::AdmissionGroup;

/// Configuration for admission grouping.
#[derive(Debug, Clone)]
pub struct AdmissionGroupConfig {
    /// Flush as soon as this many calls are waiting.
    pub group_size: usize,
    /// Flush a non-empty group this long after its first call arrived.
    pub group_timeout: Duration,
    /// Drop items whose caller already gave up instead of running them.
    pub skip_cancelled: bool,
}

impl Default for AdmissionGroupConfig {
    fn default() -> Self {
        Self {
            group_size: 50,
            group_timeout: Duration::from_millis(10),
            skip_cancelled: false,
        }
    }
}

/// What caused a group to be flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Size,
    Timeout,
    Shutdown,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Timeout => "timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

struct GroupState {
    items: Vec<WorkItem>,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every flush so a late timer cannot flush a newer group.
    generation: u64,
    closed: bool,
}

impl GroupState {
    /// Swap out the live group and disarm its timer.
    fn take(&mut self, capacity: usize) -> Vec<WorkItem> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation += 1;
        std::mem::replace(&mut self.items, Vec::with_capacity(capacity))
    }
}

struct GroupInner {
    handler: Arc<dyn RequestHandler>,
    config: AdmissionGroupConfig,
    state: Mutex<GroupState>,
    counters: DispatchCounters,
    groups_flushed: AtomicU64,
    in_flight: TaskTracker,
    coordinator: ShutdownCoordinator,
    logger: Logger,
}

pub struct AdmissionGroupDispatcher {
    inner: Arc<GroupInner>,
}

impl AdmissionGroupDispatcher {
    /// Must be called within a Tokio runtime.
    pub fn new(handler: Arc<dyn RequestHandler>, config: AdmissionGroupConfig, logger: Logger) -> Self {
        let config = AdmissionGroupConfig { group_size: config.group_size.max(1), ..config };
        logger.in_scope(|| {
            tracing::info!(
                group_size = config.group_size,
                group_timeout_ms = config.group_timeout.as_millis() as u64,
                skip_cancelled = config.skip_cancelled,
                "admission group dispatcher started"
            )
        });
        let state = GroupState {
            items: Vec::with_capacity(config.group_size),
            timer: None,
            generation: 0,
            closed: false,
        };
        Self {
            inner: Arc::new(GroupInner {
                handler,
                config,
                state: Mutex::new(state),
                counters: DispatchCounters::new(),
                groups_flushed: AtomicU64::new(0),
                in_flight: TaskTracker::new(),
                coordinator: ShutdownCoordinator::new(),
                logger,
            }),
        }
    }

    pub fn config(&self) -> &AdmissionGroupConfig {
        &self.inner.config
    }

    pub async fn handle_request(&self, ctx: &RequestContext, request: Request) -> DispatchResult {
        let inner = &self.inner;
        inner.counters.record_request();
        telemetry::record_request(STRATEGY);
        let _active = inner.counters.admit();

        let (item, pending) = WorkItem::new(ctx.clone(), request);
        {
            let mut state = inner.state.lock();
            if state.closed {
                return Err(ContextError::Cancelled.into());
            }
            state.items.push(item);
            if state.items.len() >= inner.config.group_size {
                let items = state.take(inner.config.group_size);
                GroupInner::spawn_group(inner, items, FlushTrigger::Size);
            } else if state.items.len() == 1 {
                let generation = state.generation;
                state.timer = Some(GroupInner::arm_timer(inner, generation));
            }
        }

        pending.wait(ctx, inner.coordinator.token()).await
    }

    /// Close admission, flush the pending group, and wait for every
    /// in-flight group to pass its completion barrier.
    ///
    /// Calls arriving afterwards return [`ContextError::Cancelled`]. There is
    /// no timeout here; see [`Dispatcher::shutdown_with_timeout`].
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            state.closed = true;
            let pending = state.take(inner.config.group_size);
            if !pending.is_empty() {
                GroupInner::spawn_group(inner, pending, FlushTrigger::Shutdown);
            }
        }

        inner.in_flight.close();
        inner.in_flight.wait().await;
        inner.coordinator.initiate(None).await;
        inner.logger.in_scope(|| {
            tracing::info!(
                groups_flushed = inner.groups_flushed.load(Ordering::Relaxed),
                "admission group dispatcher stopped"
            )
        });
    }

    pub fn metrics(&self) -> DispatchMetrics {
        let inner = &self.inner;
        let queued = inner.state.lock().items.len();
        let size = inner.config.group_size;
        DispatchMetrics {
            groups_flushed: inner.groups_flushed.load(Ordering::Relaxed),
            ..DispatchMetrics::from_counters(STRATEGY, &inner.counters, size, size, queued)
        }
    }
}

impl GroupInner {
    fn arm_timer(inner: &Arc<Self>, generation: u64) -> JoinHandle<()> {
        let timeout = inner.config.group_timeout;
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            GroupInner::flush_expired(&inner, generation);
        })
    }

    fn flush_expired(inner: &Arc<Self>, generation: u64) {
        let mut state = inner.state.lock();
        if state.generation != generation || state.items.is_empty() {
            return;
        }
        // This task is the timer; drop its handle rather than aborting itself.
        state.timer = None;
        let items = state.take(inner.config.group_size);
        GroupInner::spawn_group(inner, items, FlushTrigger::Timeout);
    }

    /// Callers hold `state`, so a group taken from the accumulator is always
    /// tracked before `shutdown` can observe an empty accumulator.
    fn spawn_group(inner: &Arc<Self>, items: Vec<WorkItem>, trigger: FlushTrigger) {
        let span = inner.logger.in_scope(|| {
            tracing::debug_span!("admission_group", size = items.len(), trigger = trigger.as_str())
        });
        let task = Arc::clone(inner).process_group(items, trigger).instrument(span);
        inner.in_flight.spawn(inner.logger.attach(task));
    }

    async fn process_group(self: Arc<Self>, items: Vec<WorkItem>, trigger: FlushTrigger) {
        let size = items.len();
        let start = Instant::now();

        let executions: Vec<_> = items
            .into_iter()
            .map(|item| {
                let inner = Arc::clone(&self);
                tokio::spawn(
                    async move { inner.execute_item(item).await }
                        .in_current_span()
                        .with_current_subscriber(),
                )
            })
            .collect();

        // Completion barrier: every execution has returned.
        let mut abandoned = 0usize;
        for joined in join_all(executions).await {
            match joined {
                Ok(Delivery::Delivered) => {}
                Ok(Delivery::Abandoned) => abandoned += 1,
                Err(e) => tracing::warn!(error = %e, "group execution task ended abnormally"),
            }
        }

        self.groups_flushed.fetch_add(1, Ordering::Relaxed);
        telemetry::record_group_flush(size, trigger, start.elapsed());
        tracing::debug!(
            size,
            abandoned,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "admission group completed"
        );
    }

    async fn execute_item(&self, item: WorkItem) -> Delivery {
        if self.config.skip_cancelled {
            if let Some(reason) = item.ctx.err() {
                tracing::debug!(method = %item.request.method, %reason, "skipping abandoned item");
                return Delivery::Abandoned;
            }
        }
        executor::execute(STRATEGY, self.handler.as_ref(), item, self.coordinator.token()).await
    }
}

#[async_trait::async_trait]
impl Dispatcher for AdmissionGroupDispatcher {
    async fn handle_request(
        &self,
        ctx: &RequestContext,
        request: Request,
    ) -> Result<crate::protocol::Response, DispatchError> {
        AdmissionGroupDispatcher::handle_request(self, ctx, request).await
    }

    async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), DispatchError> {
        tokio::time::timeout(timeout, self.shutdown())
            .await
            .map_err(|_| ContextError::DeadlineExceeded.into())
    }

    fn metrics(&self) -> DispatchMetrics {
        AdmissionGroupDispatcher::metrics(self)
    }

    fn strategy(&self) -> Strategy {
        STRATEGY
    }
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
