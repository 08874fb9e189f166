//! Executor loop shared by the worker-pool and pipeline strategies.
//!
//! N executor tasks pull from one bounded queue. Each dequeues an item,
//! invokes the handler with the item's own context, and offers the result
//! back to the caller. Executors stop dequeuing once shutdown is signalled;
//! the item in hand is always finished first.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::handler::RequestHandler;
use super::work::{invoke, Delivery, WorkItem};
use super::Strategy;
use crate::telemetry::{self, ExecutorSpan, Logger, RequestSpan, SpanExt};

/// Receiving end shared by every executor of one dispatcher.
pub(crate) type SharedQueue = Arc<Mutex<mpsc::Receiver<WorkItem>>>;

pub(crate) fn work_queue(capacity: usize) -> (mpsc::Sender<WorkItem>, SharedQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, Arc::new(Mutex::new(rx)))
}

/// Spawn `count` executors. Must be called within a Tokio runtime.
pub(crate) fn spawn_executors(
    count: usize,
    strategy: Strategy,
    queue: &SharedQueue,
    handler: &Arc<dyn RequestHandler>,
    shutdown: &CancellationToken,
    logger: &Logger,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|id| {
            let span = logger.in_scope(|| ExecutorSpan::new(strategy, id));
            let task = executor_loop(
                strategy,
                Arc::clone(queue),
                Arc::clone(handler),
                shutdown.clone(),
            );
            tokio::spawn(logger.attach(task.instrument(span)))
        })
        .collect()
}

async fn executor_loop(
    strategy: Strategy,
    queue: SharedQueue,
    handler: Arc<dyn RequestHandler>,
    shutdown: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                tracing::debug!("executor: shutdown signal received");
                break;
            }
            item = next_item(&queue) => match item {
                Some(item) => item,
                None => break,
            },
        };
        execute(strategy, handler.as_ref(), item, &shutdown).await;
    }
}

async fn next_item(queue: &SharedQueue) -> Option<WorkItem> {
    queue.lock().await.recv().await
}

/// Run one item to completion and offer its result.
pub(crate) async fn execute(
    strategy: Strategy,
    handler: &dyn RequestHandler,
    item: WorkItem,
    shutdown: &CancellationToken,
) -> Delivery {
    let request_id = item.request.id.as_ref().map(ToString::to_string).unwrap_or_default();
    let span = RequestSpan::new(strategy, &request_id, &item.request.method);

    let start = Instant::now();
    let result = invoke(handler, &item.ctx, &item.request).instrument(span.clone()).await;
    span.record_result(&result);
    telemetry::record_execution(strategy, start.elapsed(), result.is_ok());

    let delivery = item.deliver(result, shutdown);
    if delivery == Delivery::Abandoned {
        tracing::debug!(parent: &span, "result abandoned by caller");
    }
    delivery
}
