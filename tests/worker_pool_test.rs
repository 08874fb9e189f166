//! Integration tests for the worker-pool strategy.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ping, GatedHandler, SleepHandler};
use dispatch_core::dispatch::{DispatchError, WorkerPoolConfig, WorkerPoolDispatcher};
use dispatch_core::protocol::INTERNAL_ERROR;
use dispatch_core::telemetry::Logger;
use dispatch_core::{Dispatcher, RequestContext, Strategy};

fn pool(handler: Arc<dyn dispatch_core::RequestHandler>, workers: usize, max: usize) -> Arc<WorkerPoolDispatcher> {
    Arc::new(WorkerPoolDispatcher::new(
        handler,
        WorkerPoolConfig { num_workers: workers, max_queue_size: max },
        Logger::disabled(),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_slot_rejects_concurrent_caller() {
    let handler = SleepHandler::new(Duration::from_millis(50));
    let dispatcher = pool(handler.clone(), 1, 1);

    let first = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.handle_request(&RequestContext::background(), ping(1)).await })
    };
    while dispatcher.metrics().active_requests == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let rejected = dispatcher
        .handle_request(&RequestContext::background(), ping(2))
        .await
        .unwrap_err();
    let rpc = rejected.to_rpc_error();
    assert_eq!(rpc.code, INTERNAL_ERROR);
    assert_eq!(rpc.message, "server at capacity");

    assert!(first.await.unwrap().is_ok());
    assert_eq!(handler.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_admission_bound_is_exact() {
    const MAX: usize = 6;
    let handler = GatedHandler::closed();
    let dispatcher = pool(handler.clone(), 2, MAX);

    let admitted: Vec<_> = (0..MAX as i64)
        .map(|id| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.handle_request(&RequestContext::background(), ping(id)).await })
        })
        .collect();
    // Both executors are busy and the rest are queued.
    handler.wait_for_entered(2).await;
    while dispatcher.metrics().active_requests < MAX as u64 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    for id in 100..110 {
        let err = dispatcher
            .handle_request(&RequestContext::background(), ping(id))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::CapacityExceeded { max, .. } if max == MAX as u64));
    }
    assert_eq!(dispatcher.metrics().rejected_requests, 10);

    handler.release(MAX);
    for handle in admitted {
        assert!(handle.await.unwrap().is_ok());
    }
    let metrics = dispatcher.metrics();
    assert_eq!(metrics.active_requests, 0);
    assert_eq!(metrics.total_requests, (MAX + 10) as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_while_queued_behind_busy_executor() {
    let handler = GatedHandler::closed();
    let dispatcher = pool(handler.clone(), 1, 4);

    let blocker = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.handle_request(&RequestContext::background(), ping(1)).await })
    };
    handler.wait_for_entered(1).await;

    let ctx = RequestContext::with_timeout(Duration::from_millis(30));
    let err = dispatcher.handle_request(&ctx, ping(2)).await.unwrap_err();
    assert!(err.is_deadline_exceeded());

    handler.release(2);
    assert!(blocker.await.unwrap().is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_second_shutdown_returns_immediately() {
    let dispatcher = pool(SleepHandler::new(Duration::ZERO), 2, 8);

    dispatcher.shutdown(Duration::from_secs(1)).await.unwrap();
    let again = tokio::time::timeout(Duration::from_millis(100), dispatcher.shutdown(Duration::from_secs(1)))
        .await
        .expect("second shutdown should not block");
    assert!(again.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_metrics_snapshot_serializes() {
    let dispatcher: Arc<dyn Dispatcher> = pool(SleepHandler::new(Duration::ZERO), 2, 8);
    dispatcher
        .handle_request(&RequestContext::background(), ping(1))
        .await
        .unwrap();

    let json = serde_json::to_value(dispatcher.metrics()).unwrap();
    assert_eq!(json["strategy"], "worker_pool");
    assert_eq!(json["total_requests"], 1);
    assert_eq!(json["queue_capacity"], 8);
    assert_eq!(dispatcher.strategy(), Strategy::WorkerPool);
    dispatcher.shutdown_with_timeout(Duration::from_secs(1)).await.unwrap();
}
