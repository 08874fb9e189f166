//! Integration tests for the admission-group strategy.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use common::{ping, GatedHandler, SleepHandler};
use dispatch_core::dispatch::{AdmissionGroupConfig, AdmissionGroupDispatcher};
use dispatch_core::telemetry::Logger;
use dispatch_core::{RequestContext, RequestHandler};

fn group(handler: Arc<dyn RequestHandler>, size: usize, timeout: Duration) -> Arc<AdmissionGroupDispatcher> {
    Arc::new(AdmissionGroupDispatcher::new(
        handler,
        AdmissionGroupConfig { group_size: size, group_timeout: timeout, skip_cancelled: false },
        Logger::disabled(),
    ))
}

async fn run_calls(dispatcher: &Arc<AdmissionGroupDispatcher>, count: i64) -> Duration {
    let start = Instant::now();
    let calls: Vec<_> = (0..count)
        .map(|id| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.handle_request(&RequestContext::background(), ping(id)).await })
        })
        .collect();
    for handle in calls {
        assert!(handle.await.unwrap().is_ok());
    }
    start.elapsed()
}

#[tokio::test(start_paused = true)]
async fn test_partial_group_resolves_through_timer() {
    let timeout = Duration::from_millis(10);
    let dispatcher = group(SleepHandler::new(Duration::ZERO), 3, timeout);

    let elapsed = run_calls(&dispatcher, 2).await;
    assert!(elapsed >= timeout, "flushed early after {elapsed:?}");
    // One timer period, not a re-armed timer or the shutdown flush.
    assert!(elapsed < timeout + Duration::from_millis(5), "flushed late after {elapsed:?}");
    dispatcher.shutdown().await;
    assert_eq!(dispatcher.metrics().groups_flushed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_full_group_does_not_wait_for_timer() {
    let timeout = Duration::from_millis(10);
    let dispatcher = group(SleepHandler::new(Duration::ZERO), 3, timeout);

    let elapsed = run_calls(&dispatcher, 3).await;
    assert!(elapsed < timeout, "flushed after {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_overflow_starts_a_new_group() {
    let handler = SleepHandler::new(Duration::ZERO);
    let dispatcher = group(handler.clone(), 3, Duration::from_millis(10));

    // Two full groups by size plus one partial group by time.
    run_calls(&dispatcher, 7).await;
    dispatcher.shutdown().await;
    assert_eq!(dispatcher.metrics().groups_flushed, 3);
    assert_eq!(handler.calls(), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_item_does_not_delay_its_group_mates() {
    let gated = GatedHandler::closed();
    let dispatcher = group(gated.clone(), 2, Duration::from_secs(30));

    let stuck = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.handle_request(&RequestContext::background(), ping(1)).await })
    };
    let quick = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.handle_request(&RequestContext::background(), ping(2)).await })
    };
    gated.wait_for_entered(2).await;

    // Exactly one permit: one of the two finishes while the other is held.
    gated.release(1);
    let finished = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if stuck.is_finished() || quick.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(finished.is_ok());
    assert!(!(stuck.is_finished() && quick.is_finished()));

    gated.release(1);
    assert!(stuck.await.unwrap().is_ok());
    assert!(quick.await.unwrap().is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_waits_for_in_flight_group() {
    let gated = GatedHandler::closed();
    let dispatcher = group(gated.clone(), 1, Duration::from_secs(30));

    let call = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.handle_request(&RequestContext::background(), ping(1)).await })
    };
    gated.wait_for_entered(1).await;

    let shutdown = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.shutdown().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!shutdown.is_finished());

    gated.release(1);
    shutdown.await.unwrap();
    assert!(call.await.unwrap().is_ok());
}
