//! `metrics` facade exports for the dispatch core.
//!
//! These are no-ops until the embedding process installs a recorder.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

use crate::dispatch::{FlushTrigger, Strategy};

pub fn record_request(strategy: Strategy) {
    counter!("dispatch_requests_total", "strategy" => strategy.as_str()).increment(1);
}

pub fn record_rejection(strategy: Strategy) {
    counter!("dispatch_rejected_total", "strategy" => strategy.as_str()).increment(1);
}

pub fn record_active(strategy: Strategy, active: u64) {
    gauge!("dispatch_active_requests", "strategy" => strategy.as_str()).set(active as f64);
}

/// Record one handler invocation.
pub fn record_execution(strategy: Strategy, latency: Duration, succeeded: bool) {
    histogram!("dispatch_execution_seconds", "strategy" => strategy.as_str())
        .record(latency.as_secs_f64());
    if !succeeded {
        counter!("dispatch_handler_failures_total", "strategy" => strategy.as_str()).increment(1);
    }
}

pub fn record_group_flush(size: usize, trigger: FlushTrigger, elapsed: Duration) {
    histogram!("dispatch_group_size", "trigger" => trigger.as_str()).record(size as f64);
    histogram!("dispatch_group_seconds", "trigger" => trigger.as_str())
        .record(elapsed.as_secs_f64());
}
