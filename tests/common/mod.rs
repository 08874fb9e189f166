//! Handlers shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Semaphore;

use dispatch_core::dispatch::HandlerError;
use dispatch_core::protocol::{Request, Response};
use dispatch_core::{RequestContext, RequestHandler};

/// Replies only once the test opens the gate, one permit per call.
pub struct GatedHandler {
    gate: Semaphore,
    entered: AtomicUsize,
}

impl GatedHandler {
    pub fn closed() -> Arc<Self> {
        Arc::new(Self { gate: Semaphore::new(0), entered: AtomicUsize::new(0) })
    }

    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    /// Calls that have reached the handler so far.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub async fn wait_for_entered(&self, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.entered() < expected {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("handler was never entered");
    }
}

#[async_trait::async_trait]
impl RequestHandler for GatedHandler {
    async fn handle_request(
        &self,
        _ctx: &RequestContext,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let permit = self.gate.acquire().await?;
        permit.forget();
        Ok(Response::success(request.id.clone(), json!({ "method": request.method })))
    }
}

/// Replies after a fixed delay and counts invocations.
pub struct SleepHandler {
    delay: Duration,
    calls: AtomicUsize,
}

impl SleepHandler {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay, calls: AtomicUsize::new(0) })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RequestHandler for SleepHandler {
    async fn handle_request(
        &self,
        _ctx: &RequestContext,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Response::success(request.id.clone(), json!("ok")))
    }
}

pub fn ping(id: i64) -> Request {
    Request::new(id, "ping", None)
}
