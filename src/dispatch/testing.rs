//! Scripted handler for unit tests.
//!
//! Behavior is driven by the request: `params.sleep_ms` delays the reply,
//! method `fail` returns a handler error, method `panic` panics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use super::{HandlerError, RequestContext, RequestHandler};
use crate::protocol::{Request, RequestId, Response};

#[derive(Default)]
pub(crate) struct ScriptedHandler {
    calls: AtomicUsize,
    completed: Mutex<Vec<RequestId>>,
}

impl ScriptedHandler {
    pub(crate) fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Ids in the order their handler invocations finished.
    pub(crate) fn completed(&self) -> Vec<RequestId> {
        self.completed.lock().clone()
    }
}

#[async_trait::async_trait]
impl RequestHandler for ScriptedHandler {
    async fn handle_request(
        &self,
        _ctx: &RequestContext,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let sleep_ms = request
            .params
            .as_ref()
            .and_then(|p| p.get("sleep_ms"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        }
        if let Some(id) = request.id.clone() {
            self.completed.lock().push(id);
        }

        match request.method.as_str() {
            "fail" => Err("scripted failure".into()),
            "panic" => panic!("scripted panic"),
            method => Ok(Response::success(request.id.clone(), json!({ "method": method }))),
        }
    }
}

pub(crate) fn call(id: i64) -> Request {
    Request::new(id, "tasks/get", None)
}

pub(crate) fn slow_call(id: i64, sleep_ms: u64) -> Request {
    Request::new(id, "tasks/get", Some(json!({ "sleep_ms": sleep_ms })))
}

pub(crate) fn as_handler(handler: &Arc<ScriptedHandler>) -> Arc<dyn RequestHandler> {
    handler.clone()
}
