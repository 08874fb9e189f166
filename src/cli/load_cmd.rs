//! `load` subcommand: drive a dispatcher with synthetic traffic.
//!
//! Runs the configured strategy against a handler that sleeps for a base
//! latency plus random jitter, then prints a JSON report with the outcome
//! tally and the dispatcher's metrics snapshot. Ctrl-C cancels outstanding
//! calls and still prints the report.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{future, stream, StreamExt};
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::dispatch::{DispatchError, DispatchMetrics, HandlerError};
use crate::protocol::{Request, Response};
use crate::telemetry::{init_logging, Logger};
use crate::{RequestContext, RequestHandler, Runtime, Strategy};

/// Load run parameters.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub requests: usize,
    pub concurrency: usize,
    pub latency: Duration,
    pub jitter: Duration,
    /// Probability in `[0, 1]` that a call fails in the handler.
    pub error_rate: f64,
    /// Overrides the configured strategy.
    pub strategy: Option<Strategy>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            requests: 1000,
            concurrency: 64,
            latency: Duration::from_millis(2),
            jitter: Duration::from_millis(3),
            error_rate: 0.0,
            strategy: None,
        }
    }
}

impl LoadOptions {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        let mut opts = Self::default();
        if let Some(v) = super::flag_value(args, "--requests") {
            opts.requests = parse(v, "--requests")?;
        }
        if let Some(v) = super::flag_value(args, "--concurrency") {
            opts.concurrency = parse::<usize>(v, "--concurrency")?.max(1);
        }
        if let Some(v) = super::flag_value(args, "--latency-ms") {
            opts.latency = Duration::from_millis(parse(v, "--latency-ms")?);
        }
        if let Some(v) = super::flag_value(args, "--jitter-ms") {
            opts.jitter = Duration::from_millis(parse(v, "--jitter-ms")?);
        }
        if let Some(v) = super::flag_value(args, "--error-rate") {
            let rate: f64 = parse(v, "--error-rate")?;
            if !(0.0..=1.0).contains(&rate) {
                return Err(format!("--error-rate must be within [0, 1], got {rate}"));
            }
            opts.error_rate = rate;
        }
        if let Some(v) = super::flag_value(args, "--strategy") {
            opts.strategy = Some(v.parse().map_err(|e| format!("{e}"))?);
        }
        Ok(opts)
    }
}

fn parse<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T, String> {
    value.parse().map_err(|_| format!("invalid value for {flag}: {value}"))
}

/// Handler that sleeps and sometimes fails.
#[derive(Debug, Clone)]
pub struct SyntheticHandler {
    latency: Duration,
    jitter: Duration,
    error_rate: f64,
}

impl From<&LoadOptions> for SyntheticHandler {
    fn from(opts: &LoadOptions) -> Self {
        Self { latency: opts.latency, jitter: opts.jitter, error_rate: opts.error_rate }
    }
}

#[async_trait::async_trait]
impl RequestHandler for SyntheticHandler {
    async fn handle_request(
        &self,
        ctx: &RequestContext,
        request: &Request,
    ) -> Result<Response, HandlerError> {
        let (delay, fail) = {
            let mut rng = rand::thread_rng();
            let jitter_ms = rng.gen_range(0..=self.jitter.as_millis() as u64);
            (self.latency + Duration::from_millis(jitter_ms), rng.gen_bool(self.error_rate))
        };

        tokio::select! {
            err = ctx.done() => return Err(err.into()),
            () = tokio::time::sleep(delay) => {}
        }
        if fail {
            return Err("synthetic failure".into());
        }
        Ok(Response::success(
            request.id.clone(),
            json!({ "method": request.method, "delay_ms": delay.as_millis() as u64 }),
        ))
    }
}

/// Outcome of one load run.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub strategy: Strategy,
    pub requests: usize,
    pub succeeded: usize,
    pub rejected: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
    pub throughput_rps: f64,
    pub metrics: DispatchMetrics,
}

/// Issue `opts.requests` calls, at most `opts.concurrency` at a time.
///
/// Stops issuing new calls once `cancel` fires; calls in flight observe it
/// through their contexts.
pub async fn execute(runtime: &Runtime, opts: &LoadOptions, cancel: &CancellationToken) -> LoadReport {
    let dispatcher = runtime.dispatcher();
    let start = Instant::now();

    let outcomes: Vec<Result<Response, DispatchError>> = stream::iter(0..opts.requests)
        .take_while(|_| future::ready(!cancel.is_cancelled()))
        .map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            let ctx = RequestContext::from_token(cancel.child_token());
            async move {
                let request = Request::new(i as i64, "load/ping", None);
                dispatcher.handle_request(&ctx, request).await
            }
        })
        .buffer_unordered(opts.concurrency.max(1))
        .collect()
        .await;

    let elapsed = start.elapsed();
    let mut report = LoadReport {
        strategy: runtime.strategy(),
        requests: outcomes.len(),
        succeeded: 0,
        rejected: 0,
        cancelled: 0,
        failed: 0,
        elapsed_ms: elapsed.as_millis() as u64,
        throughput_rps: 0.0,
        metrics: runtime.metrics(),
    };
    for outcome in &outcomes {
        match outcome {
            Ok(_) => report.succeeded += 1,
            Err(DispatchError::CapacityExceeded { .. }) => report.rejected += 1,
            Err(e) if e.is_cancelled() || e.is_deadline_exceeded() => report.cancelled += 1,
            Err(_) => report.failed += 1,
        }
    }
    if elapsed > Duration::ZERO {
        report.throughput_rps = report.succeeded as f64 / elapsed.as_secs_f64();
    }
    report
}

/// Run the `load` command. Returns the process exit code.
pub async fn run_load(args: &[String]) -> i32 {
    let opts = match LoadOptions::from_args(args) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return 2;
        }
    };
    let mut cfg = match super::load_config(args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return 2;
        }
    };
    if let Some(strategy) = opts.strategy {
        cfg.runtime.strategy = strategy;
    }
    if let Err(e) = init_logging(&cfg.log) {
        eprintln!("WARNING: logging not initialized: {e}");
    }

    let handler = Arc::new(SyntheticHandler::from(&opts));
    let runtime = Runtime::new(handler, cfg.runtime, Logger::current());

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling outstanding calls");
                cancel.cancel();
            }
        })
    };

    let report = execute(&runtime, &opts, &cancel).await;
    interrupt.abort();
    let shutdown = runtime.shutdown().await;

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("ERROR: {e}");
            return 1;
        }
    }
    match shutdown {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("WARNING: shutdown did not complete: {e}");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeConfig;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_options_parse() {
        let opts = LoadOptions::from_args(&args(&[
            "load",
            "--requests",
            "20",
            "--concurrency",
            "0",
            "--strategy",
            "pipeline",
        ]))
        .unwrap();
        assert_eq!(opts.requests, 20);
        assert_eq!(opts.concurrency, 1);
        assert_eq!(opts.strategy, Some(Strategy::Pipeline));
    }

    #[test]
    fn test_options_reject_bad_error_rate() {
        assert!(LoadOptions::from_args(&args(&["load", "--error-rate", "1.5"])).is_err());
        assert!(LoadOptions::from_args(&args(&["load", "--requests", "many"])).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_execute_counts_every_call() {
        let opts = LoadOptions {
            requests: 40,
            concurrency: 8,
            latency: Duration::from_millis(1),
            jitter: Duration::from_millis(1),
            error_rate: 0.0,
            strategy: None,
        };
        let config = RuntimeConfig { strategy: Strategy::Pipeline, ..Default::default() };
        let runtime = Runtime::new(
            Arc::new(SyntheticHandler::from(&opts)),
            config,
            Logger::disabled(),
        );

        let report = execute(&runtime, &opts, &CancellationToken::new()).await;
        assert_eq!(report.requests, 40);
        assert_eq!(report.succeeded, 40);
        assert_eq!(report.metrics.total_requests, 40);
        runtime.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_execute_tallies_handler_failures() {
        let opts = LoadOptions {
            requests: 10,
            concurrency: 4,
            latency: Duration::ZERO,
            jitter: Duration::ZERO,
            error_rate: 1.0,
            strategy: None,
        };
        let runtime = Runtime::new(
            Arc::new(SyntheticHandler::from(&opts)),
            RuntimeConfig::default(),
            Logger::disabled(),
        );

        let report = execute(&runtime, &opts, &CancellationToken::new()).await;
        assert_eq!(report.failed, 10);
        assert_eq!(report.succeeded, 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_issues_nothing() {
        let opts = LoadOptions { requests: 100, ..Default::default() };
        let runtime = Runtime::new(
            Arc::new(SyntheticHandler::from(&opts)),
            RuntimeConfig::default(),
            Logger::disabled(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = execute(&runtime, &opts, &cancel).await;
        assert_eq!(report.requests, 0);
    }
}
