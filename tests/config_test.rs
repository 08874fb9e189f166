//! Configuration file loading.

use std::io::Write;
use std::time::Duration;

use dispatch_core::config::{self, ConfigError};
use dispatch_core::telemetry::LogFormat;
use dispatch_core::Strategy;

#[test]
fn test_load_file_applies_every_section() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
strategy = "pipeline"
shutdown_timeout_secs = 12

[worker_pool]
num_workers = 3
max_queue_size = 40

[group]
size = 16
timeout_ms = 4
skip_cancelled = true

[pipeline]
workers = 6

[log]
level = "debug"
format = "pretty"
"#
    )
    .unwrap();

    let cfg = config::load_file(file.path()).unwrap();
    let rt = &cfg.runtime;
    assert_eq!(rt.strategy, Strategy::Pipeline);
    assert_eq!(rt.shutdown_timeout, Duration::from_secs(12));
    assert_eq!(rt.worker_pool.num_workers, 3);
    assert_eq!(rt.worker_pool.max_queue_size, 40);
    assert_eq!(rt.group.group_size, 16);
    assert_eq!(rt.group.group_timeout, Duration::from_millis(4));
    assert!(rt.group.skip_cancelled);
    assert_eq!(rt.pipeline.workers, 6);
    assert_eq!(cfg.log.level, "debug");
    assert_eq!(cfg.log.format, LogFormat::Pretty);
}

#[test]
fn test_empty_file_yields_defaults() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let from_file = config::load_file(file.path()).unwrap().effective_config();
    let defaults = config::load_with(|_| None).effective_config();
    assert_eq!(from_file, defaults);
}

#[test]
fn test_malformed_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "strategy = ").unwrap();
    assert!(matches!(config::load_file(file.path()), Err(ConfigError::Parse(_))));
}

#[test]
fn test_effective_config_serializes() {
    let eff = config::load_with(|key: &str| (key == "DISPATCH_STRATEGY").then(|| "group".to_string()))
        .effective_config();
    let json = serde_json::to_value(&eff).unwrap();
    assert_eq!(json["strategy"], "admission_group");
    assert_eq!(json["group_size"], 50);
}
