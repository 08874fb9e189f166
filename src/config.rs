//! Runtime configuration loading from environment variables or a TOML file.
//!
//! Environment values are read from `DISPATCH_*` variables with sensible
//! defaults. Invalid values fall back to defaults without crashing; each
//! fallback is recorded in [`EnvConfig::warnings`] so `config validate` can
//! surface it. The TOML form is strict: a malformed file is an error.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `DISPATCH_STRATEGY` | worker_pool | `worker_pool`, `admission_group` or `pipeline` |
//! | `DISPATCH_NUM_WORKERS` | 2 x CPUs | Worker pool executors |
//! | `DISPATCH_MAX_QUEUE_SIZE` | 1000 | Worker pool admission bound |
//! | `DISPATCH_GROUP_SIZE` | 50 | Admission group size flush trigger |
//! | `DISPATCH_GROUP_TIMEOUT_MS` | 10 | Admission group time flush trigger |
//! | `DISPATCH_SKIP_CANCELLED` | false | Drop abandoned group items before running them |
//! | `DISPATCH_PIPELINE_WORKERS` | CPUs | Pipeline executors |
//! | `DISPATCH_SHUTDOWN_TIMEOUT` | 30 | Graceful shutdown timeout (secs) |
//! | `DISPATCH_LOG_LEVEL` | info | Log filter directive |
//! | `DISPATCH_LOG_FORMAT` | json | `json` or `pretty` |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatch::{AdmissionGroupConfig, PipelineConfig, Strategy, WorkerPoolConfig};
use crate::telemetry::{LogConfig, LogFormat};
use crate::RuntimeConfig;

const DEFAULT_SHUTDOWN_SECS: u64 = 30;
const MAX_WORKERS: usize = 4096;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Effective runtime configuration summary (serializable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveConfig {
    pub strategy: Strategy,
    pub num_workers: usize,
    pub max_queue_size: usize,
    pub group_size: usize,
    pub group_timeout_ms: u64,
    pub skip_cancelled: bool,
    pub pipeline_workers: usize,
    pub pipeline_queue_capacity: usize,
    pub shutdown_timeout_secs: u64,
    pub log_level: String,
    pub log_format: String,
}

impl EffectiveConfig {
    /// Values keyed by the environment variable that sets them.
    pub fn env_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("DISPATCH_STRATEGY", self.strategy.to_string()),
            ("DISPATCH_NUM_WORKERS", self.num_workers.to_string()),
            ("DISPATCH_MAX_QUEUE_SIZE", self.max_queue_size.to_string()),
            ("DISPATCH_GROUP_SIZE", self.group_size.to_string()),
            ("DISPATCH_GROUP_TIMEOUT_MS", self.group_timeout_ms.to_string()),
            ("DISPATCH_SKIP_CANCELLED", self.skip_cancelled.to_string()),
            ("DISPATCH_PIPELINE_WORKERS", self.pipeline_workers.to_string()),
            ("DISPATCH_SHUTDOWN_TIMEOUT", self.shutdown_timeout_secs.to_string()),
            ("DISPATCH_LOG_LEVEL", self.log_level.clone()),
            ("DISPATCH_LOG_FORMAT", self.log_format.clone()),
        ]
    }
}

/// All runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub runtime: RuntimeConfig,
    pub log: LogConfig,
    /// Values that were present but unusable, replaced by defaults.
    pub warnings: Vec<String>,
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        let rt = &self.runtime;
        EffectiveConfig {
            strategy: rt.strategy,
            num_workers: rt.worker_pool.num_workers,
            max_queue_size: rt.worker_pool.max_queue_size,
            group_size: rt.group.group_size,
            group_timeout_ms: rt.group.group_timeout.as_millis() as u64,
            skip_cancelled: rt.group.skip_cancelled,
            pipeline_workers: rt.pipeline.workers,
            pipeline_queue_capacity: rt.pipeline.queue_capacity(),
            shutdown_timeout_secs: rt.shutdown_timeout.as_secs(),
            log_level: self.log.level.clone(),
            log_format: self.log.format.as_str().to_string(),
        }
    }
}

/// Reads variables through an injected lookup, remembering bad values.
struct Vars<F> {
    lookup: F,
    warnings: Vec<String>,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn parse<T: FromStr>(&mut self, key: &str, default: T) -> T {
        match (self.lookup)(key) {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(value) => value,
                Err(_) => {
                    self.warnings.push(format!("{key}={raw:?} is invalid, using default"));
                    default
                }
            },
            None => default,
        }
    }

    fn flag(&mut self, key: &str, default: bool) -> bool {
        match (self.lookup)(key) {
            Some(raw) => match parse_flag(&raw) {
                Some(value) => value,
                None => {
                    self.warnings.push(format!("{key}={raw:?} is not a boolean, using default"));
                    default
                }
            },
            None => default,
        }
    }

    fn string(&self, key: &str, default: &str) -> String {
        (self.lookup)(key)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn clamp_workers(n: usize) -> usize {
    n.clamp(1, MAX_WORKERS)
}

/// Load worker pool configuration from environment.
fn load_worker_pool<F: Fn(&str) -> Option<String>>(vars: &mut Vars<F>) -> WorkerPoolConfig {
    let defaults = WorkerPoolConfig::default();
    let num_workers = vars.parse("DISPATCH_NUM_WORKERS", defaults.num_workers);
    let max_queue_size = vars.parse("DISPATCH_MAX_QUEUE_SIZE", defaults.max_queue_size);
    WorkerPoolConfig {
        num_workers: clamp_workers(num_workers),
        max_queue_size: max_queue_size.max(1),
    }
}

/// Load admission group configuration from environment.
fn load_group<F: Fn(&str) -> Option<String>>(vars: &mut Vars<F>) -> AdmissionGroupConfig {
    let defaults = AdmissionGroupConfig::default();
    let group_size = vars.parse("DISPATCH_GROUP_SIZE", defaults.group_size);
    let timeout_ms = vars.parse(
        "DISPATCH_GROUP_TIMEOUT_MS",
        defaults.group_timeout.as_millis() as u64,
    );
    let skip_cancelled = vars.flag("DISPATCH_SKIP_CANCELLED", defaults.skip_cancelled);
    AdmissionGroupConfig {
        group_size: group_size.max(1),
        group_timeout: Duration::from_millis(timeout_ms.max(1)),
        skip_cancelled,
    }
}

/// Load pipeline configuration from environment.
fn load_pipeline<F: Fn(&str) -> Option<String>>(vars: &mut Vars<F>) -> PipelineConfig {
    let workers = vars.parse("DISPATCH_PIPELINE_WORKERS", PipelineConfig::default().workers);
    PipelineConfig { workers: clamp_workers(workers) }
}

fn load_log<F: Fn(&str) -> Option<String>>(vars: &mut Vars<F>) -> LogConfig {
    let level = vars.string("DISPATCH_LOG_LEVEL", "info");
    let format = vars.parse("DISPATCH_LOG_FORMAT", LogFormat::default());
    LogConfig { format, level, output_path: None }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    load_with(|key| std::env::var(key).ok())
}

/// Load configuration through `lookup` instead of the process environment.
pub fn load_with<F: Fn(&str) -> Option<String>>(lookup: F) -> EnvConfig {
    let mut vars = Vars { lookup, warnings: Vec::new() };

    let strategy = vars.parse("DISPATCH_STRATEGY", Strategy::default());
    let shutdown_secs = vars.parse("DISPATCH_SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_SECS);
    let runtime = RuntimeConfig {
        strategy,
        worker_pool: load_worker_pool(&mut vars),
        group: load_group(&mut vars),
        pipeline: load_pipeline(&mut vars),
        shutdown_timeout: Duration::from_secs(shutdown_secs.max(1)),
    };
    let log = load_log(&mut vars);

    EnvConfig { runtime, log, warnings: vars.warnings }
}

/// On-disk configuration. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    strategy: Option<String>,
    shutdown_timeout_secs: Option<u64>,
    worker_pool: WorkerPoolSection,
    group: GroupSection,
    pipeline: PipelineSection,
    log: LogSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct WorkerPoolSection {
    num_workers: Option<usize>,
    max_queue_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct GroupSection {
    size: Option<usize>,
    timeout_ms: Option<u64>,
    skip_cancelled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PipelineSection {
    workers: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LogSection {
    level: Option<String>,
    format: Option<String>,
    output_path: Option<PathBuf>,
}

/// Parse a TOML document. Omitted keys take their defaults.
pub fn from_toml_str(source: &str) -> Result<EnvConfig, ConfigError> {
    let file: FileConfig = toml::from_str(source)?;
    let mut cfg = EnvConfig::default();
    let rt = &mut cfg.runtime;

    if let Some(raw) = file.strategy {
        rt.strategy = raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key: "strategy", value: raw })?;
    }
    if let Some(secs) = file.shutdown_timeout_secs {
        rt.shutdown_timeout = Duration::from_secs(secs.max(1));
    }

    if let Some(n) = file.worker_pool.num_workers {
        rt.worker_pool.num_workers = clamp_workers(n);
    }
    if let Some(n) = file.worker_pool.max_queue_size {
        rt.worker_pool.max_queue_size = n.max(1);
    }

    if let Some(n) = file.group.size {
        rt.group.group_size = n.max(1);
    }
    if let Some(ms) = file.group.timeout_ms {
        rt.group.group_timeout = Duration::from_millis(ms.max(1));
    }
    if let Some(skip) = file.group.skip_cancelled {
        rt.group.skip_cancelled = skip;
    }

    if let Some(n) = file.pipeline.workers {
        rt.pipeline.workers = clamp_workers(n);
    }

    if let Some(level) = file.log.level {
        cfg.log.level = level;
    }
    if let Some(raw) = file.log.format {
        cfg.log.format = raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key: "log.format", value: raw })?;
    }
    cfg.log.output_path = file.log.output_path;

    Ok(cfg)
}

/// Read and parse a TOML configuration file.
pub fn load_file(path: &Path) -> Result<EnvConfig, ConfigError> {
    let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_toml_str(&source)
}
