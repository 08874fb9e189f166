//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands only read configuration; nothing is started.

use crate::config::{self, EffectiveConfig, EnvConfig};

/// Print effective config to stdout, as `KEY=value` lines or JSON.
///
/// Returns 0 on success, 2 if the configuration could not be loaded.
pub fn run_show(args: &[String]) -> i32 {
    let cfg = match super::load_config(args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return 2;
        }
    };
    let effective = cfg.effective_config();
    if super::has_flag(args, "--json") {
        match serde_json::to_string_pretty(&effective) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("ERROR: {e}");
                return 1;
            }
        }
    } else {
        print_config(&effective);
    }
    0
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    print_config(&config::load_with(|_| None).effective_config());
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found, 2 if the configuration
/// could not be loaded at all.
pub fn run_validate(args: &[String]) -> i32 {
    let cfg = match super::load_config(args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return 2;
        }
    };

    let warnings = validate(&cfg);
    for warning in &warnings {
        eprintln!("WARNING: {warning}");
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

/// Everything suspicious about `cfg`, including values replaced by defaults.
pub fn validate(cfg: &EnvConfig) -> Vec<String> {
    let mut warnings = cfg.warnings.clone();
    let eff = cfg.effective_config();

    if eff.max_queue_size < eff.num_workers {
        warnings.push(format!(
            "DISPATCH_MAX_QUEUE_SIZE ({}) < DISPATCH_NUM_WORKERS ({}); some executors can never be busy",
            eff.max_queue_size, eff.num_workers
        ));
    }
    if eff.group_timeout_ms >= eff.shutdown_timeout_secs.saturating_mul(1000) {
        warnings.push(format!(
            "DISPATCH_GROUP_TIMEOUT_MS ({}) is not below DISPATCH_SHUTDOWN_TIMEOUT ({}s)",
            eff.group_timeout_ms, eff.shutdown_timeout_secs
        ));
    }
    if let Err(e) = tracing_subscriber::EnvFilter::try_new(&eff.log_level) {
        warnings.push(format!("DISPATCH_LOG_LEVEL ({}) is not a valid filter: {e}", eff.log_level));
    }
    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    for (key, value) in cfg.env_pairs() {
        println!("{key}={value}");
    }
}
