//! CLI module for dispatch-core commands.
//!
//! ## Usage
//!
//! ```bash
//! dispatch-core-cli load --requests 5000 --concurrency 128   # synthetic load run
//! dispatch-core-cli config show                              # effective configuration
//! dispatch-core-cli config validate --file dispatch.toml
//! ```

pub mod config_cmd;
pub mod load_cmd;

use std::path::Path;

use crate::config::{self, ConfigError, EnvConfig};

pub use config_cmd::{run_defaults, run_show, run_validate};
pub use load_cmd::{run_load, LoadOptions, LoadReport};

/// Value following `name` in `args`, if present.
pub fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

pub fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

/// Configuration from `--file PATH` when given, otherwise from the environment.
pub fn load_config(args: &[String]) -> Result<EnvConfig, ConfigError> {
    match flag_value(args, "--file") {
        Some(path) => config::load_file(Path::new(path)),
        None => Ok(config::load()),
    }
}
