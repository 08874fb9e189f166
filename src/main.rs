//! dispatch-core CLI entry point.
//!
//! ## CLI Subcommands
//!
//! - `dispatch-core-cli load` - Run synthetic load through the configured strategy
//! - `dispatch-core-cli config show|defaults|validate` - Inspect configuration

use std::process::ExitCode;

use dispatch_core::cli::{self, config_cmd};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "load" => exit_code(cli::run_load(&args).await),
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => exit_code(config_cmd::run_show(&args)),
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => exit_code(config_cmd::run_validate(&args)),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("dispatch-core {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "dispatch-core - concurrent request dispatch v{}

USAGE:
    dispatch-core-cli [COMMAND] [OPTIONS]

COMMANDS:
    load         Drive the configured strategy with synthetic traffic
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

ENVIRONMENT:
    DISPATCH_STRATEGY           worker_pool | admission_group | pipeline
    DISPATCH_NUM_WORKERS        Worker pool executors (default: 2 x CPUs)
    DISPATCH_MAX_QUEUE_SIZE     Worker pool admission bound (default: 1000)
    DISPATCH_GROUP_SIZE         Admission group size trigger (default: 50)
    DISPATCH_GROUP_TIMEOUT_MS   Admission group time trigger (default: 10)
    DISPATCH_SKIP_CANCELLED     Drop abandoned group items (default: false)
    DISPATCH_PIPELINE_WORKERS   Pipeline executors (default: CPUs)
    DISPATCH_SHUTDOWN_TIMEOUT   Shutdown timeout in seconds (default: 30)
    DISPATCH_LOG_LEVEL          Log filter (default: info)
    DISPATCH_LOG_FORMAT         json | pretty (default: json)

EXIT CODES:
    0  Success
    1  Failure / warnings found
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "load" => {
            eprintln!(
                "dispatch-core-cli load - Synthetic load run

USAGE:
    dispatch-core-cli load [OPTIONS]

OPTIONS:
    --requests N       Calls to issue (default: 1000)
    --concurrency N    Calls in flight at once (default: 64)
    --latency-ms MS    Base handler latency (default: 2)
    --jitter-ms MS     Random extra latency, uniform (default: 3)
    --error-rate P     Probability a call fails in the handler (default: 0)
    --strategy NAME    Override DISPATCH_STRATEGY
    --file PATH        Load configuration from a TOML file

DESCRIPTION:
    Prints a JSON report with the outcome tally and the dispatcher's
    metrics snapshot. Ctrl-C cancels outstanding calls.

EXAMPLES:
    dispatch-core-cli load --requests 10000 --concurrency 256
    dispatch-core-cli load --strategy admission_group --jitter-ms 0
"
            );
        }
        "config" => {
            eprintln!(
                "dispatch-core-cli config - Inspect configuration

USAGE:
    dispatch-core-cli config <SUBCOMMAND> [OPTIONS]

SUBCOMMANDS:
    show           Show effective configuration
    validate       Check configuration for misconfigurations
    defaults       Show default configuration

OPTIONS:
    --file PATH    Read a TOML file instead of the environment
    --json         (show) Print JSON instead of KEY=value lines

EXAMPLES:
    dispatch-core-cli config show --json
    dispatch-core-cli config validate --file dispatch.toml
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'dispatch-core-cli help' for general usage.",
                command
            );
        }
    }
}
