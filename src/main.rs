//! conn-dispatch entry point.
//!
//! ## CLI Subcommands
//!
//! - `conn-dispatch` or `conn-dispatch serve` - Run the echo server (default)
//! - `conn-dispatch config show` - Print effective configuration
//! - `conn-dispatch config defaults` - Print default configuration

use std::path::PathBuf;
use std::process::ExitCode;

use conn_dispatch::cli::{config_cmd, run_serve};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    match command {
        "serve" | "" => {
            let config_file = match parse_config_flag(&args[2.min(args.len())..]) {
                Ok(path) => path,
                Err(msg) => {
                    eprintln!("{}", msg);
                    print_command_help("serve");
                    return ExitCode::from(2u8);
                }
            };
            match run_serve(config_file.as_deref()).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Server error: {}", e);
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
            println!("conn-dispatch {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    let rest = &args[3.min(args.len())..];
                    let json = rest.iter().any(|a| a == "--json");
                    let filtered: Vec<String> =
                        rest.iter().filter(|a| *a != "--json").cloned().collect();
                    let config_file = match parse_config_flag(&filtered) {
                        Ok(path) => path,
                        Err(msg) => {
                            eprintln!("{}", msg);
                            print_command_help("config");
                            return ExitCode::from(2u8);
                        }
                    };
                    match config_cmd::run_show(config_file.as_deref(), json) {
                        Ok(()) => ExitCode::SUCCESS,
                        Err(e) => {
                            eprintln!("Configuration error: {}", e);
                            ExitCode::from(2u8)
                        }
                    }
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

/// Parse an optional `--config FILE` pair; anything else is an error.
fn parse_config_flag(args: &[String]) -> Result<Option<PathBuf>, String> {
    let mut config_file = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 < args.len() {
                    config_file = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    return Err("Missing value for --config".to_string());
                }
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }
    Ok(config_file)
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "conn-dispatch - Bounded connection dispatcher v{}

USAGE:
    conn-dispatch [COMMAND] [OPTIONS]

COMMANDS:
    serve        Run the echo server (default when no command given)
    config       Inspect configuration (show, defaults)
    version      Show version information
    help         Show this help message

OPTIONS:
    -h, --help     Show help for command
    -V, --version  Show version information

EXAMPLES:
    conn-dispatch                                  # Run the echo server
    conn-dispatch serve --config dispatch.toml     # Load settings from a file
    conn-dispatch config show --json               # Effective config as JSON
    conn-dispatch config defaults                  # Built-in defaults

ENVIRONMENT:
    CONN_DISPATCH_BIND                Listen address (default: 127.0.0.1:9911)
    CONN_DISPATCH_MAX_THREADS         Worker limit, 0 = pool capacity
    CONN_DISPATCH_MAX_QUEUED          Queue capacity
    CONN_DISPATCH_IDLE_TIMEOUT_MS     Worker idle timeout in milliseconds
    CONN_DISPATCH_THREAD_PRIORITY     low, normal, high, critical
    CONN_DISPATCH_RETAIN_IDLE_WORKER  Keep one worker alive when idle
    CONN_DISPATCH_POOL_THREADS        Thread pool capacity, 0 = CPU count
    CONN_DISPATCH_LOG_LEVEL           Log filter directive (default: info)
    CONN_DISPATCH_LOG_FORMAT          json or pretty
    CONN_DISPATCH_LOG_FILE            Append logs to this file instead of stderr

EXIT CODES:
    0  Success
    1  Failure
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "serve" => {
            eprintln!(
                "conn-dispatch serve - Run the echo server

USAGE:
    conn-dispatch serve [OPTIONS]

OPTIONS:
    --config FILE     Load configuration from a TOML file

DESCRIPTION:
    Binds the listen address and echoes every byte each client sends.
    Connections are queued and served by a bounded set of pooled workers;
    connections arriving while the queue is full are closed immediately.
    Ctrl-C stops accepting, discards queued connections and waits for
    running ones to finish.

EXAMPLES:
    conn-dispatch serve
    conn-dispatch serve --config /etc/conn-dispatch/dispatch.toml
"
            );
        }
        "config" => {
            eprintln!(
                "conn-dispatch config - Inspect configuration

USAGE:
    conn-dispatch config <SUBCOMMAND> [OPTIONS]

SUBCOMMANDS:
    show           Show effective configuration
    defaults       Show default configuration

OPTIONS:
    --config FILE  Configuration file path (show only)
    --json         Output in JSON format (show only)

EXAMPLES:
    conn-dispatch config show
    conn-dispatch config show --json --config dispatch.toml
    conn-dispatch config defaults
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'conn-dispatch help' for general usage.",
                command
            );
        }
    }
}
