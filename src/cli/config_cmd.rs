//! Config CLI subcommands: show, defaults.
//!
//! These commands read configuration directly from environment variables
//! (or a file) without starting the server.

use std::path::Path;

use crate::config::{self, ConfigError, EffectiveConfig};

/// Print effective config to stdout, as `KEY=value` lines or JSON.
pub fn run_show(file: Option<&Path>, json: bool) -> Result<(), ConfigError> {
    let cfg = match file {
        Some(path) => config::load_file(path)?,
        None => config::load(),
    };
    let eff = cfg.effective_config();
    if json {
        match serde_json::to_string_pretty(&eff) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("Failed to render config: {e}"),
        }
    } else {
        print_config(&eff);
    }
    Ok(())
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    for (key, value) in config::defaults() {
        println!("{key}={value}");
    }
}

fn print_config(cfg: &EffectiveConfig) {
    println!("CONN_DISPATCH_BIND={}", cfg.bind);
    println!("CONN_DISPATCH_MAX_THREADS={}", cfg.max_threads);
    println!("CONN_DISPATCH_MAX_QUEUED={}", cfg.max_queued);
    println!("CONN_DISPATCH_IDLE_TIMEOUT_MS={}", cfg.idle_timeout_ms);
    println!("CONN_DISPATCH_THREAD_PRIORITY={}", cfg.thread_priority);
    println!("CONN_DISPATCH_RETAIN_IDLE_WORKER={}", cfg.retain_idle_worker);
    println!("CONN_DISPATCH_POOL_THREADS={}", cfg.pool_threads);
    println!("CONN_DISPATCH_LOG_LEVEL={}", cfg.log_level);
    println!("CONN_DISPATCH_LOG_FORMAT={}", cfg.log_format);
    println!("CONN_DISPATCH_LOG_FILE={}", cfg.log_file.as_deref().unwrap_or(""));
}
