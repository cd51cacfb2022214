//! Runtime configuration loading from environment variables or a TOML file.
//!
//! All configuration values are loaded from `CONN_DISPATCH_*` environment
//! variables with sensible defaults. Invalid values fall back to defaults
//! without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `CONN_DISPATCH_BIND` | 127.0.0.1:9911 | Listen address |
//! | `CONN_DISPATCH_MAX_THREADS` | 0 | Max worker threads (0 = pool capacity) |
//! | `CONN_DISPATCH_MAX_QUEUED` | 64 | Max queued connections |
//! | `CONN_DISPATCH_IDLE_TIMEOUT_MS` | 10000 | Worker idle timeout (ms) |
//! | `CONN_DISPATCH_THREAD_PRIORITY` | normal | low / normal / high / critical |
//! | `CONN_DISPATCH_RETAIN_IDLE_WORKER` | true | Keep one idle worker alive |
//! | `CONN_DISPATCH_POOL_THREADS` | 0 | Thread pool capacity (0 = CPU count) |
//! | `CONN_DISPATCH_LOG_LEVEL` | info | Log filter directive |
//! | `CONN_DISPATCH_LOG_FORMAT` | json | json / pretty |
//! | `CONN_DISPATCH_LOG_FILE` | (stderr) | Append logs to this file |

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatcher::DispatcherParams;
use crate::pool::{TaskPriority, ThreadPoolConfig};
use crate::telemetry::{LogConfig, LogFormat};

const DEFAULT_BIND: &str = "127.0.0.1:9911";
const DEFAULT_MAX_QUEUED: usize = 64;
const DEFAULT_IDLE_TIMEOUT_MS: u64 = 10_000;

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid bind address: {0}")]
    BindAddress(String),
    #[error("Invalid log format: {0} (expected json or pretty)")]
    LogFormat(String),
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub bind: String,
    pub max_threads: usize,
    pub max_queued: usize,
    pub idle_timeout_ms: u64,
    pub thread_priority: TaskPriority,
    pub retain_idle_worker: bool,
    pub pool_threads: usize,
    pub log_level: String,
    pub log_format: String,
    pub log_file: Option<String>,
}

/// All configuration for the server process.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub bind: SocketAddr,
    pub dispatcher: DispatcherParams,
    pub pool: ThreadPoolConfig,
    pub logging: LogConfig,
}

/// On-disk shape: every key optional, same names as the env vars.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    bind: Option<String>,
    max_threads: Option<usize>,
    max_queued: Option<usize>,
    idle_timeout_ms: Option<u64>,
    thread_priority: Option<TaskPriority>,
    retain_idle_worker: Option<bool>,
    pool_threads: Option<usize>,
    log_level: Option<String>,
    log_format: Option<String>,
    log_file: Option<PathBuf>,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a boolean env var (`true/false/1/0/yes/no`).
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9911))
}

fn parse_bind(value: &str) -> Option<SocketAddr> {
    value.trim().parse().ok()
}

/// Apply floors shared by env and file loading.
fn dispatcher_params(
    max_threads: usize,
    max_queued: usize,
    idle_timeout_ms: u64,
    priority: TaskPriority,
    retain_idle_worker: bool,
) -> DispatcherParams {
    DispatcherParams::new(
        max_threads,
        max_queued.max(1),
        Duration::from_millis(idle_timeout_ms.max(1)),
    )
    .with_priority(priority)
    .with_retain_idle_worker(retain_idle_worker)
}

/// Load dispatcher parameters from environment.
fn load_dispatcher_params() -> DispatcherParams {
    let priority = std::env::var("CONN_DISPATCH_THREAD_PRIORITY")
        .ok()
        .and_then(|v| TaskPriority::parse(&v))
        .unwrap_or_default();
    dispatcher_params(
        parse_usize("CONN_DISPATCH_MAX_THREADS", 0),
        parse_usize("CONN_DISPATCH_MAX_QUEUED", DEFAULT_MAX_QUEUED),
        parse_u64("CONN_DISPATCH_IDLE_TIMEOUT_MS", DEFAULT_IDLE_TIMEOUT_MS),
        priority,
        parse_bool("CONN_DISPATCH_RETAIN_IDLE_WORKER", true),
    )
}

/// Load logging configuration from environment.
fn load_log_config() -> LogConfig {
    let level = std::env::var("CONN_DISPATCH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let format = std::env::var("CONN_DISPATCH_LOG_FORMAT")
        .ok()
        .and_then(|v| LogFormat::parse(&v))
        .unwrap_or_default();
    let output_path = std::env::var("CONN_DISPATCH_LOG_FILE")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from);
    LogConfig {
        format,
        level,
        output_path,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let bind = std::env::var("CONN_DISPATCH_BIND")
        .ok()
        .and_then(|v| parse_bind(&v))
        .unwrap_or_else(default_bind);

    EnvConfig {
        bind,
        dispatcher: load_dispatcher_params(),
        pool: ThreadPoolConfig::with_capacity(parse_usize("CONN_DISPATCH_POOL_THREADS", 0)),
        logging: load_log_config(),
    }
}

/// Load configuration from a TOML file. Missing keys take their defaults.
///
/// Unlike the environment loader, a malformed file is an error.
pub fn load_file(path: &Path) -> Result<EnvConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let file: FileConfig = toml::from_str(&text)?;

    let bind = match file.bind.as_deref() {
        Some(raw) => parse_bind(raw).ok_or_else(|| ConfigError::BindAddress(raw.to_string()))?,
        None => default_bind(),
    };

    let dispatcher = dispatcher_params(
        file.max_threads.unwrap_or(0),
        file.max_queued.unwrap_or(DEFAULT_MAX_QUEUED),
        file.idle_timeout_ms.unwrap_or(DEFAULT_IDLE_TIMEOUT_MS),
        file.thread_priority.unwrap_or_default(),
        file.retain_idle_worker.unwrap_or(true),
    );

    let format = match file.log_format.as_deref() {
        Some(raw) => LogFormat::parse(raw).ok_or_else(|| ConfigError::LogFormat(raw.to_string()))?,
        None => LogFormat::default(),
    };
    let logging = LogConfig {
        format,
        level: file.log_level.unwrap_or_else(|| "info".to_string()),
        output_path: file.log_file,
    };

    Ok(EnvConfig {
        bind,
        dispatcher,
        pool: ThreadPoolConfig::with_capacity(file.pool_threads.unwrap_or(0)),
        logging,
    })
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            bind: self.bind.to_string(),
            max_threads: self.dispatcher.max_threads,
            max_queued: self.dispatcher.max_queued,
            idle_timeout_ms: self.dispatcher.thread_idle_timeout.as_millis() as u64,
            thread_priority: self.dispatcher.thread_priority,
            retain_idle_worker: self.dispatcher.retain_idle_worker,
            pool_threads: self.pool.capacity,
            log_level: self.logging.level.clone(),
            log_format: self.logging.format.as_str().to_string(),
            log_file: self
                .logging
                .output_path
                .as_ref()
                .map(|p| p.display().to_string()),
        }
    }
}

/// Documented defaults, as `KEY=value` lines.
pub fn defaults() -> Vec<(&'static str, String)> {
    vec![
        ("CONN_DISPATCH_BIND", DEFAULT_BIND.to_string()),
        ("CONN_DISPATCH_MAX_THREADS", "0".to_string()),
        ("CONN_DISPATCH_MAX_QUEUED", DEFAULT_MAX_QUEUED.to_string()),
        ("CONN_DISPATCH_IDLE_TIMEOUT_MS", DEFAULT_IDLE_TIMEOUT_MS.to_string()),
        ("CONN_DISPATCH_THREAD_PRIORITY", TaskPriority::Normal.to_string()),
        ("CONN_DISPATCH_RETAIN_IDLE_WORKER", "true".to_string()),
        ("CONN_DISPATCH_POOL_THREADS", "0".to_string()),
        ("CONN_DISPATCH_LOG_LEVEL", "info".to_string()),
        ("CONN_DISPATCH_LOG_FORMAT", LogFormat::Json.as_str().to_string()),
        ("CONN_DISPATCH_LOG_FILE", String::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "CONN_DISPATCH_BIND",
        "CONN_DISPATCH_MAX_THREADS",
        "CONN_DISPATCH_MAX_QUEUED",
        "CONN_DISPATCH_IDLE_TIMEOUT_MS",
        "CONN_DISPATCH_THREAD_PRIORITY",
        "CONN_DISPATCH_RETAIN_IDLE_WORKER",
        "CONN_DISPATCH_POOL_THREADS",
        "CONN_DISPATCH_LOG_LEVEL",
        "CONN_DISPATCH_LOG_FORMAT",
        "CONN_DISPATCH_LOG_FILE",
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg.bind.to_string(), DEFAULT_BIND);
        assert_eq!(cfg.dispatcher.max_threads, 0);
        assert_eq!(cfg.dispatcher.max_queued, 64);
        assert_eq!(cfg.dispatcher.thread_idle_timeout, Duration::from_secs(10));
        assert_eq!(cfg.dispatcher.thread_priority, TaskPriority::Normal);
        assert!(cfg.dispatcher.retain_idle_worker);
        assert_eq!(cfg.pool.capacity, 0);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert!(cfg.logging.output_path.is_none());
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("CONN_DISPATCH_BIND", "0.0.0.0:7000");
        std::env::set_var("CONN_DISPATCH_MAX_THREADS", "8");
        std::env::set_var("CONN_DISPATCH_MAX_QUEUED", "128");
        std::env::set_var("CONN_DISPATCH_IDLE_TIMEOUT_MS", "250");
        std::env::set_var("CONN_DISPATCH_THREAD_PRIORITY", "high");
        std::env::set_var("CONN_DISPATCH_RETAIN_IDLE_WORKER", "no");
        std::env::set_var("CONN_DISPATCH_POOL_THREADS", "16");
        std::env::set_var("CONN_DISPATCH_LOG_FORMAT", "pretty");
        std::env::set_var("CONN_DISPATCH_LOG_FILE", "/var/log/conn-dispatch.log");
        let cfg = load();
        assert_eq!(cfg.bind.port(), 7000);
        assert_eq!(cfg.dispatcher.max_threads, 8);
        assert_eq!(cfg.dispatcher.max_queued, 128);
        assert_eq!(cfg.dispatcher.thread_idle_timeout, Duration::from_millis(250));
        assert_eq!(cfg.dispatcher.thread_priority, TaskPriority::High);
        assert!(!cfg.dispatcher.retain_idle_worker);
        assert_eq!(cfg.pool.capacity, 16);
        assert_eq!(cfg.logging.format, LogFormat::Pretty);
        assert_eq!(
            cfg.logging.output_path.as_deref(),
            Some(Path::new("/var/log/conn-dispatch.log"))
        );
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("CONN_DISPATCH_BIND", "not-an-address");
        std::env::set_var("CONN_DISPATCH_MAX_QUEUED", "abc");
        std::env::set_var("CONN_DISPATCH_THREAD_PRIORITY", "urgent");
        std::env::set_var("CONN_DISPATCH_RETAIN_IDLE_WORKER", "maybe");
        let cfg = load();
        assert_eq!(cfg.bind.to_string(), DEFAULT_BIND);
        assert_eq!(cfg.dispatcher.max_queued, 64);
        assert_eq!(cfg.dispatcher.thread_priority, TaskPriority::Normal);
        assert!(cfg.dispatcher.retain_idle_worker);
        clear_env_vars();
    }

    #[test]
    fn test_floors_applied() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("CONN_DISPATCH_MAX_QUEUED", "0");
        std::env::set_var("CONN_DISPATCH_IDLE_TIMEOUT_MS", "0");
        let cfg = load();
        assert_eq!(cfg.dispatcher.max_queued, 1, "queue needs at least one slot");
        assert!(cfg.dispatcher.thread_idle_timeout >= Duration::from_millis(1));
        clear_env_vars();
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
bind = "127.0.0.1:4000"
max_threads = 2
max_queued = 3
idle_timeout_ms = 50
thread_priority = "critical"
log_format = "pretty"
log_file = "/tmp/conn-dispatch.log"
"#
        )
        .unwrap();

        let cfg = load_file(file.path()).unwrap();
        assert_eq!(cfg.bind.port(), 4000);
        assert_eq!(cfg.dispatcher.max_threads, 2);
        assert_eq!(cfg.dispatcher.max_queued, 3);
        assert_eq!(cfg.dispatcher.thread_idle_timeout, Duration::from_millis(50));
        assert_eq!(cfg.dispatcher.thread_priority, TaskPriority::Critical);
        assert!(cfg.dispatcher.retain_idle_worker);
        assert_eq!(cfg.logging.format, LogFormat::Pretty);
        assert_eq!(
            cfg.logging.output_path.as_deref(),
            Some(Path::new("/tmp/conn-dispatch.log"))
        );
        assert_eq!(
            cfg.effective_config().log_file.as_deref(),
            Some("/tmp/conn-dispatch.log")
        );
    }

    #[test]
    fn test_load_file_rejects_bad_input() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_queued = \"lots\"").unwrap();
        assert!(matches!(load_file(file.path()), Err(ConfigError::Parse(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind = \"nowhere\"").unwrap();
        assert!(matches!(load_file(file.path()), Err(ConfigError::BindAddress(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_format = \"xml\"").unwrap();
        assert!(matches!(load_file(file.path()), Err(ConfigError::LogFormat(f)) if f == "xml"));

        let missing = Path::new("/nonexistent/conn-dispatch.toml");
        assert!(matches!(load_file(missing), Err(ConfigError::Read(_))));
    }

    #[test]
    fn test_effective_config_contains_all_fields() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let eff = load().effective_config();
        assert_eq!(eff.bind, DEFAULT_BIND);
        assert_eq!(eff.max_queued, 64);
        assert_eq!(eff.idle_timeout_ms, 10_000);
        assert_eq!(eff.log_format, "json");

        let json = serde_json::to_value(&eff).unwrap();
        assert_eq!(json["thread_priority"], "normal");
        assert_eq!(defaults().len(), ENV_KEYS.len());
    }
}
