//! CLI subcommands for the `conn-dispatch` binary.
//!
//! ## Usage
//!
//! ```bash
//! conn-dispatch                  # Run the echo server (default)
//! conn-dispatch serve --config /etc/conn-dispatch.toml
//! conn-dispatch config show      # Print effective configuration
//! ```

pub mod config_cmd;
pub mod serve;

pub use serve::run_serve;
