//! CLI argument definitions for the `kbus` binary.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// KBUS -- a kernel-style message bus, run in process.
#[derive(Parser)]
#[command(
    name = "kbus",
    version,
    about = "KBUS -- kernel-style message bus",
    long_about = "Validate bus names, try out wildcard patterns, and drive in-memory \
                  KBUS devices from scripted sessions."
)]
pub struct Cli {
    /// Configuration file to read the `[kbus]` table from.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Default log level when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check names as binding patterns and as message names.
    Check {
        /// The names to check.
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Report whether a binding pattern matches a message name.
    Match {
        /// Binding pattern, e.g. `$.Sensors.*`.
        pattern: String,
        /// Message name, e.g. `$.Sensors.Kitchen.Temp`.
        name: String,
    },

    /// Run a scripted session against a fresh bus.
    Run {
        /// TOML script with `[[step]]` entries.
        script: PathBuf,
    },

    /// Run a built-in listener/replier/requester exchange.
    Demo {
        /// Device index to use.
        #[arg(long, short, default_value_t = 0)]
        device: usize,
    },
}
