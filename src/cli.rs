//! Command-line interface

use clap::{Parser, Subcommand};
use rivalscope_core::config::{AuthConfig, AuthMode, BindMode};
use rivalscope_core::ServiceConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "rivalscope",
    about = "Rivalscope: competitor analysis job orchestration",
    version
)]
pub struct Cli {
    /// Config file (TOML)
    #[arg(short, long, global = true, default_value = "rivalscope.toml")]
    pub config: PathBuf,

    /// Also write logs to this file (rotated daily)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP gateway
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
        /// lan or loopback
        #[arg(short, long)]
        bind: Option<String>,
        #[arg(short, long)]
        token: Option<String>,
        #[arg(long)]
        no_auth: bool,
    },
    /// Run one job in-process and print the finished job as JSON
    Run {
        #[arg(short, long, default_value = "standard")]
        depth: String,
        /// Add the visual analysis pass
        #[arg(long)]
        visual: bool,
        #[arg(long, default_value = "default")]
        tenant: String,
        /// Skip the existing-results lookup
        #[arg(long)]
        no_cache: bool,
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Print the completion estimate for a batch
    Estimate {
        #[arg(short, long, default_value = "standard")]
        depth: String,
        #[arg(short, long)]
        targets: usize,
    },
    /// Print the effective configuration as TOML
    Config,
    /// Show version
    Version,
}

impl Cli {
    /// File config (or defaults) with environment overrides applied.
    pub fn load_config(&self) -> ServiceConfig {
        ServiceConfig::load(&self.config).with_env()
    }
}

/// Flags from `serve` override whatever the file said.
pub fn apply_serve_flags(
    mut config: ServiceConfig,
    port: Option<u16>,
    bind: Option<&str>,
    token: Option<String>,
    no_auth: bool,
) -> ServiceConfig {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(bind) = bind {
        config.server.bind = BindMode::parse_lenient(bind);
    }
    if no_auth {
        config.auth = AuthConfig {
            mode: AuthMode::None,
            token: None,
        };
    } else if let Some(token) = token {
        config.auth = AuthConfig {
            mode: AuthMode::Token,
            token: Some(token),
        };
    }
    config
}
