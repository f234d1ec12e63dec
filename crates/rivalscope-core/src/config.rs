//! Service configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub limits: LimitConfig,
    pub executor: ExecutorConfig,
    pub worker: WorkerConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: BindMode,
}

/// Bind mode for the gateway
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    Loopback,
    #[default]
    Lan,
}

impl BindMode {
    pub fn to_addr(&self) -> &str {
        match self {
            BindMode::Loopback => "127.0.0.1",
            BindMode::Lan => "0.0.0.0",
        }
    }

    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "loopback" | "localhost" | "127.0.0.1" => BindMode::Loopback,
            _ => BindMode::Lan,
        }
    }
}

/// Authentication configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub token: Option<String>,
}

/// Authentication mode
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Token,
    None,
}

/// Submission size limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Max targets on the regular submission route.
    pub max_targets: usize,
    /// Max targets on the bulk submission route.
    pub max_bulk_targets: usize,
}

/// Executor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Bounded wait per work unit. 0 disables the limit.
    pub unit_timeout_secs: u64,
    /// Max sibling units a coordinator keeps in flight for one target.
    pub max_parallel_units: usize,
}

impl ExecutorConfig {
    pub fn unit_timeout(&self) -> Option<Duration> {
        (self.unit_timeout_secs > 0).then(|| Duration::from_secs(self.unit_timeout_secs))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkerBackend {
    /// Deterministic offline worker.
    #[default]
    Stub,
    /// Anthropic Messages API.
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub backend: WorkerBackend,
    pub model: String,
    /// Override for the Messages endpoint (e.g. a proxy).
    pub api_url: Option<String>,
    pub max_tokens: u32,
    /// Artificial latency for the stub backend, in milliseconds.
    pub stub_latency_ms: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Root directory for the local backend.
    pub path: PathBuf,
}

// ============================================================
// Defaults
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 18820,
            bind: BindMode::default(),
        }
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_targets: 20,
            max_bulk_targets: 50,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            unit_timeout_secs: 300,
            max_parallel_units: 4,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            backend: WorkerBackend::default(),
            model: "claude-sonnet-4-5".into(),
            api_url: None,
            max_tokens: 4096,
            stub_latency_ms: 0,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join(".rivalscope/reports"))
        .unwrap_or_else(|_| PathBuf::from("/tmp/rivalscope/reports"))
}

// ============================================================
// Loading
// ============================================================

impl ServiceConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Apply environment overrides on top of file values.
    pub fn with_env(mut self) -> Self {
        if let Ok(token) = std::env::var("RIVALSCOPE_GATEWAY_TOKEN") {
            self.auth.token.get_or_insert(token);
        }
        if let Ok(url) = std::env::var("ANTHROPIC_API_URL") {
            self.worker.api_url.get_or_insert(url);
        }
        self
    }

    /// Render as TOML (for `rivalscope config`).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
