//! Configuration sections. Each one maps to a `[table]` in the TOML file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Name of the cache directory created under the platform temp root.
pub const DEFAULT_CACHE_DIR_NAME: &str = "lilypress_cache";

/// Filesystem paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Durable cache for engraved artifacts (`<name>.pdf`, `<name>.midi`).
    /// Default: <temp root>/lilypress_cache
    #[serde(default = "PathsConfig::default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl PathsConfig {
    pub fn default_cache_dir() -> PathBuf {
        std::env::temp_dir().join(DEFAULT_CACHE_DIR_NAME)
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_dir: Self::default_cache_dir(),
        }
    }
}

/// How the LilyPond executable is found and driven.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngraverConfig {
    /// Explicit path to the lilypond executable. Empty means auto-locate.
    #[serde(default)]
    pub lilypond_path: Option<PathBuf>,

    /// Seconds to wait for one lilypond run before killing it. 0 disables.
    /// Default: 120
    #[serde(default = "EngraverConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl EngraverConfig {
    fn default_timeout_secs() -> u64 {
        120
    }

    /// The run timeout, or `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for EngraverConfig {
    fn default() -> Self {
        Self {
            lilypond_path: None,
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

/// HTTP bind address for `lilypress serve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindConfig {
    /// Default: 8084
    #[serde(default = "BindConfig::default_http_port")]
    pub http_port: u16,

    /// Default: 127.0.0.1
    #[serde(default = "BindConfig::default_host")]
    pub host: String,
}

impl BindConfig {
    fn default_http_port() -> u16 {
        8084
    }

    fn default_host() -> String {
        "127.0.0.1".to_string()
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            http_port: Self::default_http_port(),
            host: Self::default_host(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint for OpenTelemetry. Empty disables export.
    #[serde(default)]
    pub otlp_endpoint: String,

    /// Log level or full `EnvFilter` directive.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: String::new(),
            log_level: Self::default_log_level(),
        }
    }
}
