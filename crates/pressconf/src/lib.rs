//! Configuration loading for lilypress.
//!
//! Everything here is fixed for the lifetime of the process: where engraved
//! artifacts are cached, how LilyPond is found and how long it may run,
//! where the HTTP API binds, and how logs are exported.
//!
//! # Config File Locations
//!
//! Files are loaded in order. A key set in a later file wins, keys a file
//! leaves out keep the value from earlier layers:
//! 1. `/etc/lilypress/config.toml` (system)
//! 2. `~/.config/lilypress/config.toml` (user)
//! 3. `./lilypress.toml` (local override, replaced by `--config <path>`)
//! 4. Environment variables (`LILYPRESS_*`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! cache_dir = "/tmp/lilypress_cache"
//!
//! [engraver]
//! lilypond_path = "/opt/lilypond/bin/lilypond"
//! timeout_secs = 60
//!
//! [bind]
//! http_port = 8084
//! host = "0.0.0.0"
//!
//! [telemetry]
//! otlp_endpoint = "127.0.0.1:4317"
//! log_level = "debug"
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};
pub use sections::{BindConfig, EngraverConfig, PathsConfig, TelemetryConfig, DEFAULT_CACHE_DIR_NAME};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete lilypress configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PressConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub engraver: EngraverConfig,

    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl PressConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration, letting `config_path` replace `./lilypress.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = PressConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::apply_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Built by hand so unset optional values still show up as comments
        let mut output = String::new();

        output.push_str("# lilypress configuration\n\n");

        output.push_str("[paths]\n");
        output.push_str(&format!(
            "cache_dir = \"{}\"\n",
            self.paths.cache_dir.display()
        ));

        output.push_str("\n[engraver]\n");
        match &self.engraver.lilypond_path {
            Some(path) => output.push_str(&format!("lilypond_path = \"{}\"\n", path.display())),
            None => output.push_str("# lilypond_path = \"\"  (auto-locate)\n"),
        }
        output.push_str(&format!("timeout_secs = {}\n", self.engraver.timeout_secs));

        output.push_str("\n[bind]\n");
        output.push_str(&format!("http_port = {}\n", self.bind.http_port));
        output.push_str(&format!("host = \"{}\"\n", self.bind.host));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "otlp_endpoint = \"{}\"\n",
            self.telemetry.otlp_endpoint
        ));
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        output
    }
}
