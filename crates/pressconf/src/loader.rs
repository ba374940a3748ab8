//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, PressConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/lilypress/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("lilypress/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("lilypress.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<PressConfig, ConfigError> {
    let mut config = PressConfig::default();
    apply_file(&mut config, path)?;
    Ok(config)
}

/// Layer a TOML file over `config`. Only keys present in the file change.
pub fn apply_file(config: &mut PressConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

#[cfg(test)]
fn parse_toml(contents: &str, path: &Path) -> Result<PressConfig, ConfigError> {
    let mut config = PressConfig::default();
    apply_toml(&mut config, contents, path)?;
    Ok(config)
}

/// Apply the keys of a TOML document. Unknown keys are ignored, missing keys
/// leave `config` as it was, so a later file can restore a default value.
fn apply_toml(config: &mut PressConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(paths) = table.get("paths").and_then(|v| v.as_table()) {
        if let Some(v) = paths.get("cache_dir").and_then(|v| v.as_str()) {
            config.paths.cache_dir = expand_path(v);
        }
    }

    if let Some(engraver) = table.get("engraver").and_then(|v| v.as_table()) {
        if let Some(v) = engraver.get("lilypond_path").and_then(|v| v.as_str()) {
            config.engraver.lilypond_path = (!v.is_empty()).then(|| expand_path(v));
        }
        if let Some(v) = engraver.get("timeout_secs") {
            let secs = v.as_integer().ok_or_else(|| ConfigError::Parse {
                path: path.to_path_buf(),
                message: "engraver.timeout_secs must be an integer".to_string(),
            })?;
            config.engraver.timeout_secs = secs.max(0) as u64;
        }
    }

    if let Some(bind) = table.get("bind").and_then(|v| v.as_table()) {
        if let Some(v) = bind.get("http_port").and_then(|v| v.as_integer()) {
            config.bind.http_port = u16::try_from(v).map_err(|_| ConfigError::Parse {
                path: path.to_path_buf(),
                message: format!("bind.http_port out of range: {}", v),
            })?;
        }
        if let Some(v) = bind.get("host").and_then(|v| v.as_str()) {
            config.bind.host = v.to_string();
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("otlp_endpoint").and_then(|v| v.as_str()) {
            config.telemetry.otlp_endpoint = v.to_string();
        }
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
    }

    Ok(())
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut PressConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Apply overrides using `lookup` in place of the process environment.
pub fn apply_overrides_from(
    config: &mut PressConfig,
    sources: &mut ConfigSources,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("LILYPRESS_CACHE_DIR") {
        config.paths.cache_dir = expand_path(&v);
        sources.env_overrides.push("LILYPRESS_CACHE_DIR".to_string());
    }

    if let Some(v) = lookup("LILYPRESS_LILYPOND") {
        config.engraver.lilypond_path = (!v.is_empty()).then(|| expand_path(&v));
        sources.env_overrides.push("LILYPRESS_LILYPOND".to_string());
    }
    if let Some(v) = lookup("LILYPRESS_TIMEOUT_SECS") {
        if let Ok(secs) = v.parse() {
            config.engraver.timeout_secs = secs;
            sources.env_overrides.push("LILYPRESS_TIMEOUT_SECS".to_string());
        }
    }

    if let Some(v) = lookup("LILYPRESS_HTTP_PORT") {
        if let Ok(port) = v.parse() {
            config.bind.http_port = port;
            sources.env_overrides.push("LILYPRESS_HTTP_PORT".to_string());
        }
    }
    if let Some(v) = lookup("LILYPRESS_HOST") {
        config.bind.host = v;
        sources.env_overrides.push("LILYPRESS_HOST".to_string());
    }

    if let Some(v) = lookup("LILYPRESS_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = v;
        sources.env_overrides.push("LILYPRESS_OTLP_ENDPOINT".to_string());
    }
    // Also support standard OTEL env var
    if let Some(v) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = v;
        sources.env_overrides.push("OTEL_EXPORTER_OTLP_ENDPOINT".to_string());
    }
    if let Some(v) = lookup("LILYPRESS_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("LILYPRESS_LOG_LEVEL".to_string());
    }
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

/// Expand `~/` and `$VAR/` prefixes in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}
