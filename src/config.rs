//! Configuration loading.
//!
//! Settings live in a TOML file at the platform config dir
//! (`~/.config/mailbundle/config.toml` on Linux), overridable with the
//! `MAILBUNDLE_CONFIG` environment variable. A missing or unreadable file
//! falls back to defaults with a warning; a bad file never aborts a run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub naming: NamingLimits,
    pub archive: ArchiveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default log level when `-v` flags are absent.
    pub log_level: String,
    /// Where log files go. Defaults to the platform cache dir.
    pub log_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_dir: None,
        }
    }
}

/// Truncation limits for derived path segments, in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingLimits {
    pub max_entity_len: usize,
    pub max_subject_len: usize,
    pub max_attachment_len: usize,
}

impl Default for NamingLimits {
    fn default() -> Self {
        Self {
            max_entity_len: 60,
            max_subject_len: 80,
            max_attachment_len: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Deflate level 0-9; `None` uses the library default.
    pub compression_level: Option<i64>,
    /// Prefix for suggested archive file names.
    pub name_prefix: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression_level: None,
            name_prefix: "email_archive".to_string(),
        }
    }
}

/// Path to the config file, honoring `MAILBUNDLE_CONFIG`.
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("MAILBUNDLE_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("mailbundle").join("config.toml"))
}

/// Directory for log files: configured dir, else the platform cache dir.
pub fn log_dir(config: &Config) -> PathBuf {
    config
        .general
        .log_dir
        .clone()
        .or_else(|| dirs::cache_dir().map(|dir| dir.join("mailbundle")))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Load the configuration, falling back to defaults on any failure.
pub fn load_config() -> Config {
    let Some(path) = config_file_path() else {
        return Config::default();
    };
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %err, "Failed to read config file, using defaults");
            }
            return Config::default();
        }
    };
    match toml::from_str(&raw) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Failed to parse config file, using defaults");
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.naming.max_entity_len, 60);
        assert_eq!(config.naming.max_subject_len, 80);
        assert_eq!(config.archive.name_prefix, "email_archive");
        assert!(config.archive.compression_level.is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [naming]
            max_subject_len = 40
            "#,
        )
        .unwrap();
        assert_eq!(config.naming.max_subject_len, 40);
        assert_eq!(config.naming.max_entity_len, 60);
        assert_eq!(config.general.log_level, "warn");
    }
}
