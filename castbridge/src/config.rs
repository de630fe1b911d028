//! Bridge configuration.
//!
//! A small YAML file at `<config_dir>/castbridge/config.yaml`. Every field
//! has a default; a missing file means defaults, an unreadable or invalid
//! file is logged and also means defaults so the bridge always starts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use castcontrol::CAST_SERVICE_TYPE;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub selector: SelectorConfig,
    pub discovery: DiscoveryConfig,
}

/// External receiver picker. Without a configured program, selector
/// requests resolve as errors.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectorConfig {
    pub program: Option<String>,
    pub args: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub service_type: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            service_type: CAST_SERVICE_TYPE.to_string(),
        }
    }
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("castbridge").join("config.yaml"))
    }

    /// Loads the configuration from the default location.
    pub fn load() -> Config {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Config::default(),
        }
    }

    pub fn load_from(path: &Path) -> Config {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!("Cannot read config {}: {}", path.display(), err);
                return Config::default();
            }
        };

        match serde_yaml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                warn!("Invalid config {}: {}", path.display(), err);
                Config::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_when_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("missing.yaml"));
        assert_eq!(config, Config::default());
        assert_eq!(config.discovery.service_type, CAST_SERVICE_TYPE);
        assert!(config.selector.program.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "selector:\n  program: /usr/bin/selector\n  args: [\"--compact\"]\n",
        )
        .unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.selector.program.as_deref(), Some("/usr/bin/selector"));
        assert_eq!(config.selector.args, vec!["--compact"]);
        assert_eq!(config.discovery.service_type, CAST_SERVICE_TYPE);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "selector: [not, a, mapping]\n").unwrap();

        assert_eq!(Config::load_from(&path), Config::default());
    }
}
