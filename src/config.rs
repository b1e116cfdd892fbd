//! TOML configuration file handling.
//!
//! Everything in the file is optional at parse time; [`BridgeConfig::resolve`]
//! enforces what a run actually needs, so `--help` and simulated offline runs
//! never demand credentials.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};
use crate::retry::RetryPolicy;
use crate::sync::uris;

/// Raw config file contents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub sparql_url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub node_path: Option<PathBuf>,
    pub edge_path: Option<PathBuf>,
    pub simulate: Option<bool>,
    pub bootstrap_max_attempts: Option<u32>,
    pub bootstrap_delay_secs: Option<u64>,
    pub truncate_descriptions: Option<usize>,
    pub type_property_uri: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> ConfigResult<FileConfig> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Fully resolved connection settings.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub api_url: String,
    pub sparql_url: String,
    pub user: String,
    pub password: String,
    /// Default table paths; command-line paths take precedence.
    pub node_path: Option<PathBuf>,
    pub edge_path: Option<PathBuf>,
    pub simulate: bool,
    pub retry: RetryPolicy,
    pub truncate_descriptions: Option<usize>,
    pub type_property_uri: String,
}

impl BridgeConfig {
    /// Check required fields and fill in defaults. Credentials may stay
    /// empty; they are only exercised on the first authenticated write.
    pub fn resolve(file: FileConfig) -> ConfigResult<BridgeConfig> {
        let api_url = file
            .api_url
            .ok_or(ConfigError::Missing { field: "api_url" })?;
        let sparql_url = file
            .sparql_url
            .ok_or(ConfigError::Missing { field: "sparql_url" })?;

        let defaults = RetryPolicy::default();
        Ok(BridgeConfig {
            api_url,
            sparql_url,
            user: file.user.unwrap_or_default(),
            password: file.password.unwrap_or_default(),
            node_path: file.node_path,
            edge_path: file.edge_path,
            simulate: file.simulate.unwrap_or(false),
            retry: RetryPolicy {
                max_attempts: file.bootstrap_max_attempts.unwrap_or(defaults.max_attempts),
                delay: file
                    .bootstrap_delay_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.delay),
            },
            truncate_descriptions: Some(file.truncate_descriptions.unwrap_or(250)),
            type_property_uri: file
                .type_property_uri
                .unwrap_or_else(|| uris::TYPE_OF.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_config_resolves_with_defaults() {
        let file: FileConfig = toml::from_str(
            r#"
            api_url = "http://localhost/w/api.php"
            sparql_url = "http://localhost:9999/bigdata/sparql"
            "#,
        )
        .unwrap();
        let config = BridgeConfig::resolve(file).unwrap();
        assert_eq!(config.retry.max_attempts, 15);
        assert_eq!(config.retry.delay, Duration::from_secs(20));
        assert_eq!(config.truncate_descriptions, Some(250));
        assert_eq!(config.type_property_uri, uris::TYPE_OF);
        assert!(config.user.is_empty());
        assert!(config.node_path.is_none());
        assert!(!config.simulate);
    }

    #[test]
    fn missing_api_url_is_reported_by_name() {
        let err = BridgeConfig::resolve(FileConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { field: "api_url" }));
    }

    #[test]
    fn retry_settings_override_defaults() {
        let file: FileConfig = toml::from_str(
            r#"
            api_url = "http://localhost/w/api.php"
            sparql_url = "http://localhost:9999/bigdata/sparql"
            bootstrap_max_attempts = 3
            bootstrap_delay_secs = 1
            truncate_descriptions = 100
            type_property_uri = "http://www.wikidata.org/entity/P31"
            "#,
        )
        .unwrap();
        let config = BridgeConfig::resolve(file).unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay, Duration::from_secs(1));
        assert_eq!(config.truncate_descriptions, Some(100));
        assert_eq!(config.type_property_uri, "http://www.wikidata.org/entity/P31");
    }

    #[test]
    fn table_paths_and_simulate_resolve_from_the_file() {
        let file: FileConfig = toml::from_str(
            r#"
            api_url = "http://localhost/w/api.php"
            sparql_url = "http://localhost:9999/bigdata/sparql"
            node_path = "data/nodes.csv"
            edge_path = "data/edges.csv"
            simulate = true
            "#,
        )
        .unwrap();
        let config = BridgeConfig::resolve(file).unwrap();
        assert_eq!(config.node_path.as_deref(), Some(Path::new("data/nodes.csv")));
        assert_eq!(config.edge_path.as_deref(), Some(Path::new("data/edges.csv")));
        assert!(config.simulate);
    }

    #[test]
    fn load_reads_and_parses_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");
        let mut handle = std::fs::File::create(&path).unwrap();
        writeln!(handle, "api_url = \"http://localhost/w/api.php\"").unwrap();
        writeln!(handle, "user = \"bot\"").unwrap();

        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.user.as_deref(), Some("bot"));
        assert!(file.sparql_url.is_none());
    }

    #[test]
    fn unreadable_path_reports_read_error() {
        let err = FileConfig::load(Path::new("/nonexistent/bridge.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
