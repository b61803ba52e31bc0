use crate::errors::ReportError;
use crate::rollup::DEFAULT_LATENCY_INTERVAL;
use crate::store::{DEFAULT_BUCKET, DEFAULT_STORE_ROOT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tally_backend_duckdb::IN_MEMORY;
use tracing::debug;

pub const CONFIG_FILE: &str = "tally.yml";

/// Settings from `tally.yml`. Every key is optional; command-line flags
/// take precedence over all of them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Warehouse connection string: a DuckDB file path or `:memory:`.
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub rollup: RollupConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    /// Directory holding the config file. Relative paths resolve against it.
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
            bucket: default_bucket(),
        }
    }
}

fn default_store_root() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_ROOT)
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RollupConfig {
    #[serde(default = "default_latency_interval")]
    pub latency_interval: u32,
    #[serde(default)]
    pub check_partitions: bool,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            latency_interval: default_latency_interval(),
            check_partitions: false,
        }
    }
}

fn default_latency_interval() -> u32 {
    DEFAULT_LATENCY_INTERVAL
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AlertConfig {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Vec<String>,
    /// Command that reads an RFC 5322 message on stdin, e.g. `sendmail -t`.
    #[serde(default)]
    pub mail_command: Option<String>,
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self, ReportError> {
        let content =
            std::fs::read_to_string(config_path).map_err(|e| ReportError::ConfigLoadError {
                path: config_path.to_path_buf(),
                source: e.into(),
            })?;

        let mut config: Config =
            serde_yaml::from_str(&content).map_err(|e| ReportError::ConfigLoadError {
                path: config_path.to_path_buf(),
                source: e.into(),
            })?;
        config.base_dir = config_path.parent().map(Path::to_path_buf);
        debug!(path = %config_path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load `tally.yml` from `start_dir` or one of its parents, or fall back
    /// to defaults when there is none.
    pub fn discover(start_dir: &Path) -> Result<Self, ReportError> {
        match find_config_file(start_dir) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// The configured connection string, with a relative file path resolved
    /// against the config file's directory.
    pub fn database(&self) -> Option<String> {
        let database = self.database.as_deref()?;
        if database == IN_MEMORY {
            return Some(database.to_string());
        }
        Some(self.resolve(Path::new(database)).display().to_string())
    }

    pub fn store_root(&self) -> PathBuf {
        self.resolve(&self.store.root)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Find `tally.yml` by walking up from `start_dir`, at most five levels.
pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();

    for _ in 0..5 {
        let candidate = current.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }

        if let Some(parent) = current.parent() {
            current = parent.to_path_buf();
        } else {
            break;
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
database: warehouse.duckdb
store:
  bucket: my-bucket
rollup:
  latency_interval: 3
  check_partitions: true
alerts:
  from: telemetry@example.com
  to:
    - ops@example.com
  mail_command: sendmail -t
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.database.as_deref(), Some("warehouse.duckdb"));
        assert_eq!(config.store.bucket, "my-bucket");
        assert_eq!(config.store.root, PathBuf::from("blobs"));
        assert_eq!(config.rollup.latency_interval, 3);
        assert!(config.rollup.check_partitions);
        assert_eq!(config.alerts.to, vec!["ops@example.com".to_string()]);
    }

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.database, None);
        assert_eq!(config.store.bucket, "telemetry-public-analysis-2");
        assert_eq!(config.rollup.latency_interval, 10);
        assert!(config.alerts.mail_command.is_none());
    }

    #[test]
    fn test_discover_walks_up() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "database: data/tally.duckdb\n").unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let config = Config::discover(&nested).unwrap();
        assert_eq!(
            config.database(),
            Some(dir.path().join("data/tally.duckdb").display().to_string())
        );
        assert_eq!(config.store_root(), dir.path().join("blobs"));
    }

    #[test]
    fn test_discover_without_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.store_root(), PathBuf::from("blobs"));
    }

    #[test]
    fn test_in_memory_database_is_not_resolved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "database: \":memory:\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.database(), Some(":memory:".to_string()));
    }

    #[test]
    fn test_malformed_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "rollup: [not, a, map]\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ReportError::ConfigLoadError { .. }));
        assert_eq!(err.exit_code(), crate::errors::EXIT_INPUT);
    }
}
