//! Configuration for the strata artifact store.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (STRATA_HOME, STRATA_DB)
//! 2. Config file (.strata/config.yaml)
//! 3. Defaults (~/.strata, ~/.strata/artifacts.sqlite)
//!
//! Config file discovery:
//! - Searches current directory and parents for .strata/config.yaml
//! - Paths in config file are relative to the .strata/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub store: Option<StoreConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .strata/)
    pub home: Option<String>,
    /// SQLite database file (relative to .strata/)
    pub database: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub busy_timeout_ms: Option<u64>,
    pub wal: Option<bool>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to strata home
    pub home: PathBuf,
    /// Absolute path to the SQLite database
    pub database: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// SQLite connection settings
    pub store: StoreSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// How long a writer waits on a locked database before failing
    pub busy_timeout_ms: u64,
    /// Use write-ahead logging (concurrent readers during writes)
    pub wal: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            wal: true,
        }
    }
}

impl StoreSettings {
    fn from_config(config: Option<&StoreConfig>) -> Self {
        let defaults = Self::default();
        Self {
            busy_timeout_ms: config
                .and_then(|s| s.busy_timeout_ms)
                .unwrap_or(defaults.busy_timeout_ms),
            wal: config.and_then(|s| s.wal).unwrap_or(defaults.wal),
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".strata").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge env vars, an optional config file and defaults
fn resolve(
    config_file: Option<PathBuf>,
    config: Option<ConfigFile>,
    env_home: Option<String>,
    env_db: Option<String>,
    default_home: PathBuf,
) -> ResolvedConfig {
    let strata_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(Path::new("."))
        .to_path_buf();
    let paths = config.as_ref().map(|c| c.paths.clone()).unwrap_or_default();

    let home = if let Some(env_home) = env_home {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = paths.home {
        resolve_path(&strata_dir, home_path)
    } else {
        default_home
    };

    let database = if let Some(env_db) = env_db {
        PathBuf::from(env_db)
    } else if let Some(ref db_path) = paths.database {
        resolve_path(&strata_dir, db_path)
    } else {
        home.join("artifacts.sqlite")
    };

    let store = StoreSettings::from_config(config.as_ref().and_then(|c| c.store.as_ref()));

    ResolvedConfig {
        home,
        database,
        config_file,
        store,
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".strata");

    let config_file = find_config_file();
    let config = match config_file {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    Ok(resolve(
        config_file,
        config,
        std::env::var("STRATA_HOME").ok(),
        std::env::var("STRATA_DB").ok(),
        default_home,
    ))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Get the directory JSONL exports land in by default ($STRATA_HOME/exports)
pub fn exports_dir() -> Result<PathBuf> {
    Ok(config()?.home.join("exports"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file_or_env() {
        let config = resolve(None, None, None, None, PathBuf::from("/home/u/.strata"));

        assert_eq!(config.home, PathBuf::from("/home/u/.strata"));
        assert_eq!(config.database, PathBuf::from("/home/u/.strata/artifacts.sqlite"));
        assert!(config.config_file.is_none());
        assert_eq!(config.store, StoreSettings::default());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let strata_dir = temp.path().join(".strata");
        std::fs::create_dir_all(&strata_dir).unwrap();

        let config_path = strata_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./
  database: ./db/artifacts.sqlite
store:
  busy_timeout_ms: 250
  wal: false
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.paths.home, Some("./".to_string()));
        assert_eq!(config.paths.database, Some("./db/artifacts.sqlite".to_string()));

        let resolved = resolve(
            Some(config_path.clone()),
            Some(config),
            None,
            None,
            PathBuf::from("/unused"),
        );
        assert_eq!(resolved.database, strata_dir.join("./db/artifacts.sqlite"));
        assert_eq!(
            resolved.store,
            StoreSettings {
                busy_timeout_ms: 250,
                wal: false
            }
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let config = ConfigFile {
            version: "1.0".to_string(),
            paths: PathsConfig {
                home: Some("/from/file".to_string()),
                database: Some("/from/file/db.sqlite".to_string()),
            },
            store: None,
        };

        let resolved = resolve(
            Some(PathBuf::from("/project/.strata/config.yaml")),
            Some(config),
            Some("/from/env".to_string()),
            Some("/from/env/db.sqlite".to_string()),
            PathBuf::from("/unused"),
        );

        assert_eq!(resolved.home, PathBuf::from("/from/env"));
        assert_eq!(resolved.database, PathBuf::from("/from/env/db.sqlite"));
    }

    #[test]
    fn test_partial_store_section_keeps_defaults() {
        let settings = StoreSettings::from_config(Some(&StoreConfig {
            busy_timeout_ms: None,
            wal: Some(false),
        }));
        assert_eq!(settings.busy_timeout_ms, 5_000);
        assert!(!settings.wal);
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
