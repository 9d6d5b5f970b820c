use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Hdfs,
    Local,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Hdfs => f.write_str("hdfs"),
            BackendKind::Local => f.write_str("local"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hdfs" => Ok(BackendKind::Hdfs),
            "local" => Ok(BackendKind::Local),
            other => Err(format!("unknown storage backend {:?} (expected hdfs or local)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which backend serves the storage
    #[serde(default)]
    pub backend: BackendKind,

    /// Gateway base URL (e.g., http://gateway:8080)
    #[serde(default)]
    pub gateway_url: String,

    /// Per-request timeout in seconds, generous enough for large transfers
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Root path on HDFS, or root directory for the local backend
    #[serde(default = "default_root")]
    pub root: String,
}

fn default_timeout() -> u64 {
    300
}
fn default_root() -> String {
    "/".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            gateway_url: String::new(),
            timeout_secs: default_timeout(),
            root: default_root(),
        }
    }
}

impl StorageConfig {
    /// Default config file path for this platform
    pub fn default_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("org", "hdfs-storage", "hdfs-storage") {
            dirs.config_dir().join("config.json")
        } else {
            PathBuf::from("hdfs-storage.json")
        }
    }

    /// Load config from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&data).with_context(|| "failed to parse config JSON")?;
        Ok(config)
    }

    /// Save config to a file path
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: StorageConfig =
            serde_json::from_str(r#"{"gateway_url": "http://gateway:8080"}"#).unwrap();
        assert_eq!(config.backend, BackendKind::Hdfs);
        assert_eq!(config.timeout(), Duration::from_secs(300));
        assert_eq!(config.root, "/");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.json");
        let config = StorageConfig {
            backend: BackendKind::Local,
            gateway_url: String::new(),
            timeout_secs: 30,
            root: "/srv/uploads".to_string(),
        };
        config.save(&path).unwrap();
        assert_eq!(StorageConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("HDFS".parse::<BackendKind>().unwrap(), BackendKind::Hdfs);
        assert_eq!("local".parse::<BackendKind>().unwrap(), BackendKind::Local);
        assert!("s3".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Local.to_string(), "local");
    }
}
