use tracing::info;

use storage_local::LocalFilesystemAdapter;
use storage_platform::error::{Result, StorageError};
use storage_platform::filesystem::FilesystemAdapter;

use crate::config::{BackendKind, StorageConfig};
use crate::hdfs::HdfsAdapter;

/// Build the adapter selected by `config.backend`
pub fn build_adapter(config: &StorageConfig) -> Result<Box<dyn FilesystemAdapter>> {
    match config.backend {
        BackendKind::Hdfs => {
            let adapter = HdfsAdapter::from_config(config)?;
            info!(
                "using hdfs gateway at {} (root {})",
                config.gateway_url,
                adapter.prefixer().root()
            );
            Ok(Box::new(adapter))
        }
        BackendKind::Local => {
            if config.root.trim().is_empty() {
                return Err(StorageError::Config(
                    "local backend needs a root directory".to_string(),
                ));
            }
            info!("using local storage at {}", config.root);
            Ok(Box::new(LocalFilesystemAdapter::new(&config.root)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selects_backend() {
        let hdfs = build_adapter(&StorageConfig {
            gateway_url: "http://gateway:8080".to_string(),
            root: "/elabftw/uploads".to_string(),
            ..StorageConfig::default()
        })
        .unwrap();
        assert_eq!(hdfs.backend(), "hdfs");

        let local = build_adapter(&StorageConfig {
            backend: BackendKind::Local,
            root: "/tmp".to_string(),
            ..StorageConfig::default()
        })
        .unwrap();
        assert_eq!(local.backend(), "local");
    }

    #[test]
    fn test_hdfs_requires_gateway_url() {
        let err = build_adapter(&StorageConfig::default()).err().unwrap();
        assert!(matches!(err, StorageError::Config(_)));
    }
}
