//! Filesystem adapter backed by the HDFS gateway.
//!
//! Every operation is a single gateway round trip (`mime_type` costs one for
//! its existence check). Paths are qualified with the configured root before
//! they go on the wire and stripped of it when they come back.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{stream, StreamExt, TryStreamExt};
use reqwest::multipart::Part;
use serde::Deserialize;
use tracing::{debug, info};

use storage_platform::error::{Operation, Result, StorageError};
use storage_platform::filesystem::{
    ByteStream, FileAttributes, FilesystemAdapter, ListingStream, PathType, StorageAttributes,
    Visibility, WriteOptions,
};
use storage_platform::mime::{ExtensionMimeTypeDetector, MimeTypeDetector};
use storage_platform::path::{normalize_path, PathPrefixer};

use crate::config::StorageConfig;
use crate::gateway::{
    Call, GatewayClient, ROUTE_DELETE, ROUTE_DOWNLOAD, ROUTE_EXISTS, ROUTE_LIST, ROUTE_MKDIR,
};
use crate::listing::decode_listing;

const BACKEND: &str = "hdfs";

/// Response from GET /exists
#[derive(Debug, Deserialize)]
struct ExistsResponse {
    path_type: PathType,
}

pub struct HdfsAdapter {
    gateway: GatewayClient,
    prefixer: PathPrefixer,
    mime_detector: Arc<dyn MimeTypeDetector>,
}

impl HdfsAdapter {
    pub fn new(gateway: GatewayClient, root: &str) -> Self {
        Self {
            gateway,
            prefixer: PathPrefixer::new(root),
            mime_detector: Arc::new(ExtensionMimeTypeDetector),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let gateway = GatewayClient::new(&config.gateway_url, config.timeout())?;
        Ok(Self::new(gateway, &config.root))
    }

    pub fn with_mime_detector(mut self, detector: Arc<dyn MimeTypeDetector>) -> Self {
        self.mime_detector = detector;
        self
    }

    pub fn prefixer(&self) -> &PathPrefixer {
        &self.prefixer
    }

    async fn path_type(&self, operation: Operation, path: &str) -> Result<PathType> {
        let location = self.prefixer.prefix_path(path)?;
        let probe: ExistsResponse = self
            .gateway
            .get_json(Call::new(operation, path), ROUTE_EXISTS, &[("path", location)])
            .await?;
        Ok(probe.path_type)
    }

    async fn upload(&self, path: &str, file: Part) -> Result<()> {
        let location = self.prefixer.prefix_path(path)?;
        self.gateway
            .upload(Call::new(Operation::Write, path), &location, file)
            .await?;
        info!("hdfs upload: {}", location);
        Ok(())
    }

    async fn remove(&self, operation: Operation, path: &str) -> Result<()> {
        let location = self.prefixer.prefix_path(path)?;
        self.gateway
            .post_path(Call::new(operation, path), ROUTE_DELETE, &location)
            .await?;
        info!("hdfs delete: {}", location);
        Ok(())
    }

    /// The record describing `path` itself. Listing a file yields the file;
    /// listing a directory yields its children, which never describe it.
    async fn first_entry(&self, operation: Operation, path: &str) -> Result<StorageAttributes> {
        let expected = normalize_path(path)?;
        let location = self.prefixer.prefix_path(path)?;
        let body = self
            .gateway
            .get_stream(Call::new(operation, path), ROUTE_LIST, &[("path", location)])
            .await?;
        let mut entries = decode_listing(body, self.prefixer.clone(), operation, path.to_string());
        match entries.try_next().await? {
            Some(entry) if entry.path() == expected => Ok(entry),
            Some(_) => Err(StorageError::metadata_unavailable(
                operation,
                path,
                "path is a directory",
            )),
            None => Err(StorageError::metadata_unavailable(
                operation,
                path,
                "gateway listed no entries",
            )),
        }
    }

    fn unsupported(&self, operation: Operation) -> StorageError {
        StorageError::UnsupportedOperation {
            operation,
            backend: BACKEND,
        }
    }
}

#[async_trait]
impl FilesystemAdapter for HdfsAdapter {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(self.path_type(Operation::FileExists, path).await?.is_file())
    }

    async fn directory_exists(&self, path: &str) -> Result<bool> {
        Ok(self
            .path_type(Operation::DirectoryExists, path)
            .await?
            .is_dir())
    }

    async fn write(&self, path: &str, contents: &[u8], _options: &WriteOptions) -> Result<()> {
        self.upload(path, Part::bytes(contents.to_vec())).await
    }

    async fn write_stream(&self, path: &str, contents: ByteStream, _options: &WriteOptions) -> Result<()> {
        self.upload(path, Part::stream(reqwest::Body::wrap_stream(contents)))
            .await
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream> {
        let location = self.prefixer.prefix_path(path)?;
        self.gateway
            .get_stream(
                Call::new(Operation::Read, path),
                ROUTE_DOWNLOAD,
                &[("path", location)],
            )
            .await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.remove(Operation::Delete, path).await
    }

    // the gateway has a single delete endpoint for files and directories
    async fn delete_directory(&self, path: &str) -> Result<()> {
        self.remove(Operation::DeleteDirectory, path).await
    }

    async fn create_directory(&self, path: &str, _options: &WriteOptions) -> Result<()> {
        let location = self.prefixer.prefix_path(path)?;
        self.gateway
            .post_path(
                Call::new(Operation::CreateDirectory, path),
                ROUTE_MKDIR,
                &location,
            )
            .await?;
        info!("hdfs mkdir: {}", location);
        Ok(())
    }

    async fn set_visibility(&self, _path: &str, _visibility: Visibility) -> Result<()> {
        Err(self.unsupported(Operation::SetVisibility))
    }

    async fn visibility(&self, path: &str) -> Result<FileAttributes> {
        Ok(FileAttributes::new(normalize_path(path)?))
    }

    async fn mime_type(&self, path: &str) -> Result<FileAttributes> {
        if !self.path_type(Operation::MimeType, path).await?.is_file() {
            return Err(StorageError::metadata_unavailable(
                Operation::MimeType,
                path,
                "file does not exist",
            ));
        }
        let normalized = normalize_path(path)?;
        let mime_type = self
            .mime_detector
            .detect_from_path(&normalized)
            .ok_or_else(|| {
                StorageError::metadata_unavailable(Operation::MimeType, path, "unknown mime type")
            })?;
        Ok(FileAttributes {
            mime_type: Some(mime_type),
            ..FileAttributes::new(normalized)
        })
    }

    async fn last_modified(&self, path: &str) -> Result<FileAttributes> {
        let entry = self.first_entry(Operation::LastModified, path).await?;
        let last_modified = entry.last_modified().ok_or_else(|| {
            StorageError::metadata_unavailable(Operation::LastModified, path, "gateway reported no mtime")
        })?;
        Ok(FileAttributes {
            last_modified: Some(last_modified),
            ..FileAttributes::new(normalize_path(path)?)
        })
    }

    async fn file_size(&self, path: &str) -> Result<FileAttributes> {
        let file_size = match self.first_entry(Operation::FileSize, path).await? {
            StorageAttributes::File(file) => file.file_size,
            StorageAttributes::Directory(_) => {
                return Err(StorageError::metadata_unavailable(
                    Operation::FileSize,
                    path,
                    "path is a directory",
                ))
            }
        };
        let file_size = file_size.ok_or_else(|| {
            StorageError::metadata_unavailable(Operation::FileSize, path, "gateway reported no size")
        })?;
        Ok(FileAttributes {
            file_size: Some(file_size),
            ..FileAttributes::new(normalize_path(path)?)
        })
    }

    fn list_contents(&self, path: &str, deep: bool) -> ListingStream {
        let gateway = self.gateway.clone();
        let prefixer = self.prefixer.clone();
        let path = path.to_string();

        stream::once(async move {
            let location = prefixer.prefix_path(&path)?;
            debug!("hdfs list: {} (deep={})", location, deep);
            let body = gateway
                .get_stream(
                    Call::new(Operation::ListContents, &path),
                    ROUTE_LIST,
                    &[("path", location), ("deep", deep.to_string())],
                )
                .await?;
            Ok::<_, StorageError>(decode_listing(body, prefixer, Operation::ListContents, path))
        })
        .try_flatten()
        .boxed()
    }

    async fn move_file(&self, _source: &str, _destination: &str, _options: &WriteOptions) -> Result<()> {
        Err(self.unsupported(Operation::Move))
    }

    async fn copy(&self, _source: &str, _destination: &str, _options: &WriteOptions) -> Result<()> {
        Err(self.unsupported(Operation::Copy))
    }
}
