use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::BoxStream;
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Lazily consumed file contents. Dropping the stream releases the underlying connection or handle.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Lazily produced directory listing
pub type ListingStream = BoxStream<'static, Result<StorageAttributes>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// Result of an existence probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathType {
    File,
    Directory,
    None,
}

impl PathType {
    pub fn is_file(&self) -> bool {
        matches!(self, PathType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, PathType::Directory)
    }
}

/// Per-call options for writes and directory creation. Backends without a permission model ignore them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub visibility: Option<Visibility>,
    pub directory_visibility: Option<Visibility>,
}

impl WriteOptions {
    pub fn with_visibility(visibility: Visibility) -> Self {
        Self {
            visibility: Some(visibility),
            directory_visibility: None,
        }
    }
}

/// File metadata. Only the fields the backend actually reported are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    /// Unix timestamp in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl FileAttributes {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryAttributes {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
}

impl DirectoryAttributes {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// One entry of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageAttributes {
    File(FileAttributes),
    Directory(DirectoryAttributes),
}

impl StorageAttributes {
    pub fn path(&self) -> &str {
        match self {
            StorageAttributes::File(f) => &f.path,
            StorageAttributes::Directory(d) => &d.path,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, StorageAttributes::File(_))
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, StorageAttributes::Directory(_))
    }

    pub fn last_modified(&self) -> Option<i64> {
        match self {
            StorageAttributes::File(f) => f.last_modified,
            StorageAttributes::Directory(d) => d.last_modified,
        }
    }
}

/// Filesystem capability contract. Paths are relative to the backend's configured root.
#[async_trait]
pub trait FilesystemAdapter: Send + Sync {
    /// Short backend name used in errors and logs
    fn backend(&self) -> &'static str;

    async fn file_exists(&self, path: &str) -> Result<bool>;
    async fn directory_exists(&self, path: &str) -> Result<bool>;

    /// Create or overwrite a file
    async fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<()>;
    async fn write_stream(&self, path: &str, contents: ByteStream, options: &WriteOptions) -> Result<()>;

    /// Read a whole file by draining `read_stream`
    async fn read(&self, path: &str) -> Result<Bytes> {
        let mut stream = self.read_stream(path).await?;
        let mut contents = BytesMut::new();
        while let Some(chunk) = stream.try_next().await? {
            contents.extend_from_slice(&chunk);
        }
        Ok(contents.freeze())
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream>;

    async fn delete(&self, path: &str) -> Result<()>;
    async fn delete_directory(&self, path: &str) -> Result<()>;
    async fn create_directory(&self, path: &str, options: &WriteOptions) -> Result<()>;

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()>;
    async fn visibility(&self, path: &str) -> Result<FileAttributes>;
    async fn mime_type(&self, path: &str) -> Result<FileAttributes>;
    async fn last_modified(&self, path: &str) -> Result<FileAttributes>;
    async fn file_size(&self, path: &str) -> Result<FileAttributes>;

    /// List entries under `path`; `deep` descends into subdirectories.
    /// No work happens until the stream is polled.
    fn list_contents(&self, path: &str, deep: bool) -> ListingStream;

    async fn move_file(&self, source: &str, destination: &str, options: &WriteOptions) -> Result<()>;
    async fn copy(&self, source: &str, destination: &str, options: &WriteOptions) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_type_wire_names() {
        let parsed: PathType = serde_json::from_str("\"directory\"").unwrap();
        assert_eq!(parsed, PathType::Directory);
        let parsed: PathType = serde_json::from_str("\"none\"").unwrap();
        assert!(!parsed.is_file() && !parsed.is_dir());
    }

    #[test]
    fn test_attributes_skip_unset_fields() {
        let attrs = FileAttributes {
            file_size: Some(2),
            ..FileAttributes::new("a/b.txt")
        };
        let json = serde_json::to_value(StorageAttributes::File(attrs)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "file", "path": "a/b.txt", "file_size": 2})
        );
    }

    #[test]
    fn test_storage_attributes_accessors() {
        let dir = StorageAttributes::Directory(DirectoryAttributes {
            last_modified: Some(1_700_000_000),
            ..DirectoryAttributes::new("a/c")
        });
        assert!(dir.is_dir());
        assert_eq!(dir.path(), "a/c");
        assert_eq!(dir.last_modified(), Some(1_700_000_000));
    }
}
