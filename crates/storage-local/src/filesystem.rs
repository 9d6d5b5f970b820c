use std::collections::VecDeque;
use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt, TryStreamExt};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use storage_platform::error::{Operation, Result, StorageError};
use storage_platform::filesystem::{
    ByteStream, DirectoryAttributes, FileAttributes, FilesystemAdapter, ListingStream,
    StorageAttributes, Visibility, WriteOptions,
};
use storage_platform::mime::{ExtensionMimeTypeDetector, MimeTypeDetector};
use storage_platform::path::normalize_path;

/// Chunk size for streamed reads (64 KB)
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Stream an open file in `READ_CHUNK_SIZE` chunks
pub fn read_file_stream(file: File, path: &str) -> ByteStream {
    let path = path.to_string();
    stream::try_unfold(file, move |mut file| {
        let path = path.clone();
        async move {
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            let n = file
                .read(&mut buf)
                .await
                .map_err(|e| StorageError::io(Operation::Read, &path, e))?;
            if n == 0 {
                return Ok::<_, StorageError>(None);
            }
            buf.truncate(n);
            Ok(Some((Bytes::from(buf), file)))
        }
    })
    .boxed()
}

/// Filesystem adapter over a local root directory
pub struct LocalFilesystemAdapter {
    root: PathBuf,
    mime_detector: Arc<dyn MimeTypeDetector>,
}

impl LocalFilesystemAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mime_detector: Arc::new(ExtensionMimeTypeDetector),
        }
    }

    pub fn with_mime_detector(mut self, detector: Arc<dyn MimeTypeDetector>) -> Self {
        self.mime_detector = detector;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn location(&self, path: &str) -> Result<PathBuf> {
        let relative = normalize_path(path)?;
        if relative.is_empty() {
            Ok(self.root.clone())
        } else {
            Ok(self.root.join(relative))
        }
    }

    async fn ensure_parent(
        &self,
        location: &Path,
        options: &WriteOptions,
        operation: Operation,
        path: &str,
    ) -> Result<()> {
        let Some(parent) = location.parent() else {
            return Ok(());
        };
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(operation, path, e))?;
        if let Some(visibility) = options.directory_visibility {
            apply_visibility(parent, visibility, true)
                .await
                .map_err(|e| StorageError::io(operation, path, e))?;
        }
        Ok(())
    }

    async fn stat(&self, operation: Operation, path: &str) -> Result<(PathBuf, Metadata)> {
        let location = self.location(path)?;
        let meta = fs::metadata(&location)
            .await
            .map_err(|e| StorageError::io(operation, path, e))?;
        Ok((location, meta))
    }

    async fn probe(&self, operation: Operation, path: &str) -> Result<Option<Metadata>> {
        let location = self.location(path)?;
        match fs::metadata(&location).await {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(operation, path, e)),
        }
    }
}

#[async_trait]
impl FilesystemAdapter for LocalFilesystemAdapter {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        let meta = self.probe(Operation::FileExists, path).await?;
        Ok(meta.is_some_and(|m| m.is_file()))
    }

    async fn directory_exists(&self, path: &str) -> Result<bool> {
        let meta = self.probe(Operation::DirectoryExists, path).await?;
        Ok(meta.is_some_and(|m| m.is_dir()))
    }

    async fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<()> {
        let location = self.location(path)?;
        self.ensure_parent(&location, options, Operation::Write, path).await?;
        fs::write(&location, contents)
            .await
            .map_err(|e| StorageError::io(Operation::Write, path, e))?;
        if let Some(visibility) = options.visibility {
            apply_visibility(&location, visibility, false)
                .await
                .map_err(|e| StorageError::io(Operation::Write, path, e))?;
        }
        tracing::debug!("local write: {} ({} bytes)", location.display(), contents.len());
        Ok(())
    }

    async fn write_stream(&self, path: &str, mut contents: ByteStream, options: &WriteOptions) -> Result<()> {
        let location = self.location(path)?;
        self.ensure_parent(&location, options, Operation::Write, path).await?;
        let mut file = File::create(&location)
            .await
            .map_err(|e| StorageError::io(Operation::Write, path, e))?;

        let mut written = 0usize;
        while let Some(chunk) = contents.try_next().await? {
            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::io(Operation::Write, path, e))?;
            written += chunk.len();
        }
        file.flush()
            .await
            .map_err(|e| StorageError::io(Operation::Write, path, e))?;

        if let Some(visibility) = options.visibility {
            apply_visibility(&location, visibility, false)
                .await
                .map_err(|e| StorageError::io(Operation::Write, path, e))?;
        }
        tracing::debug!("local write stream: {} ({} bytes)", location.display(), written);
        Ok(())
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream> {
        let location = self.location(path)?;
        let file = File::open(&location)
            .await
            .map_err(|e| StorageError::io(Operation::Read, path, e))?;
        Ok(read_file_stream(file, path))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let location = self.location(path)?;
        match fs::remove_file(&location).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("delete: {} already absent", location.display());
                Ok(())
            }
            Err(e) => Err(StorageError::io(Operation::Delete, path, e)),
        }
    }

    async fn delete_directory(&self, path: &str) -> Result<()> {
        let location = self.location(path)?;
        match fs::remove_dir_all(&location).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(Operation::DeleteDirectory, path, e)),
        }
    }

    async fn create_directory(&self, path: &str, options: &WriteOptions) -> Result<()> {
        let location = self.location(path)?;
        fs::create_dir_all(&location)
            .await
            .map_err(|e| StorageError::io(Operation::CreateDirectory, path, e))?;
        if let Some(visibility) = options.directory_visibility {
            apply_visibility(&location, visibility, true)
                .await
                .map_err(|e| StorageError::io(Operation::CreateDirectory, path, e))?;
        }
        Ok(())
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        if !cfg!(unix) {
            return Err(StorageError::UnsupportedOperation {
                operation: Operation::SetVisibility,
                backend: self.backend(),
            });
        }
        let (location, meta) = self.stat(Operation::SetVisibility, path).await?;
        apply_visibility(&location, visibility, meta.is_dir())
            .await
            .map_err(|e| StorageError::io(Operation::SetVisibility, path, e))
    }

    async fn visibility(&self, path: &str) -> Result<FileAttributes> {
        let (_, meta) = self.stat(Operation::Visibility, path).await?;
        Ok(FileAttributes {
            visibility: visibility_of(&meta),
            ..FileAttributes::new(normalize_path(path)?)
        })
    }

    async fn mime_type(&self, path: &str) -> Result<FileAttributes> {
        if !self.file_exists(path).await? {
            return Err(StorageError::metadata_unavailable(
                Operation::MimeType,
                path,
                "file does not exist",
            ));
        }
        let normalized = normalize_path(path)?;
        let mime_type = self.mime_detector.detect_from_path(&normalized).ok_or_else(|| {
            StorageError::metadata_unavailable(Operation::MimeType, path, "unknown mime type")
        })?;
        Ok(FileAttributes {
            mime_type: Some(mime_type),
            ..FileAttributes::new(normalized)
        })
    }

    async fn last_modified(&self, path: &str) -> Result<FileAttributes> {
        let (_, meta) = self.stat(Operation::LastModified, path).await?;
        let last_modified = modified_secs(&meta).ok_or_else(|| {
            StorageError::metadata_unavailable(
                Operation::LastModified,
                path,
                "modification time not reported",
            )
        })?;
        Ok(FileAttributes {
            last_modified: Some(last_modified),
            ..FileAttributes::new(normalize_path(path)?)
        })
    }

    async fn file_size(&self, path: &str) -> Result<FileAttributes> {
        let (_, meta) = self.stat(Operation::FileSize, path).await?;
        if meta.is_dir() {
            return Err(StorageError::metadata_unavailable(
                Operation::FileSize,
                path,
                "path is a directory",
            ));
        }
        Ok(FileAttributes {
            file_size: Some(meta.len()),
            ..FileAttributes::new(normalize_path(path)?)
        })
    }

    fn list_contents(&self, path: &str, deep: bool) -> ListingStream {
        let root = self.root.clone();
        let start = self.location(path);
        let path = path.to_string();

        stream::once(async move {
            let start = start?;
            let children = read_sorted_dir(&start)
                .await
                .map_err(|e| StorageError::io(Operation::ListContents, &path, e))?;
            let walk = Walk {
                root,
                deep,
                stack: vec![children],
            };
            Ok::<_, StorageError>(walk.into_stream())
        })
        .try_flatten()
        .boxed()
    }

    async fn move_file(&self, source: &str, destination: &str, options: &WriteOptions) -> Result<()> {
        let from = self.location(source)?;
        let to = self.location(destination)?;
        self.ensure_parent(&to, options, Operation::Move, destination).await?;
        fs::rename(&from, &to)
            .await
            .map_err(|e| StorageError::io(Operation::Move, source, e))?;
        tracing::info!("moved {} -> {}", from.display(), to.display());
        Ok(())
    }

    async fn copy(&self, source: &str, destination: &str, options: &WriteOptions) -> Result<()> {
        let from = self.location(source)?;
        let to = self.location(destination)?;
        self.ensure_parent(&to, options, Operation::Copy, destination).await?;
        fs::copy(&from, &to)
            .await
            .map_err(|e| StorageError::io(Operation::Copy, source, e))?;
        if let Some(visibility) = options.visibility {
            apply_visibility(&to, visibility, false)
                .await
                .map_err(|e| StorageError::io(Operation::Copy, destination, e))?;
        }
        Ok(())
    }
}

/// A directory child; `metadata` follows symlinks, `linked` records whether the entry was one
struct WalkEntry {
    path: PathBuf,
    metadata: Metadata,
    linked: bool,
}

/// Depth-first directory walk, one directory read at a time.
/// Symlinked directories are listed but never descended into.
struct Walk {
    root: PathBuf,
    deep: bool,
    stack: Vec<VecDeque<WalkEntry>>,
}

impl Walk {
    fn into_stream(self) -> ListingStream {
        stream::try_unfold(self, |mut walk| async move {
            loop {
                let Some(level) = walk.stack.last_mut() else {
                    return Ok::<_, StorageError>(None);
                };
                let Some(WalkEntry {
                    path,
                    metadata: meta,
                    linked,
                }) = level.pop_front()
                else {
                    walk.stack.pop();
                    continue;
                };
                if walk.deep && meta.is_dir() && !linked {
                    let children = read_sorted_dir(&path).await.map_err(|e| {
                        StorageError::io(Operation::ListContents, &path.to_string_lossy(), e)
                    })?;
                    walk.stack.push(children);
                }
                let attrs = to_attributes(&walk.root, &path, &meta);
                return Ok(Some((attrs, walk)));
            }
        })
        .boxed()
    }
}

async fn read_sorted_dir(dir: &Path) -> std::io::Result<VecDeque<WalkEntry>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut result = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let linked = entry.file_type().await?.is_symlink();
        match fs::metadata(&path).await {
            Ok(metadata) => result.push(WalkEntry {
                path,
                metadata,
                linked,
            }),
            Err(e) => {
                tracing::warn!("skipping {}: {}", path.display(), e);
            }
        }
    }
    result.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(result.into())
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn modified_secs(meta: &Metadata) -> Option<i64> {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
}

fn to_attributes(root: &Path, path: &Path, meta: &Metadata) -> StorageAttributes {
    let relative = relative_path(root, path);
    if meta.is_dir() {
        StorageAttributes::Directory(DirectoryAttributes {
            path: relative,
            visibility: visibility_of(meta),
            last_modified: modified_secs(meta),
        })
    } else {
        StorageAttributes::File(FileAttributes {
            path: relative,
            file_size: Some(meta.len()),
            visibility: visibility_of(meta),
            last_modified: modified_secs(meta),
            mime_type: None,
        })
    }
}

#[cfg(unix)]
async fn apply_visibility(path: &Path, visibility: Visibility, is_dir: bool) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = match (visibility, is_dir) {
        (Visibility::Public, false) => 0o644,
        (Visibility::Private, false) => 0o600,
        (Visibility::Public, true) => 0o755,
        (Visibility::Private, true) => 0o700,
    };
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn apply_visibility(_path: &Path, _visibility: Visibility, _is_dir: bool) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn visibility_of(meta: &Metadata) -> Option<Visibility> {
    use std::os::unix::fs::PermissionsExt;

    // world-readable means public
    if meta.permissions().mode() & 0o004 != 0 {
        Some(Visibility::Public)
    } else {
        Some(Visibility::Private)
    }
}

#[cfg(not(unix))]
fn visibility_of(_meta: &Metadata) -> Option<Visibility> {
    None
}
