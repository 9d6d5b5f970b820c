use std::fmt;

use thiserror::Error;

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// Boxed source error for transport failures, keeps this crate free of any HTTP client
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Capability contract operation, carried by every error for context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FileExists,
    DirectoryExists,
    Write,
    Read,
    Delete,
    DeleteDirectory,
    CreateDirectory,
    SetVisibility,
    Visibility,
    MimeType,
    LastModified,
    FileSize,
    ListContents,
    Move,
    Copy,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::FileExists => "file_exists",
            Operation::DirectoryExists => "directory_exists",
            Operation::Write => "write",
            Operation::Read => "read",
            Operation::Delete => "delete",
            Operation::DeleteDirectory => "delete_directory",
            Operation::CreateDirectory => "create_directory",
            Operation::SetVisibility => "set_visibility",
            Operation::Visibility => "visibility",
            Operation::MimeType => "mime_type",
            Operation::LastModified => "last_modified",
            Operation::FileSize => "file_size",
            Operation::ListContents => "list_contents",
            Operation::Move => "move",
            Operation::Copy => "copy",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{operation} {path}: transport error: {source}")]
    Transport {
        operation: Operation,
        path: String,
        #[source]
        source: BoxError,
    },
    #[error("{operation} {path}: gateway returned HTTP {status}: {message}")]
    Gateway {
        operation: Operation,
        path: String,
        status: u16,
        message: String,
    },
    #[error("{operation} {path}: invalid gateway response: {reason}")]
    InvalidResponse {
        operation: Operation,
        path: String,
        reason: String,
    },
    #[error("{operation} {path}: metadata unavailable: {reason}")]
    MetadataUnavailable {
        operation: Operation,
        path: String,
        reason: String,
    },
    #[error("{operation} is not supported by the {backend} backend")]
    UnsupportedOperation {
        operation: Operation,
        backend: &'static str,
    },
    #[error("{operation} {path}: {source}")]
    Io {
        operation: Operation,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("path traversal detected: {0}")]
    PathTraversal(String),
    #[error("invalid path: {0:?}")]
    InvalidPath(String),
    #[error("invalid storage configuration: {0}")]
    Config(String),
}

impl StorageError {
    pub fn transport(operation: Operation, path: &str, source: impl Into<BoxError>) -> Self {
        StorageError::Transport {
            operation,
            path: path.to_string(),
            source: source.into(),
        }
    }

    pub fn invalid_response(operation: Operation, path: &str, reason: impl fmt::Display) -> Self {
        StorageError::InvalidResponse {
            operation,
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn metadata_unavailable(operation: Operation, path: &str, reason: impl Into<String>) -> Self {
        StorageError::MetadataUnavailable {
            operation,
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub fn io(operation: Operation, path: &str, source: std::io::Error) -> Self {
        StorageError::Io {
            operation,
            path: path.to_string(),
            source,
        }
    }

    /// The operation that failed, when the error is tied to one
    pub fn operation(&self) -> Option<Operation> {
        match self {
            StorageError::Transport { operation, .. }
            | StorageError::Gateway { operation, .. }
            | StorageError::InvalidResponse { operation, .. }
            | StorageError::MetadataUnavailable { operation, .. }
            | StorageError::UnsupportedOperation { operation, .. }
            | StorageError::Io { operation, .. } => Some(*operation),
            StorageError::PathTraversal(_) | StorageError::InvalidPath(_) | StorageError::Config(_) => None,
        }
    }

    /// True for a gateway 404 or a local `NotFound`
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::Gateway { status, .. } => *status == 404,
            StorageError::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_operation_and_path() {
        let err = StorageError::Gateway {
            operation: Operation::Read,
            path: "a/b.txt".to_string(),
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "read a/b.txt: gateway returned HTTP 500: boom"
        );
        assert_eq!(err.operation(), Some(Operation::Read));
    }

    #[test]
    fn test_unsupported_message() {
        let err = StorageError::UnsupportedOperation {
            operation: Operation::Move,
            backend: "hdfs",
        };
        assert_eq!(err.to_string(), "move is not supported by the hdfs backend");
    }

    #[test]
    fn test_not_found_detection() {
        let gateway = StorageError::Gateway {
            operation: Operation::Read,
            path: "x".to_string(),
            status: 404,
            message: String::new(),
        };
        assert!(gateway.is_not_found());

        let io = StorageError::io(
            Operation::Read,
            "x",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(io.is_not_found());
        assert!(!StorageError::PathTraversal("..".to_string()).is_not_found());
    }
}
