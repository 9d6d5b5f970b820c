// Storage capability contract shared by every backend

pub mod error;
pub mod filesystem;
pub mod mime;
pub mod path;

pub use error::{Operation, Result, StorageError};
pub use filesystem::{
    ByteStream, DirectoryAttributes, FileAttributes, FilesystemAdapter, ListingStream, PathType,
    StorageAttributes, Visibility, WriteOptions,
};
pub use mime::{ExtensionMimeTypeDetector, MimeTypeDetector};
pub use path::PathPrefixer;
