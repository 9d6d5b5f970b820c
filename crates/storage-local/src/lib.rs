// Local disk backend

pub mod filesystem;

pub use filesystem::{read_file_stream, LocalFilesystemAdapter};
