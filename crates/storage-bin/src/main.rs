use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures_util::TryStreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use storage_core::{build_adapter, BackendKind, StorageConfig};
use storage_local::read_file_stream;
use storage_platform::path::normalize_path;
use storage_platform::{
    DirectoryAttributes, FilesystemAdapter, StorageAttributes, StorageError, Visibility,
    WriteOptions,
};

#[derive(Parser, Debug)]
#[command(name = "hdfs-storage")]
#[command(about = "File storage through an HDFS HTTP gateway")]
#[command(version)]
struct Cli {
    /// Gateway base URL (e.g., http://gateway:8080)
    #[arg(long, env = "HDFS_GATEWAY_URL", global = true)]
    gateway_url: Option<String>,

    /// Root path every storage path is resolved under
    #[arg(long, env = "HDFS_STORAGE_ROOT", global = true)]
    root: Option<String>,

    /// Storage backend (hdfs or local)
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Path to config file
    #[arg(long, env = "HDFS_STORAGE_CONFIG", global = true)]
    config_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "HDFS_STORAGE_LOG_LEVEL", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report whether a path is a file, a directory or missing
    Exists { path: String },
    /// Write a file's contents to stdout
    Cat { path: String },
    /// Download a file to a local path
    Get { path: String, output: PathBuf },
    /// Upload a local file
    Put {
        input: PathBuf,
        path: String,
        /// Restrict the uploaded file to its owner (local backend only)
        #[arg(long)]
        private: bool,
    },
    /// List a directory, one JSON record per line
    Ls {
        #[arg(default_value = "")]
        path: String,
        /// Include all descendants
        #[arg(long)]
        deep: bool,
    },
    /// Create a directory and any missing parents
    Mkdir { path: String },
    /// Delete a file, or a directory with --dir
    Rm {
        path: String,
        #[arg(long)]
        dir: bool,
    },
    /// Print the metadata the backend can report for a path
    Stat { path: String },
    /// Move a file
    Mv { source: String, destination: String },
    /// Copy a file
    Cp { source: String, destination: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr, command output to stdout
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("hdfs-storage v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path = cli
        .config_path
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(StorageConfig::default_path);

    let mut config = if config_path.exists() {
        info!("loading config from {}", config_path.display());
        StorageConfig::load(&config_path)?
    } else {
        debug!("no config at {}, using defaults", config_path.display());
        StorageConfig::default()
    };

    // CLI args override config file
    if let Some(url) = cli.gateway_url {
        config.gateway_url = url;
    }
    if let Some(root) = cli.root {
        config.root = root;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(timeout) = cli.timeout_secs {
        config.timeout_secs = timeout;
    }

    let adapter = build_adapter(&config).context("failed to set up storage")?;
    run_command(adapter.as_ref(), cli.command).await
}

async fn run_command(adapter: &dyn FilesystemAdapter, command: Commands) -> Result<()> {
    match command {
        Commands::Exists { path } => {
            let kind = if adapter.file_exists(&path).await? {
                "file"
            } else if adapter.directory_exists(&path).await? {
                "directory"
            } else {
                "none"
            };
            println!("{}", kind);
        }
        Commands::Cat { path } => {
            let mut body = adapter.read_stream(&path).await?;
            let mut stdout = tokio::io::stdout();
            while let Some(chunk) = body.try_next().await? {
                stdout.write_all(&chunk).await?;
            }
            stdout.flush().await?;
        }
        Commands::Get { path, output } => {
            let mut body = adapter.read_stream(&path).await?;
            let mut file = tokio::fs::File::create(&output)
                .await
                .with_context(|| format!("failed to create {}", output.display()))?;
            let mut written = 0u64;
            while let Some(chunk) = body.try_next().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            info!("downloaded {} ({} bytes) to {}", path, written, output.display());
        }
        Commands::Put {
            input,
            path,
            private,
        } => {
            let file = tokio::fs::File::open(&input)
                .await
                .with_context(|| format!("failed to open {}", input.display()))?;
            let options = if private {
                WriteOptions::with_visibility(Visibility::Private)
            } else {
                WriteOptions::default()
            };
            let contents = read_file_stream(file, &input.to_string_lossy());
            adapter.write_stream(&path, contents, &options).await?;
            info!("uploaded {} to {}", input.display(), path);
        }
        Commands::Ls { path, deep } => {
            let mut entries = adapter.list_contents(&path, deep);
            while let Some(entry) = entries.try_next().await? {
                println!("{}", serde_json::to_string(&entry)?);
            }
        }
        Commands::Mkdir { path } => {
            adapter
                .create_directory(&path, &WriteOptions::default())
                .await?;
        }
        Commands::Rm { path, dir } => {
            if dir {
                adapter.delete_directory(&path).await?;
            } else {
                adapter.delete(&path).await?;
            }
        }
        Commands::Stat { path } => {
            let attributes = stat(adapter, &path).await?;
            println!("{}", serde_json::to_string_pretty(&attributes)?);
        }
        Commands::Mv {
            source,
            destination,
        } => {
            adapter
                .move_file(&source, &destination, &WriteOptions::default())
                .await?;
        }
        Commands::Cp {
            source,
            destination,
        } => {
            adapter
                .copy(&source, &destination, &WriteOptions::default())
                .await?;
        }
    }
    Ok(())
}

async fn stat(adapter: &dyn FilesystemAdapter, path: &str) -> Result<StorageAttributes> {
    if adapter.directory_exists(path).await? {
        return Ok(StorageAttributes::Directory(DirectoryAttributes::new(
            normalize_path(path)?,
        )));
    }

    let mut attributes = adapter.last_modified(path).await?;
    attributes.visibility = adapter.visibility(path).await?.visibility;
    attributes.file_size = adapter.file_size(path).await?.file_size;
    attributes.mime_type = mime_type(adapter, path).await?;
    Ok(StorageAttributes::File(attributes))
}

/// MIME type of an existing file, or `None` when it cannot be detected
async fn mime_type(adapter: &dyn FilesystemAdapter, path: &str) -> Result<Option<String>> {
    match adapter.mime_type(path).await {
        Ok(found) => Ok(found.mime_type),
        Err(StorageError::MetadataUnavailable { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "hdfs-storage",
            "ls",
            "a",
            "--deep",
            "--backend",
            "local",
            "--root",
            "/srv",
        ])
        .unwrap();
        assert_eq!(cli.backend, Some(BackendKind::Local));
        assert_eq!(cli.root.as_deref(), Some("/srv"));
        assert!(matches!(cli.command, Commands::Ls { ref path, deep: true } if path == "a"));
    }

    #[test]
    fn test_rejects_unknown_backend() {
        assert!(Cli::try_parse_from(["hdfs-storage", "--backend", "s3", "exists", "a"]).is_err());
    }

    #[tokio::test]
    async fn test_stat_distinguishes_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = storage_local::LocalFilesystemAdapter::new(dir.path());
        adapter
            .write("docs/readme.txt", b"hello", &WriteOptions::default())
            .await
            .unwrap();

        match stat(&adapter, "docs/readme.txt").await.unwrap() {
            StorageAttributes::File(file) => {
                assert_eq!(file.file_size, Some(5));
                assert_eq!(file.mime_type.as_deref(), Some("text/plain"));
                assert!(file.last_modified.is_some());
            }
            other => panic!("expected a file, got {:?}", other),
        }
        assert!(stat(&adapter, "docs").await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_stat_tolerates_only_undetectable_mime_types() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = storage_local::LocalFilesystemAdapter::new(dir.path());
        adapter
            .write("blob", b"??", &WriteOptions::default())
            .await
            .unwrap();

        match stat(&adapter, "blob").await.unwrap() {
            StorageAttributes::File(file) => {
                assert_eq!(file.mime_type, None);
                assert_eq!(file.file_size, Some(2));
            }
            other => panic!("expected a file, got {:?}", other),
        }
        assert!(mime_type(&adapter, "../outside.txt").await.is_err());
    }
}
