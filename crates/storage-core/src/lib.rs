pub mod config;
pub mod gateway;
pub mod hdfs;
pub mod listing;
pub mod storage;

pub use config::{BackendKind, StorageConfig};
pub use gateway::GatewayClient;
pub use hdfs::HdfsAdapter;
pub use storage::build_adapter;
