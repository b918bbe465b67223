use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShardError {
    #[error("Shard '{0}' is not configured")]
    UnknownShard(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Malformed routing key: {0}")]
    MalformedKey(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Pool timeout: {0}")]
    PoolTimeout(String),

    #[error("Pool closed: {0}")]
    Closed(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),
}

pub type Result<T> = std::result::Result<T, ShardError>;
