use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReshardError {
    #[error("Invalid bucket set: {0}")]
    InvalidBucketSet(String),

    #[error("Bucket '{0}' already exists")]
    DuplicateBucket(String),

    #[error("Bucket '{0}' not found")]
    BucketNotFound(String),

    #[error("Insufficient buckets: {requested} replicas requested but only {available} buckets available")]
    InsufficientBuckets { requested: usize, available: usize },

    #[error("No source candidates for key '{key}' (needs copies on {targets:?})")]
    NoSourceCandidates { key: String, targets: Vec<String> },

    #[error("Invalid operation '{0}': expected 'add' or 'del'")]
    InvalidOperation(String),

    #[error("Key '{0}' not present in mapping")]
    KeyNotMapped(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type ReshardResult<T> = Result<T, ReshardError>;

impl serde::Serialize for ReshardError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
