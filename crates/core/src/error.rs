use std::path::PathBuf;

/// A gallery document did not match the expected shape.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Malformed JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid {context}: {source}")]
    Invalid {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing required field '{field}' in {context}")]
    MissingField {
        context: String,
        field: &'static str,
    },

    #[error("{field} '{value}' cannot be used as a file name")]
    UnsafeId { field: &'static str, value: String },

    #[error("Invalid timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Invalid cache key '{0}'")]
    InvalidKey(String),

    #[error("Cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache entry {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure while writing an asset or one of its sidecars.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode sidecar {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
