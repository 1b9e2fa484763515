//! Error types for the fallible edges of the logger (config and sinks).
//!
//! Detector and ledger operations never return these: they report
//! inconsistencies through `bool`/`Option` results plus a log line.

use thiserror::Error;

/// Invalid or incomplete configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field that must be set is empty
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A field has a value outside its valid range
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },

    /// Config file could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for the expected schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Failure of an output path (world state store, KnowRob, document files)
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport-level failure (connection refused, bad status, ...)
    #[error("transport error: {0}")]
    Transport(String),
}
