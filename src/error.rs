//! Error types shared by the graph model, the finder and the FR utilities.

use thiserror::Error;

/// Main error type for frequented-region operations
#[derive(Error, Debug)]
pub enum FrError {
    /// I/O errors (missing files, permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tab-separated table errors raised by the csv reader/writer
    #[error("table error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid configuration (bounds, priority option, keep option grammar)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A node-set string that does not match `[id,id,...]`
    #[error("malformed node set string: {input}")]
    NodeSetFormat { input: String },

    /// A node id referenced by the caller that is not in the graph
    #[error("node {id} is not present in the graph")]
    MissingNode { id: u64 },

    /// Data-consistency errors (empty subpath, chromosome mismatch, bad label)
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Line-oriented parse errors in text inputs
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Failures writing `.npy` matrices
    #[error("npy error: {message}")]
    Npy { message: String },
}

/// Type alias for Results using FrError
pub type Result<T> = std::result::Result<T, FrError>;

impl FrError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}
