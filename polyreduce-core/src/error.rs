//! Error types for polyreduce

use thiserror::Error;

/// Main error type shared by the polyreduce crates
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Decode error at line {line}: {message}")]
    Decode { line: usize, message: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl Error {
    /// Whether this error originates from malformed input data
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Error::Decode { .. } | Error::InvalidData(_) | Error::UnsupportedFormat(_)
        )
    }
}

/// Result type alias for polyreduce operations
pub type Result<T> = std::result::Result<T, Error>;
