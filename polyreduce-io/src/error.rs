//! Error types for I/O operations

use thiserror::Error;

/// Errors that can occur during I/O operations
#[derive(Error, Debug)]
pub enum IoError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IoError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        IoError::ParseError {
            line,
            message: message.into(),
        }
    }
}

impl From<IoError> for polyreduce_core::Error {
    fn from(err: IoError) -> Self {
        match err {
            IoError::FileNotFound { path } => polyreduce_core::Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found: {path}"),
            )),
            IoError::ParseError { line, message } => {
                polyreduce_core::Error::Decode { line, message }
            }
            IoError::Io(e) => polyreduce_core::Error::Io(e),
        }
    }
}
