//! Error types for archive reading and script conversion.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for conversion operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Input archive does not exist
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Invalid magic bytes at start of file
    #[error("Invalid Alembic file: expected Ogawa magic bytes")]
    InvalidMagic,

    /// File is truncated or corrupted
    #[error("Unexpected end of file at position {0}")]
    UnexpectedEof(u64),

    /// Invalid data structure in file
    #[error("Invalid file structure: {0}")]
    InvalidStructure(String),

    /// A single object cannot be interpreted as a camera, transform or locator
    #[error("Cannot interpret '{object}': {reason}")]
    Schema { object: String, reason: String },

    /// Caller supplied options that cannot describe a time grid
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Final output could not be written
    #[error("Cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cooperative stop requested by the caller
    #[error("Conversion cancelled")]
    Cancelled,

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MmapFailed(String),

    /// I/O error while reading
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 conversion error
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Configuration or report (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    /// Create a per-object schema error.
    pub fn schema(object: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            object: object.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an I/O error raised while producing the output file.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// True for errors that are recovered by skipping a single object.
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }
}

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, Error>;
