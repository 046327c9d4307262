//! Error types for the rptx extraction library.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for RPT extraction operations.
///
/// Every variant corresponds to exactly one process exit code, so the CLI
/// layer maps errors without inspecting their payloads.
#[derive(Error, Debug)]
pub enum RptError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("invalid RPT file: {0}")]
    InvalidRpt(String),

    #[error("read error: {0}")]
    Read(#[source] std::io::Error),

    #[error("write error: {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid selection rule: {0}")]
    InvalidSelection(String),

    #[error("no pages selected")]
    NoPagesSelected,

    #[error("decompression error: {0}")]
    Decompression(String),

    #[error("memory error: {0}")]
    Memory(String),

    #[error("{0}")]
    Unknown(String),
}

impl RptError {
    /// Process exit code for this error kind.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArguments(_) => 1,
            Self::FileNotFound(_) => 2,
            Self::InvalidRpt(_) => 3,
            Self::Read(_) => 4,
            Self::Write { .. } => 5,
            Self::InvalidSelection(_) => 6,
            Self::NoPagesSelected => 7,
            Self::Decompression(_) => 8,
            Self::Memory(_) => 9,
            Self::Unknown(_) => 10,
        }
    }
}

/// Convenience Result type alias for RptError.
pub type Result<T> = std::result::Result<T, RptError>;
