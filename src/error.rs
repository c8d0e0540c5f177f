use std::path::PathBuf;
use thiserror::Error;

use crate::io::coordsys::CoordSys;
use crate::io::GiftiError;

pub type Result<T> = std::result::Result<T, MsmError>;

/// Errors raised by the preparation / invocation / reload pipeline.
///
/// None of these are caught inside the pipeline; they surface to the caller of
/// `fit`, `transform` or `score` as-is.
#[derive(Debug, Error)]
pub enum MsmError {
    #[error(
        "Provided data is in different coordsys than the mesh (darray {index}): expected {expected}, found {found}"
    )]
    CoordinateSystemMismatch {
        index: usize,
        expected: CoordSys,
        found: CoordSys,
    },

    #[error("Failed to run MSM with command:\n{command}\n{reason}")]
    ExternalToolFailure { command: String, reason: String },

    #[error(
        "Command exited successfully but its output {} is missing or unreadable ({reason}):\n{command}",
        path.display()
    )]
    OutputNotFound {
        path: PathBuf,
        command: String,
        reason: String,
    },

    #[error("Source and reference lists differ in length: {n_source} vs {n_reference}")]
    LengthMismatch { n_source: usize, n_reference: usize },

    #[error("Contrast map {index} has {got} values but the mesh has {expected} vertices")]
    VertexCountMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },

    #[error("No {0} data supplied")]
    EmptyInput(&'static str),

    #[error("Mesh {} has no darrays to read a coordsys from", .0.display())]
    EmptyMesh(PathBuf),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Gifti(#[from] GiftiError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MsmError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Full command line carried by tool-related errors.
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::ExternalToolFailure { command, .. } | Self::OutputNotFound { command, .. } => {
                Some(command)
            }
            _ => None,
        }
    }
}
