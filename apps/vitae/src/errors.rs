use std::path::PathBuf;

use thiserror::Error;

use crate::store::ProfileId;

/// Build-pipeline error type.
///
/// Every stage failure is caught at the profile boundary and folded into that
/// profile's `BuildResult`. Only `NotFound` for an explicitly requested id is
/// surfaced to the caller of `build_all` / `needs_update`.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    #[error("Failed to load profile '{id}' from {}: {reason}", path.display())]
    Load {
        id: ProfileId,
        path: PathBuf,
        reason: String,
    },

    #[error("Render error: {0}")]
    Render(String),

    #[error("PDF conversion error: {0}")]
    Conversion(String),

    #[error("Profile not found: {0}")]
    NotFound(ProfileId),

    #[error("{check} check unavailable: {reason}")]
    CheckUnavailable { check: String, reason: String },

    #[error("I/O error on {}: {reason}", path.display())]
    Io { path: PathBuf, reason: String },
}

impl BuildError {
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Short machine-friendly code, used in the run summary.
    pub fn code(&self) -> &'static str {
        match self {
            BuildError::Load { .. } => "LOAD_ERROR",
            BuildError::Render(_) => "RENDER_ERROR",
            BuildError::Conversion(_) => "CONVERSION_ERROR",
            BuildError::NotFound(_) => "NOT_FOUND",
            BuildError::CheckUnavailable { .. } => "CHECK_UNAVAILABLE",
            BuildError::Io { .. } => "IO_ERROR",
        }
    }
}
