//! Error taxonomy for the acquisition engine.
//!
//! Every per-item failure is expressed as an [`AcquisitionError`] so the
//! orchestrator can decide, item by item, whether to skip, retry next cycle or
//! abandon a restore attempt. None of these variants terminate the process.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while acquiring or offloading a single product.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("product not found in catalogue: {0}")]
    NotFound(String),

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("size mismatch for {path:?}: expected {expected} bytes, got {actual} bytes")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("restore request failed: {0}")]
    Restore(String),

    #[error("malformed catalogue response: {0}")]
    MalformedResponse(String),

    #[error("unrecognized product name: {0}")]
    MalformedName(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AcquisitionError {
    /// Returns true if the item should simply be attempted again on a later pass.
    ///
    /// Everything is recoverable at the item level; the only distinction is
    /// whether trying again can change the outcome without outside intervention.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AcquisitionError::MalformedName(_))
    }

    /// Returns true if this error ends a restore attempt for the current cycle.
    pub fn is_restore_failure(&self) -> bool {
        matches!(
            self,
            AcquisitionError::Restore(_) | AcquisitionError::MalformedResponse(_)
        )
    }
}

impl From<reqwest::Error> for AcquisitionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AcquisitionError::MalformedResponse(err.to_string())
        } else {
            AcquisitionError::TransientNetwork(err.to_string())
        }
    }
}
