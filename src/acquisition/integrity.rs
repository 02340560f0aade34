//! Byte-count verification of staged product files.

use std::io::ErrorKind;
use std::path::Path;

use tracing::warn;

use super::error::AcquisitionError;
use super::models::VerificationOutcome;

/// State of a staged file before deciding whether to download it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalFileState {
    Absent,
    /// Present with the expected size.
    Complete(u64),
    /// Present with a different size (partial or corrupted transfer).
    Mismatched(u64),
}

/// Compares expected sizes against files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityVerifier {
    /// Accepted absolute difference in bytes. Zero means exact match.
    tolerance_bytes: u64,
}

impl IntegrityVerifier {
    pub fn new(tolerance_bytes: u64) -> Self {
        Self { tolerance_bytes }
    }

    pub fn exact() -> Self {
        Self::new(0)
    }

    pub fn matches(&self, expected: u64, actual: u64) -> bool {
        expected.abs_diff(actual) <= self.tolerance_bytes
    }

    /// Compare the size of `path` with `expected`.
    pub async fn verify(
        &self,
        path: &Path,
        expected: u64,
    ) -> Result<(VerificationOutcome, u64), AcquisitionError> {
        let actual = tokio::fs::metadata(path).await?.len();
        let outcome = if self.matches(expected, actual) {
            VerificationOutcome::Ok
        } else {
            VerificationOutcome::SizeMismatch
        };
        Ok((outcome, actual))
    }

    /// Inspect a possibly existing staged file.
    pub async fn inspect(
        &self,
        path: &Path,
        expected: u64,
    ) -> Result<LocalFileState, AcquisitionError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if self.matches(expected, meta.len()) => {
                Ok(LocalFileState::Complete(meta.len()))
            }
            Ok(meta) => Ok(LocalFileState::Mismatched(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(LocalFileState::Absent),
            Err(e) => Err(e.into()),
        }
    }
}

/// Delete a file that failed verification. A file that is already gone is not an error.
pub async fn discard(path: &Path) -> Result<(), AcquisitionError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("File {:?} was already removed", path);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
