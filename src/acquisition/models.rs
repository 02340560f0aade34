//! Data models for the acquisition engine.
//!
//! Defines work items, catalogue records, restore acknowledgements and
//! download results.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One entry of the persisted work queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    /// Product identifier, without the `.zip` extension.
    pub identifier: String,
    /// Grouping key (acquisition date) for grouped queue files.
    pub group: Option<String>,
}

impl WorkItem {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            group: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// Storage tier of a catalogue product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductTier {
    Online,   // immediately downloadable
    Archived, // needs a restore order first
}

impl ProductTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductTier::Online => "online",
            ProductTier::Archived => "archived",
        }
    }
}

/// Resolved catalogue metadata for a work item. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRecord {
    /// Internal catalogue id.
    pub pid: String,
    /// Display name, which is also the file name (e.g. `S2A_..._T32TQM_....zip`).
    pub name: String,
    /// Expected size in bytes.
    pub size: u64,
    pub tier: ProductTier,
    /// Where the product content is served from.
    pub content_url: String,
}

/// Acknowledgement of a restore order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreAck {
    pub status: String,
    pub message: String,
    /// Raw estimated completion time as reported by the catalogue.
    pub estimated_time: Option<String>,
}

impl RestoreAck {
    pub fn summary(&self) -> String {
        format!(
            "Status: {} Message: {} Estimated Restored Time: {}",
            self.status,
            self.message,
            self.estimated_time.as_deref().unwrap_or("unknown")
        )
    }
}

/// Outcome of comparing a local file against the expected size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Ok,
    SizeMismatch,
}

/// A product transferred (or found) in the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    /// Identifier of the work item this file satisfies.
    pub identifier: String,
    pub path: PathBuf,
    pub expected_size: u64,
    pub actual_size: u64,
    pub outcome: VerificationOutcome,
}

impl DownloadResult {
    pub fn is_verified(&self) -> bool {
        self.outcome == VerificationOutcome::Ok
    }

    /// File name component of the local path.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Render a byte count for log lines.
pub fn human_size(bytes: u64) -> String {
    format!("{:#}", byte_unit::Byte::from(bytes))
}

/// Per-pass counters, logged at the end of each cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub resolved: usize,
    pub not_found: usize,
    pub resolve_errors: usize,
    pub already_present: usize,
    pub partials_removed: usize,
    pub downloaded: usize,
    pub download_errors: usize,
    pub size_mismatches: usize,
    pub restores_requested: usize,
    pub restores_ready: usize,
    pub abandoned: usize,
    pub offloaded: usize,
    pub offload_failures: usize,
    /// Highest number of outstanding restore + download requests seen during the pass.
    pub peak_outstanding: usize,
    /// Queue length after the pass was persisted.
    pub remaining: usize,
}
