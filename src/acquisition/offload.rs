//! Offload of verified products to object storage.
//!
//! A product leaves the staging directory and the queue only after every
//! configured destination accepted it. The archive copy is attempted only
//! once the primary copy succeeded.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::archive_key::{archive_key, primary_key, KeyLayout};
use super::error::AcquisitionError;
use super::integrity::discard;
use super::models::DownloadResult;
use super::queue_store::QueueStore;

/// Destination for offloaded files.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Refresh credentials before a batch of uploads.
    async fn prepare(&self) -> Result<(), AcquisitionError>;

    /// Upload a local file to `bucket` under `key`.
    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
    ) -> Result<(), AcquisitionError>;
}

/// Buckets and key layout for uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffloadTargets {
    pub primary_bucket: String,
    pub layout: KeyLayout,
    pub archive_bucket: Option<String>,
}

/// Outcome of one offload call.
#[derive(Debug, Default)]
pub struct OffloadReport {
    /// Identifiers removed from the queue.
    pub completed: Vec<String>,
    /// Identifiers kept in the queue, with the reason.
    pub failed: Vec<(String, AcquisitionError)>,
}

enum Mode {
    /// Keep verified files in the staging directory.
    KeepLocal,
    Upload {
        store: Arc<dyn ObjectStore>,
        targets: OffloadTargets,
    },
}

pub struct OffloadDispatcher {
    mode: Mode,
    queue: Arc<dyn QueueStore>,
}

impl OffloadDispatcher {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        targets: OffloadTargets,
        queue: Arc<dyn QueueStore>,
    ) -> Self {
        Self {
            mode: Mode::Upload { store, targets },
            queue,
        }
    }

    /// Dispatcher that only retires queue entries, leaving files in place.
    pub fn keep_local(queue: Arc<dyn QueueStore>) -> Self {
        Self {
            mode: Mode::KeepLocal,
            queue,
        }
    }

    /// Offload every verified result. Unverified results are ignored.
    ///
    /// Queue removals happen in memory; the caller persists the queue.
    pub async fn offload(&self, results: &[DownloadResult]) -> OffloadReport {
        let mut report = OffloadReport::default();
        let verified: Vec<&DownloadResult> = results.iter().filter(|r| r.is_verified()).collect();
        if verified.is_empty() {
            return report;
        }

        match &self.mode {
            Mode::KeepLocal => {
                for result in verified {
                    info!("Keeping {:?} in the staging directory", result.path);
                    self.queue.remove(&result.identifier);
                    report.completed.push(result.identifier.clone());
                }
            }
            Mode::Upload { store, targets } => {
                if let Err(e) = store.prepare().await {
                    error!(
                        "Could not prepare object store, keeping {} files for the next cycle: {}",
                        verified.len(),
                        e
                    );
                    for result in verified {
                        report.failed.push((
                            result.identifier.clone(),
                            AcquisitionError::Upload(e.to_string()),
                        ));
                    }
                    return report;
                }

                for result in verified {
                    match self.upload_one(store.as_ref(), targets, result).await {
                        Ok(()) => report.completed.push(result.identifier.clone()),
                        Err(e) if e.is_recoverable() => {
                            warn!(
                                "Offload of {} failed, file and queue entry kept: {}",
                                result.identifier, e
                            );
                            report.failed.push((result.identifier.clone(), e));
                        }
                        Err(e) => {
                            error!(
                                "{} cannot be offloaded until it is fixed by hand, file and queue entry kept: {}",
                                result.identifier, e
                            );
                            report.failed.push((result.identifier.clone(), e));
                        }
                    }
                }
            }
        }

        report
    }

    async fn upload_one(
        &self,
        store: &dyn ObjectStore,
        targets: &OffloadTargets,
        result: &DownloadResult,
    ) -> Result<(), AcquisitionError> {
        let file_name = result.file_name();
        let primary = primary_key(targets.layout, &file_name)?;
        let archive = match &targets.archive_bucket {
            Some(bucket) => Some((bucket, archive_key(&file_name)?)),
            None => None,
        };

        store
            .upload(&result.path, &targets.primary_bucket, &primary)
            .await?;
        info!(
            "Uploaded {} to s3://{}/{}",
            file_name, targets.primary_bucket, primary
        );

        if let Some((bucket, key)) = archive {
            store.upload(&result.path, bucket, &key).await?;
            info!("Uploaded {} to s3://{}/{}", file_name, bucket, key);
        }

        if let Err(e) = discard(&result.path).await {
            warn!("Uploaded file {:?} could not be deleted: {}", result.path, e);
        }
        self.queue.remove(&result.identifier);
        Ok(())
    }
}
