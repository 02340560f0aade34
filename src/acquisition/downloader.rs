//! Bounded concurrent download of product batches.
//!
//! Every product is written straight to its final staging path, which is
//! derived from the queue identifier alone. A transfer that does not verify
//! is deleted before the batch returns, so no unverified file survives a batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::catalogue::CatalogueClient;
use super::error::AcquisitionError;
use super::integrity::{discard, IntegrityVerifier};
use super::models::{human_size, DownloadResult, ProductRecord, VerificationOutcome};

/// An online product selected for download.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub identifier: String,
    pub record: ProductRecord,
}

/// Result of one batch entry.
pub type EntryOutcome = (String, Result<DownloadResult, AcquisitionError>);

pub struct Downloader {
    catalogue: Arc<dyn CatalogueClient>,
    verifier: IntegrityVerifier,
    staging_dir: PathBuf,
    concurrency: usize,
}

impl Downloader {
    pub fn new(
        catalogue: Arc<dyn CatalogueClient>,
        verifier: IntegrityVerifier,
        staging_dir: PathBuf,
        concurrency: usize,
    ) -> Self {
        Self {
            catalogue,
            verifier,
            staging_dir,
            concurrency: concurrency.max(1),
        }
    }

    pub fn verifier(&self) -> &IntegrityVerifier {
        &self.verifier
    }

    /// Staging path of a queue identifier: `<staging_dir>/<identifier>.zip`.
    pub fn staging_path(&self, identifier: &str) -> PathBuf {
        self.staging_dir.join(format!("{}.zip", identifier))
    }

    /// Download all entries with at most `min(concurrency, batch len)` transfers in flight.
    ///
    /// Returns once every transfer has finished. Order of results is unspecified.
    pub async fn download_batch(&self, entries: Vec<BatchEntry>) -> Vec<EntryOutcome> {
        if entries.is_empty() {
            return Vec::new();
        }

        let workers = self.concurrency.min(entries.len());
        info!(
            "Downloading batch of {} products with {} workers",
            entries.len(),
            workers
        );

        stream::iter(entries)
            .map(|entry| async move {
                let identifier = entry.identifier.clone();
                let result = self.download_one(&entry).await;
                (identifier, result)
            })
            .buffer_unordered(workers)
            .collect()
            .await
    }

    async fn download_one(&self, entry: &BatchEntry) -> Result<DownloadResult, AcquisitionError> {
        let record = &entry.record;
        let path = self.staging_path(&entry.identifier);
        info!("Downloading {} ({})", record.name, human_size(record.size));

        let content = self.catalogue.fetch_content(record).await?;
        if let Some(declared) = content.declared_len {
            if !self.verifier.matches(record.size, declared) {
                warn!(
                    "Declared length of {} is {} bytes but catalogue size is {} bytes, aborting",
                    record.name, declared, record.size
                );
                return Err(AcquisitionError::SizeMismatch {
                    path,
                    expected: record.size,
                    actual: declared,
                });
            }
        }

        if let Err(e) = write_stream(&path, content.stream).await {
            warn!(
                "Transfer of {} failed: {}. Deleting the partial download",
                record.name, e
            );
            discard(&path).await?;
            return Err(e);
        }

        let (outcome, actual_size) = self.verifier.verify(&path, record.size).await?;
        if outcome == VerificationOutcome::SizeMismatch {
            warn!(
                "File: {} Expected Size: {} Downloaded Size: {} do not agree. Deleting the partial download",
                record.name,
                human_size(record.size),
                human_size(actual_size)
            );
            discard(&path).await?;
        } else {
            info!("Finished download of {}", record.name);
        }

        Ok(DownloadResult {
            identifier: entry.identifier.clone(),
            path,
            expected_size: record.size,
            actual_size,
            outcome,
        })
    }
}

async fn write_stream(
    path: &Path,
    mut stream: futures::stream::BoxStream<'static, Result<bytes::Bytes, AcquisitionError>>,
) -> Result<(), AcquisitionError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    debug!("Wrote {} bytes to {:?}", written, path);
    Ok(())
}
