//! Acquisition cycle driver.
//!
//! One cycle walks the queue in order, routes every resolvable product to
//! either the download batch or a restore order, and then waits for the
//! restore orders to complete. All per-cycle counters and the pending batch
//! live in a [`CycleContext`] that is created fresh for every pass.

use std::collections::HashSet;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::catalogue::CatalogueClient;
use super::clock::Clock;
use super::downloader::{BatchEntry, Downloader};
use super::error::AcquisitionError;
use super::integrity::{discard, LocalFileState};
use super::models::{
    human_size, CycleReport, DownloadResult, ProductTier, VerificationOutcome, WorkItem,
};
use super::offload::OffloadDispatcher;
use super::queue_store::QueueStore;
use super::restore_tracker::{RestoreState, RestoreTracker};
use super::retry_policy::RestorePolicy;

/// Scheduling knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Ceiling on outstanding restore orders plus queued downloads in one cycle.
    pub max_requests: usize,
    /// Number of products downloaded together.
    pub batch_size: usize,
    /// Minimum time between the start of two cycles.
    pub cycle_interval: Duration,
    /// Stop after a single cycle.
    pub run_once: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_requests: 20,
            batch_size: 50,
            cycle_interval: Duration::from_secs(60 * 60),
            run_once: false,
        }
    }
}

/// Working state of a single pass.
#[derive(Default)]
struct CycleContext {
    report: CycleReport,
    /// Online products waiting to be downloaded.
    batch: Vec<BatchEntry>,
    /// Verified files waiting to be offloaded.
    ready: Vec<DownloadResult>,
    /// Identifiers already routed in this pass.
    seen: HashSet<String>,
}

pub struct Orchestrator {
    catalogue: Arc<dyn CatalogueClient>,
    queue: Arc<dyn QueueStore>,
    downloader: Downloader,
    dispatcher: OffloadDispatcher,
    tracker: RestoreTracker,
    clock: Arc<dyn Clock>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        catalogue: Arc<dyn CatalogueClient>,
        queue: Arc<dyn QueueStore>,
        downloader: Downloader,
        dispatcher: OffloadDispatcher,
        policy: RestorePolicy,
        clock: Arc<dyn Clock>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            catalogue,
            queue,
            downloader,
            dispatcher,
            tracker: RestoreTracker::new(policy, clock.clone()),
            clock,
            settings,
        }
    }

    /// Run cycles until the queue is empty, or a single cycle when configured so.
    ///
    /// Consecutive cycles start at least `cycle_interval` apart.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let started = self.clock.now();
            let report = self.run_cycle().await?;

            if report.remaining == 0 {
                info!("Queue is empty, nothing left to acquire");
                return Ok(());
            }
            if self.settings.run_once {
                info!("{} items left in the queue", report.remaining);
                return Ok(());
            }

            let interval = chrono::Duration::from_std(self.settings.cycle_interval)
                .unwrap_or_else(|_| chrono::Duration::zero());
            let next_start = started + interval;
            let wait = (next_start - self.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            if !wait.is_zero() {
                info!("Next query at {}", next_start.format("%Y-%m-%d %H:%M:%S"));
                self.clock.sleep(wait).await;
            }
        }
    }

    /// Run one full pass over the queue.
    ///
    /// Per-item failures are counted in the report. Only a queue file that
    /// cannot be written makes this return an error.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.tracker.begin_cycle();
        let mut ctx = CycleContext::default();
        let items = self.queue.items();
        info!("{} files to download", items.len());

        for (index, item) in items.iter().enumerate() {
            if self.outstanding(&ctx) >= self.settings.max_requests {
                self.flush(&mut ctx).await?;
                if self.outstanding(&ctx) >= self.settings.max_requests {
                    info!(
                        "{} requests outstanding, deferring the remaining {} items to the next cycle",
                        self.outstanding(&ctx),
                        items.len() - index
                    );
                    break;
                }
            }

            self.route(item, &mut ctx).await;
            self.note_outstanding(&mut ctx);

            let is_last = index + 1 == items.len();
            if ctx.batch.len() >= self.settings.batch_size || is_last {
                self.flush(&mut ctx).await?;
            }
        }
        self.flush(&mut ctx).await?;

        self.wait_for_restores(&mut ctx).await?;

        self.queue.persist().context("Failed to persist queue at end of cycle")?;
        ctx.report.remaining = self.queue.len();
        log_report(&ctx.report);
        Ok(ctx.report)
    }

    fn outstanding(&self, ctx: &CycleContext) -> usize {
        self.tracker.outstanding_count() + ctx.batch.len()
    }

    fn note_outstanding(&self, ctx: &mut CycleContext) {
        let outstanding = self.outstanding(ctx);
        if outstanding > ctx.report.peak_outstanding {
            ctx.report.peak_outstanding = outstanding;
        }
    }

    /// Decide what to do with one queue item.
    async fn route(&mut self, item: &WorkItem, ctx: &mut CycleContext) {
        let identifier = item.identifier.as_str();
        if !ctx.seen.insert(identifier.to_string()) {
            debug!("{} already handled in this cycle", identifier);
            return;
        }

        let record = match self.catalogue.resolve(identifier).await {
            Ok(record) => record,
            Err(AcquisitionError::NotFound(_)) => {
                info!("{} is not available via the catalogue", identifier);
                ctx.report.not_found += 1;
                return;
            }
            Err(e) => {
                warn!("Could not resolve {}: {}. Retrying next cycle", identifier, e);
                ctx.report.resolve_errors += 1;
                return;
            }
        };
        ctx.report.resolved += 1;

        let path = self.downloader.staging_path(identifier);
        match self.downloader.verifier().inspect(&path, record.size).await {
            Ok(LocalFileState::Complete(actual)) => {
                info!("{} has already been downloaded", record.name);
                ctx.report.already_present += 1;
                ctx.ready.push(DownloadResult {
                    identifier: identifier.to_string(),
                    path,
                    expected_size: record.size,
                    actual_size: actual,
                    outcome: VerificationOutcome::Ok,
                });
                return;
            }
            Ok(LocalFileState::Mismatched(actual)) => {
                warn!(
                    "File: {} Expected Size: {} Local Size: {} do not agree. Deleting the partial download",
                    record.name,
                    human_size(record.size),
                    human_size(actual)
                );
                if let Err(e) = discard(&path).await {
                    warn!("Could not delete {:?}: {}. Retrying next cycle", path, e);
                    ctx.report.download_errors += 1;
                    return;
                }
                ctx.report.partials_removed += 1;
            }
            Ok(LocalFileState::Absent) => {}
            Err(e) => {
                warn!("Could not inspect {:?}: {}. Retrying next cycle", path, e);
                ctx.report.download_errors += 1;
                return;
            }
        }

        match record.tier {
            ProductTier::Online => {
                debug!("Granule: {} Status: online, queued for download", record.name);
                ctx.batch.push(BatchEntry {
                    identifier: identifier.to_string(),
                    record,
                });
            }
            ProductTier::Archived => match self.catalogue.request_restore(&record.pid).await {
                Ok(ack) => {
                    info!("Granule: {} {}", record.name, ack.summary());
                    self.tracker.record_requested(identifier, &record.pid, &ack);
                    ctx.report.restores_requested += 1;
                }
                Err(e) if e.is_restore_failure() => {
                    warn!(
                        "Restore order for {} failed: {}. Abandoned for this cycle",
                        record.name, e
                    );
                    self.tracker
                        .record_failed(identifier, &record.pid, &e.to_string());
                    ctx.report.abandoned += 1;
                }
                Err(e) => {
                    warn!(
                        "Could not order restore of {}: {}. Retrying next cycle",
                        record.name, e
                    );
                    ctx.report.resolve_errors += 1;
                }
            },
        }
    }

    /// Download the pending batch and offload everything verified so far.
    async fn flush(&mut self, ctx: &mut CycleContext) -> Result<()> {
        let entries = mem::take(&mut ctx.batch);
        for (identifier, outcome) in self.downloader.download_batch(entries).await {
            match outcome {
                Ok(result) if result.is_verified() => {
                    ctx.report.downloaded += 1;
                    ctx.ready.push(result);
                }
                Ok(_) | Err(AcquisitionError::SizeMismatch { .. }) => {
                    ctx.report.size_mismatches += 1;
                }
                Err(e) => {
                    warn!("Download of {} failed: {}. Retrying next cycle", identifier, e);
                    ctx.report.download_errors += 1;
                }
            }
        }

        let ready = mem::take(&mut ctx.ready);
        if ready.is_empty() {
            return Ok(());
        }

        let report = self.dispatcher.offload(&ready).await;
        ctx.report.offloaded += report.completed.len();
        ctx.report.offload_failures += report.failed.len();
        self.queue
            .persist()
            .context("Failed to persist queue after offload")?;
        Ok(())
    }

    /// Poll outstanding restore orders until each is online or abandoned.
    async fn wait_for_restores(&mut self, ctx: &mut CycleContext) -> Result<()> {
        while self.tracker.has_outstanding() {
            self.queue
                .persist()
                .context("Failed to persist queue before waiting")?;

            let wait = self.tracker.next_wait();
            info!(
                "{} restore requests outstanding, waiting {} minutes",
                self.tracker.outstanding_count(),
                wait.as_secs() / 60
            );
            self.clock.sleep(wait).await;

            for request in self.tracker.outstanding() {
                match self.catalogue.lookup(&request.pid).await {
                    Ok(record) if record.tier == ProductTier::Online => {
                        self.tracker.mark_ready(&request.identifier);
                        ctx.report.restores_ready += 1;
                        ctx.batch.push(BatchEntry {
                            identifier: request.identifier.clone(),
                            record,
                        });
                    }
                    Ok(record) => {
                        let state = self
                            .tracker
                            .mark_still_pending(&request.identifier, record.tier.as_str());
                        if state == RestoreState::Abandoned {
                            ctx.report.abandoned += 1;
                        }
                    }
                    Err(e) => {
                        warn!("Could not poll {}: {}", request.identifier, e);
                        let state = self
                            .tracker
                            .mark_still_pending(&request.identifier, &e.to_string());
                        if state == RestoreState::Abandoned {
                            ctx.report.abandoned += 1;
                        }
                    }
                }

                if ctx.batch.len() >= self.settings.batch_size {
                    self.flush(ctx).await?;
                }
            }

            self.tracker.finish_poll_round();
            self.flush(ctx).await?;
        }
        Ok(())
    }
}

fn log_report(report: &CycleReport) {
    info!(
        "Cycle finished: {} resolved, {} not found, {} resolve errors, {} already present, \
         {} partials removed, {} downloaded, {} size mismatches, {} download errors, \
         {} restores requested, {} restores ready, {} abandoned, {} offloaded, \
         {} offload failures, peak {} outstanding, {} remaining",
        report.resolved,
        report.not_found,
        report.resolve_errors,
        report.already_present,
        report.partials_removed,
        report.downloaded,
        report.size_mismatches,
        report.download_errors,
        report.restores_requested,
        report.restores_ready,
        report.abandoned,
        report.offloaded,
        report.offload_failures,
        report.peak_outstanding,
        report.remaining
    );
}
