//! Acquisition engine
//!
//! Resolves queued product identifiers against the catalogue, downloads
//! online products, orders restores for archived ones and offloads verified
//! files to object storage.

mod archive_key;
mod catalogue;
mod clock;
mod downloader;
mod error;
mod integrity;
mod models;
mod offload;
mod orchestrator;
mod queue_store;
mod restore_tracker;
mod retry_policy;
mod s3_store;

pub use archive_key::{archive_key, primary_key, KeyLayout, SceneName};
pub use catalogue::{CatalogueClient, ContentStream, OndaCatalogueClient, DEFAULT_CATALOGUE_URL};
pub use clock::{Clock, ManualClock, SystemClock};
pub use downloader::{BatchEntry, Downloader};
pub use error::AcquisitionError;
pub use integrity::{IntegrityVerifier, LocalFileState};
pub use models::*;
pub use offload::{ObjectStore, OffloadDispatcher, OffloadReport, OffloadTargets};
#[cfg(feature = "mock")]
pub use offload::MockObjectStore;
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use queue_store::{FileQueueStore, QueueFileFormat, QueueStore};
pub use restore_tracker::{parse_estimated_time, RestoreRequest, RestoreState, RestoreTracker};
pub use retry_policy::RestorePolicy;
pub use s3_store::{S3ObjectStore, UploadRole};
