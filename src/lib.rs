//! Scene Acquirer Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod acquisition;
pub mod config;

// Re-export commonly used types for convenience
pub use acquisition::{
    AcquisitionError, CatalogueClient, CycleReport, FileQueueStore, ObjectStore, Orchestrator,
    QueueStore,
};
