//! Common test infrastructure
//!
//! Provides a mocked HTTP catalogue, a recording object store and helpers to
//! build an orchestrator wired like the binary does.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{CatalogueFixture, TestWorkspace, ONLINE_ID};
//!
//! #[tokio::test]
//! async fn test_download() {
//!     let catalogue = CatalogueFixture::start().await;
//!     catalogue.online(ONLINE_ID, 100);
//!     let workspace = TestWorkspace::with_lines(&[ONLINE_ID]);
//!     let mut orchestrator = workspace.orchestrator(&catalogue, None);
//!     orchestrator.run_cycle().await.unwrap();
//! }
//! ```

mod catalogue;
mod constants;
mod store;
mod workspace;

// Public API - this is what tests import
pub use catalogue::CatalogueFixture;
pub use constants::*;
pub use store::RecordingObjectStore;
pub use workspace::TestWorkspace;
