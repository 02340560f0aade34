use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use scene_acquirer::acquisition::{
    Downloader, FileQueueStore, IntegrityVerifier, KeyLayout, ManualClock, OffloadDispatcher,
    OffloadTargets, OndaCatalogueClient, Orchestrator, OrchestratorSettings, RestorePolicy,
};
use tempfile::TempDir;

use super::catalogue::CatalogueFixture;
use super::constants::{ARCHIVE_BUCKET, PASSWORD, PRIMARY_BUCKET, USERNAME};
use super::store::RecordingObjectStore;

/// Temporary staging directory and queue file.
pub struct TestWorkspace {
    _dir: TempDir,
    pub staging: PathBuf,
    pub queue_path: PathBuf,
    pub clock: Arc<ManualClock>,
}

#[allow(dead_code)]
impl TestWorkspace {
    fn new(file_name: &str, contents: String) -> Self {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join("staging");
        std::fs::create_dir_all(&staging).unwrap();
        let queue_path = dir.path().join(file_name);
        std::fs::write(&queue_path, contents).unwrap();

        Self {
            _dir: dir,
            staging,
            queue_path,
            clock: Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2019, 5, 1, 0, 0, 0).unwrap(),
            )),
        }
    }

    /// Queue with one identifier per line.
    pub fn with_lines(ids: &[&str]) -> Self {
        Self::new(
            "missing.txt",
            ids.iter().map(|id| format!("{}\n", id)).collect(),
        )
    }

    /// Queue grouped by acquisition date.
    pub fn with_groups(groups: &[(&str, &[&str])]) -> Self {
        let map: BTreeMap<&str, Vec<&str>> = groups
            .iter()
            .map(|(date, ids)| (*date, ids.to_vec()))
            .collect();
        Self::new("missing.json", serde_json::to_string(&map).unwrap())
    }

    /// Put a file of `len` bytes in the staging directory.
    pub fn stage(&self, identifier: &str, len: usize) -> PathBuf {
        let path = self.staging_path(identifier);
        std::fs::write(&path, vec![7u8; len]).unwrap();
        path
    }

    pub fn staging_path(&self, identifier: &str) -> PathBuf {
        self.staging.join(format!("{}.zip", identifier))
    }

    pub fn persisted_lines(&self) -> Vec<String> {
        std::fs::read_to_string(&self.queue_path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    pub fn persisted_groups(&self) -> BTreeMap<String, Vec<String>> {
        serde_json::from_str(&std::fs::read_to_string(&self.queue_path).unwrap()).unwrap()
    }

    /// Orchestrator wired against the fixture. `store` None keeps files locally.
    pub fn orchestrator(
        &self,
        catalogue: &CatalogueFixture,
        store: Option<Arc<RecordingObjectStore>>,
    ) -> Orchestrator {
        let queue = Arc::new(FileQueueStore::open(&self.queue_path).unwrap());
        let client = Arc::new(
            OndaCatalogueClient::new(
                catalogue.base_url(),
                USERNAME,
                PASSWORD,
                Duration::from_secs(5),
            )
            .unwrap(),
        );
        let downloader = Downloader::new(
            client.clone(),
            IntegrityVerifier::exact(),
            self.staging.clone(),
            4,
        );
        let dispatcher = match store {
            Some(store) => OffloadDispatcher::new(
                store,
                OffloadTargets {
                    primary_bucket: PRIMARY_BUCKET.to_string(),
                    layout: KeyLayout::DatePrefixed,
                    archive_bucket: Some(ARCHIVE_BUCKET.to_string()),
                },
                queue.clone(),
            ),
            None => OffloadDispatcher::keep_local(queue.clone()),
        };

        Orchestrator::new(
            client,
            queue,
            downloader,
            dispatcher,
            RestorePolicy::default(),
            self.clock.clone(),
            OrchestratorSettings {
                max_requests: 10,
                batch_size: 2,
                cycle_interval: Duration::from_secs(3600),
                run_once: true,
            },
        )
    }
}
