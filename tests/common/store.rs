use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use scene_acquirer::acquisition::{AcquisitionError, ObjectStore};

/// Object store that records uploads instead of performing them.
#[derive(Default)]
pub struct RecordingObjectStore {
    uploads: Mutex<Vec<(String, String)>>,
    prepared: Mutex<usize>,
    refuse_bucket: Option<String>,
}

#[allow(dead_code)]
impl RecordingObjectStore {
    pub fn refusing(bucket: &str) -> Self {
        Self {
            refuse_bucket: Some(bucket.to_string()),
            ..Default::default()
        }
    }

    /// Uploaded `(bucket, key)` pairs in order.
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn prepare_calls(&self) -> usize {
        *self.prepared.lock().unwrap()
    }
}

#[async_trait]
impl ObjectStore for RecordingObjectStore {
    async fn prepare(&self) -> Result<(), AcquisitionError> {
        *self.prepared.lock().unwrap() += 1;
        Ok(())
    }

    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
    ) -> Result<(), AcquisitionError> {
        if self.refuse_bucket.as_deref() == Some(bucket) {
            return Err(AcquisitionError::Upload(format!("access denied to {}", bucket)));
        }
        assert!(local_path.exists(), "uploading missing file {:?}", local_path);
        self.uploads
            .lock()
            .unwrap()
            .push((bucket.to_string(), key.to_string()));
        Ok(())
    }
}
