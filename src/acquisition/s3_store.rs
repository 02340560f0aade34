//! S3 implementation of the object store.

use std::path::Path;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::error::AcquisitionError;
use super::offload::ObjectStore;

/// Role to assume before uploading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRole {
    pub arn: String,
    pub session_name: String,
}

pub struct S3ObjectStore {
    base_config: SdkConfig,
    role: Option<UploadRole>,
    client: RwLock<aws_sdk_s3::Client>,
}

impl S3ObjectStore {
    /// Build a store from the default credential chain.
    ///
    /// `region` overrides the region found in the environment.
    pub async fn from_env(region: Option<String>, role: Option<UploadRole>) -> Self {
        let region_provider =
            RegionProviderChain::first_try(region.map(Region::new)).or_default_provider();
        let base_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;
        let client = aws_sdk_s3::Client::new(&base_config);

        Self {
            base_config,
            role,
            client: RwLock::new(client),
        }
    }

    async fn assume_role(
        &self,
        role: &UploadRole,
    ) -> Result<aws_sdk_s3::Client, AcquisitionError> {
        let sts = aws_sdk_sts::Client::new(&self.base_config);
        let output = sts
            .assume_role()
            .role_arn(&role.arn)
            .role_session_name(&role.session_name)
            .send()
            .await
            .map_err(|e| {
                AcquisitionError::Upload(format!(
                    "assume role {} failed: {}",
                    role.arn,
                    DisplayErrorContext(&e)
                ))
            })?;

        let creds = output.credentials().ok_or_else(|| {
            AcquisitionError::Upload(format!("assume role {} returned no credentials", role.arn))
        })?;
        let credentials = aws_sdk_s3::config::Credentials::new(
            creds.access_key_id(),
            creds.secret_access_key(),
            Some(creds.session_token().to_string()),
            None,
            "assume_role",
        );

        let config = aws_sdk_s3::config::Builder::from(&self.base_config)
            .credentials_provider(credentials)
            .build();
        Ok(aws_sdk_s3::Client::from_conf(config))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn prepare(&self) -> Result<(), AcquisitionError> {
        let Some(role) = &self.role else {
            return Ok(());
        };

        let client = self.assume_role(role).await?;
        *self.client.write().await = client;
        info!("Assumed upload role {}", role.arn);
        Ok(())
    }

    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
    ) -> Result<(), AcquisitionError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| AcquisitionError::Upload(format!("cannot read {:?}: {}", local_path, e)))?;

        let client = self.client.read().await.clone();
        client
            .put_object()
            .bucket(bucket)
            .key(key)
            .acl(ObjectCannedAcl::BucketOwnerFullControl)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                AcquisitionError::Upload(format!(
                    "s3://{}/{}: {}",
                    bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;

        debug!("Uploaded {:?} to s3://{}/{}", local_path, bucket, key);
        Ok(())
    }
}
