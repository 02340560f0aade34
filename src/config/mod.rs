mod file_config;

pub use file_config::{AuthConfig, AwsConfig, CatalogueConfig, FileConfig, RestoreConfig};

use crate::acquisition::{
    KeyLayout, OffloadTargets, OrchestratorSettings, UploadRole, DEFAULT_CATALOGUE_URL,
};
use anyhow::{bail, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_REQUESTS: usize = 20;
pub const DEFAULT_TIME_LAG_MINUTES: u64 = 60;
pub const DEFAULT_CYCLE_INTERVAL_MINUTES: u64 = 60;
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_THREADS: usize = 50;
pub const DEFAULT_CATALOGUE_TIMEOUT_SECS: u64 = 60;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by the config file.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub output_directory: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
    pub max_requests: Option<usize>,
    pub time_lag_in_minutes: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub output_directory: PathBuf,
    pub data_path: PathBuf,
    pub max_requests: usize,
    pub cycle_interval_minutes: u64,
    pub batch_size: usize,
    pub threads: usize,
    pub size_tolerance_bytes: u64,
    pub push_to_s3: bool,

    // Sections (with defaults)
    pub catalogue: CatalogueSettings,
    pub restore: RestoreSettings,
    pub auth: AuthSettings,
    pub aws: AwsSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestoreSettings {
    /// Default wait before polling restore orders.
    pub time_lag_minutes: u64,
    pub max_polls: u32,
    pub backoff_multiplier: f64,
    pub max_wait_minutes: u64,
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            time_lag_minutes: DEFAULT_TIME_LAG_MINUTES,
            max_polls: 3,
            backoff_multiplier: 1.5,
            max_wait_minutes: 360,
        }
    }
}

#[derive(Clone, PartialEq)]
pub struct AuthSettings {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AwsSettings {
    pub region: Option<String>,
    pub target_s3_bucket: Option<String>,
    pub key_layout: KeyLayout,
    pub archive_bucket: Option<String>,
    pub upload_role: Option<UploadRole>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional file config.
    /// File values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let output_directory = file
            .output_directory
            .map(PathBuf::from)
            .or_else(|| cli.output_directory.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "output_directory must be specified via --output-directory or in config file"
                )
            })?;
        if output_directory.exists() && !output_directory.is_dir() {
            bail!("output_directory is not a directory: {:?}", output_directory);
        }

        let data_path = file
            .data_path
            .map(PathBuf::from)
            .or_else(|| cli.data_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("data_path must be specified via --data-path or in config file")
            })?;
        if !data_path.is_file() {
            bail!("Queue file does not exist: {:?}", data_path);
        }

        let max_requests = file
            .max_requests
            .or(cli.max_requests)
            .unwrap_or(DEFAULT_MAX_REQUESTS);
        let time_lag_minutes = file
            .time_lag_in_minutes
            .or(cli.time_lag_in_minutes)
            .unwrap_or(DEFAULT_TIME_LAG_MINUTES);
        let cycle_interval_minutes = file
            .cycle_interval_minutes
            .unwrap_or(DEFAULT_CYCLE_INTERVAL_MINUTES);
        let batch_size = file.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        let threads = file.threads.unwrap_or(DEFAULT_THREADS);
        let size_tolerance_bytes = file.size_tolerance_bytes.unwrap_or(0);
        let push_to_s3 = file.push_to_s3.unwrap_or(false);

        if max_requests == 0 {
            bail!("max_requests must be at least 1");
        }
        if batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if threads == 0 {
            bail!("threads must be at least 1");
        }

        let catalogue_file = file.catalogue.unwrap_or_default();
        let catalogue = CatalogueSettings {
            base_url: catalogue_file
                .base_url
                .unwrap_or_else(|| DEFAULT_CATALOGUE_URL.to_string()),
            timeout_secs: catalogue_file
                .timeout_secs
                .unwrap_or(DEFAULT_CATALOGUE_TIMEOUT_SECS),
        };

        let restore_defaults = RestoreSettings::default();
        let restore_file = file.restore.unwrap_or_default();
        let restore = RestoreSettings {
            time_lag_minutes,
            max_polls: restore_file.max_polls.unwrap_or(restore_defaults.max_polls),
            backoff_multiplier: restore_file
                .backoff_multiplier
                .unwrap_or(restore_defaults.backoff_multiplier),
            max_wait_minutes: restore_file
                .max_wait_minutes
                .unwrap_or(restore_defaults.max_wait_minutes),
        };
        if restore.max_polls == 0 {
            bail!("restore.max_polls must be at least 1");
        }
        if restore.backoff_multiplier < 1.0 {
            bail!("restore.backoff_multiplier must be at least 1.0");
        }

        let auth_file = file.auth.unwrap_or_default();
        let auth = match (auth_file.username, auth_file.password) {
            (Some(username), Some(password)) if !username.is_empty() => {
                AuthSettings { username, password }
            }
            _ => bail!("auth.username and auth.password must be specified in config file"),
        };

        let aws_file = file.aws.unwrap_or_default();
        let key_layout = match aws_file.target_key_layout.as_deref() {
            None => KeyLayout::default(),
            Some(s) => KeyLayout::parse(s).ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid aws.target_key_layout '{}', expected 'flat' or 'date_prefixed'",
                    s
                )
            })?,
        };
        let upload_role = match (aws_file.upload_role_arn, aws_file.upload_role_name) {
            (Some(arn), Some(session_name)) => Some(UploadRole { arn, session_name }),
            (None, None) => None,
            _ => bail!("aws.upload_role_arn and aws.upload_role_name must be provided together"),
        };
        if push_to_s3 && aws_file.target_s3_bucket.is_none() {
            bail!("push_to_s3 is enabled but aws.target_s3_bucket is not set");
        }
        let aws = AwsSettings {
            region: aws_file.region,
            target_s3_bucket: aws_file.target_s3_bucket,
            key_layout,
            archive_bucket: aws_file.archive_bucket,
            upload_role,
        };

        Ok(Self {
            output_directory,
            data_path,
            max_requests,
            cycle_interval_minutes,
            batch_size,
            threads,
            size_tolerance_bytes,
            push_to_s3,
            catalogue,
            restore,
            auth,
            aws,
        })
    }

    pub fn orchestrator_settings(&self, run_once: bool) -> OrchestratorSettings {
        OrchestratorSettings {
            max_requests: self.max_requests,
            batch_size: self.batch_size,
            cycle_interval: Duration::from_secs(self.cycle_interval_minutes * 60),
            run_once,
        }
    }

    /// Upload destinations, or None when offloading is disabled.
    pub fn offload_targets(&self) -> Option<OffloadTargets> {
        if !self.push_to_s3 {
            return None;
        }
        self.aws
            .target_s3_bucket
            .as_ref()
            .map(|bucket| OffloadTargets {
                primary_bucket: bucket.clone(),
                layout: self.aws.key_layout,
                archive_bucket: self.aws.archive_bucket.clone(),
            })
    }
}
