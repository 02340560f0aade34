use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub output_directory: Option<String>,
    pub data_path: Option<String>,
    pub max_requests: Option<usize>,
    pub time_lag_in_minutes: Option<u64>,
    pub cycle_interval_minutes: Option<u64>,
    pub batch_size: Option<usize>,
    pub threads: Option<usize>,
    pub size_tolerance_bytes: Option<u64>,
    pub push_to_s3: Option<bool>,

    // Sections
    pub catalogue: Option<CatalogueConfig>,
    pub restore: Option<RestoreConfig>,
    pub auth: Option<AuthConfig>,
    pub aws: Option<AwsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CatalogueConfig {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RestoreConfig {
    pub max_polls: Option<u32>,
    pub backoff_multiplier: Option<f64>,
    pub max_wait_minutes: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub target_s3_bucket: Option<String>,
    /// "flat" or "date_prefixed"
    pub target_key_layout: Option<String>,
    pub archive_bucket: Option<String>,
    pub upload_role_arn: Option<String>,
    pub upload_role_name: Option<String>,
}

impl FileConfig {
    /// Load a TOML config file, or a JSON one when the extension is `.json`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))
        }
    }
}
