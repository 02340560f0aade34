use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scene_acquirer::acquisition::{
    Downloader, FileQueueStore, IntegrityVerifier, OffloadDispatcher, OndaCatalogueClient,
    Orchestrator, QueueStore, RestorePolicy, S3ObjectStore, SystemClock,
};
use scene_acquirer::config;

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML (or JSON) configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Staging directory for downloaded products. Created if missing.
    #[clap(long, value_parser = parse_path)]
    pub output_directory: Option<PathBuf>,

    /// Queue file listing the products to acquire.
    #[clap(long, value_parser = parse_path)]
    pub data_path: Option<PathBuf>,

    /// Maximum outstanding catalogue requests per cycle.
    #[clap(long)]
    pub max_requests: Option<usize>,

    /// Default wait in minutes before polling restore orders.
    #[clap(long)]
    pub time_lag_in_minutes: Option<u64>,

    /// Run a single cycle and exit.
    #[clap(long)]
    pub once: bool,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            output_directory: args.output_directory.clone(),
            data_path: args.data_path.clone(),
            max_requests: args.max_requests,
            time_lag_in_minutes: args.time_lag_in_minutes,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    info!(
        "scene-acquirer {}-{}",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    // Load config file if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (file overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  output_directory: {:?}", app_config.output_directory);
    info!("  data_path: {:?}", app_config.data_path);
    info!("  max_requests: {}", app_config.max_requests);
    info!("  time_lag_in_minutes: {}", app_config.restore.time_lag_minutes);
    info!("  catalogue: {}", app_config.catalogue.base_url);
    info!("  push_to_s3: {}", app_config.push_to_s3);

    std::fs::create_dir_all(&app_config.output_directory).with_context(|| {
        format!(
            "Failed to create output directory {:?}",
            app_config.output_directory
        )
    })?;

    let queue = Arc::new(FileQueueStore::open(&app_config.data_path)?);
    info!(
        "{} items in {} queue {:?}",
        queue.len(),
        queue.format().as_str(),
        queue.path()
    );

    let catalogue = Arc::new(OndaCatalogueClient::new(
        app_config.catalogue.base_url.clone(),
        app_config.auth.username.clone(),
        app_config.auth.password.clone(),
        Duration::from_secs(app_config.catalogue.timeout_secs),
    )?);

    let downloader = Downloader::new(
        catalogue.clone(),
        IntegrityVerifier::new(app_config.size_tolerance_bytes),
        app_config.output_directory.clone(),
        app_config.threads,
    );

    let dispatcher = match app_config.offload_targets() {
        Some(targets) => {
            info!(
                "Offloading to s3://{} ({} keys){}",
                targets.primary_bucket,
                targets.layout.as_str(),
                targets
                    .archive_bucket
                    .as_ref()
                    .map(|b| format!(", archive s3://{}", b))
                    .unwrap_or_default()
            );
            let store = S3ObjectStore::from_env(
                app_config.aws.region.clone(),
                app_config.aws.upload_role.clone(),
            )
            .await;
            OffloadDispatcher::new(Arc::new(store), targets, queue.clone())
        }
        None => {
            info!("Offloading disabled, verified files stay in the output directory");
            OffloadDispatcher::keep_local(queue.clone())
        }
    };

    let mut orchestrator = Orchestrator::new(
        catalogue,
        queue,
        downloader,
        dispatcher,
        RestorePolicy::new(&app_config.restore),
        Arc::new(SystemClock),
        app_config.orchestrator_settings(cli_args.once),
    );

    tokio::select! {
        result = orchestrator.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, queue state is as last persisted");
        }
    }

    Ok(())
}
