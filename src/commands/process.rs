//! The `process` command: build a [`BatchConfig`] and run it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use clap::Args;
use serde::Deserialize;
use tracing::{debug, info};
use crate::core::{
    BatchConfig, BatchReport, DEFAULT_BACKOFF_FACTOR, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES, DEFAULT_QUALITY,
    DEFAULT_WORKERS, Resolution, TracingProgressSink,
};
use crate::processing::{BatchDriver, CustomOptions, DeviceSpec, Pipeline, PresetFactory, device};
use crate::reporting::{DEFAULT_DETAIL_LIMIT, SummaryReporter};

pub const DEFAULT_PRESET: &str = "kindle";

/// Command-line options for a batch run. Unset options fall back to the
/// config file, then to built-in defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct ProcessArgs {
    /// Directory to scan for images and archives
    #[arg(required_unless_present_any = ["list_presets", "list_devices"])]
    pub src: Option<PathBuf>,

    /// Directory that receives converted output
    #[arg(required_unless_present_any = ["list_presets", "list_devices"])]
    pub dest: Option<PathBuf>,

    /// Target size as WIDTHxHEIGHT
    #[arg(short, long)]
    pub resolution: Option<Resolution>,

    /// Target device; supplies resolution and pipeline
    #[arg(short, long)]
    pub device: Option<String>,

    /// Output quality, 1 (fastest) to 9 (smallest)
    #[arg(short, long)]
    pub quality: Option<u8>,

    /// Number of concurrent workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Preset pipeline name
    #[arg(short, long = "pipeline")]
    pub pipeline: Option<String>,

    /// Custom pipeline, e.g. "rotate,crop,contrast=1.5,sharpen=1.2,quantize=16"
    #[arg(long, conflicts_with = "pipeline")]
    pub custom: Option<CustomOptions>,

    /// Retries per item after the first attempt
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Delay before the first retry, in milliseconds
    #[arg(long)]
    pub base_delay_ms: Option<u64>,

    /// Multiplier applied to the delay after each retry
    #[arg(long)]
    pub backoff_factor: Option<f64>,

    /// Stop dispatching after the first failed item
    #[arg(long)]
    pub stop_on_error: bool,

    /// Do not insert a resize step automatically
    #[arg(long)]
    pub no_auto_resize: bool,

    /// Pack each top-level directory into a .cbz
    #[arg(long)]
    pub pack_directories: bool,

    /// List what would be converted without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the error summary as JSON to this file
    #[arg(long)]
    pub summary_json: Option<PathBuf>,

    /// Print the available presets and exit
    #[arg(long)]
    pub list_presets: bool,

    /// Print the supported devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

/// Settings loaded from `--config`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ConfigFile {
    pub resolution: Option<String>,
    pub device: Option<String>,
    pub quality: Option<u8>,
    pub workers: Option<usize>,
    pub pipeline: Option<String>,
    pub custom: Option<CustomOptions>,
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub continue_on_error: Option<bool>,
    pub auto_resize: Option<bool>,
    pub pack_directories: Option<bool>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

fn select_pipeline(args: &ProcessArgs, file: &ConfigFile, device: Option<&DeviceSpec>) -> Result<Pipeline> {
    let pipeline = if let Some(custom) = &args.custom {
        PresetFactory::custom(custom)?
    } else if let Some(name) = &args.pipeline {
        PresetFactory::get_preset(name)?
    } else if let Some(custom) = &file.custom {
        PresetFactory::custom(custom)?
    } else if let Some(name) = &file.pipeline {
        PresetFactory::get_preset(name)?
    } else if let Some(spec) = device {
        PresetFactory::from_device(spec)?
    } else {
        PresetFactory::get_preset(DEFAULT_PRESET)?
    };
    Ok(pipeline)
}

/// Merge CLI flags over the config file over the defaults.
pub fn build_config(args: &ProcessArgs, file: &ConfigFile) -> Result<BatchConfig> {
    let (Some(src), Some(dest)) = (&args.src, &args.dest) else {
        anyhow::bail!("Both a source and a destination directory are required");
    };

    let device = match args.device.as_ref().or(file.device.as_ref()) {
        Some(key) => Some(device(key)?),
        None => None,
    };
    let pipeline = select_pipeline(args, file, device)?;

    let resolution = match (&args.resolution, &file.resolution, device) {
        (Some(resolution), _, _) => *resolution,
        (None, Some(text), _) => text.parse()?,
        (None, None, Some(spec)) => spec.resolution,
        (None, None, None) => Resolution::DEFAULT,
    };

    let mut config = BatchConfig::new(src, dest, pipeline);
    config.resolution = resolution;
    config.quality = args.quality.or(file.quality).unwrap_or(DEFAULT_QUALITY);
    config.worker_count = args.workers.or(file.workers).unwrap_or(DEFAULT_WORKERS);
    config.max_retries = args.max_retries.or(file.max_retries).unwrap_or(DEFAULT_MAX_RETRIES);
    config.base_delay = args
        .base_delay_ms
        .or(file.base_delay_ms)
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_BASE_DELAY);
    config.backoff_factor = args.backoff_factor.or(file.backoff_factor).unwrap_or(DEFAULT_BACKOFF_FACTOR);
    config.continue_on_error = !args.stop_on_error && file.continue_on_error.unwrap_or(true);
    config.auto_resize = !args.no_auto_resize && file.auto_resize.unwrap_or(true);
    config.pack_directories = args.pack_directories || file.pack_directories.unwrap_or(false);
    config.dry_run = args.dry_run;

    if let Some(spec) = device {
        debug!("Targeting {}", spec);
    }
    Ok(config)
}

/// Run a batch and log its summary. Configuration errors come back as `Err`.
pub async fn process(args: &ProcessArgs, verbose: bool) -> Result<BatchReport> {
    let file = match &args.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };
    let config = build_config(args, &file)?;

    let driver = BatchDriver::new(config, Arc::new(TracingProgressSink::new()));
    let report = driver.run().await.context("Batch could not start")?;

    let mut reporter = SummaryReporter::new(&report);
    if verbose {
        reporter = reporter.with_details(driver.tracker().records(), DEFAULT_DETAIL_LIMIT);
    }
    info!("\n=== Batch Report ===\n{}", reporter);

    if let Some(path) = &args.summary_json {
        let json = serde_json::to_string_pretty(&report.summary).context("Failed to serialize error summary")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        info!("Error summary written to {}", path.display());
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ProcessArgs {
        ProcessArgs {
            src: Some("in".into()),
            dest: Some("out".into()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_apply_without_flags_or_file() {
        let config = build_config(&args(), &ConfigFile::default()).unwrap();
        assert_eq!(config.resolution, Resolution::DEFAULT);
        assert_eq!(config.quality, DEFAULT_QUALITY);
        assert_eq!(config.worker_count, DEFAULT_WORKERS);
        assert!(config.continue_on_error);
        assert!(config.auto_resize);
        assert_eq!(
            config.pipeline.step_names(),
            PresetFactory::get_preset(DEFAULT_PRESET).unwrap().step_names()
        );
    }

    #[test]
    fn flags_override_file() {
        let file: ConfigFile =
            serde_json::from_str(r#"{"quality": 2, "workers": 8, "resolution": "800x600", "continueOnError": true}"#)
                .unwrap();
        let mut args = args();
        args.quality = Some(9);
        args.stop_on_error = true;

        let config = build_config(&args, &file).unwrap();
        assert_eq!(config.quality, 9);
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.resolution, Resolution::new(800, 600));
        assert!(!config.continue_on_error);
    }

    #[test]
    fn device_supplies_resolution_unless_overridden() {
        let mut args = args();
        args.device = Some("kobo_elipsa".into());
        let config = build_config(&args, &ConfigFile::default()).unwrap();
        assert_eq!(config.resolution, Resolution::new(1404, 1872));

        args.resolution = Some(Resolution::new(600, 800));
        let config = build_config(&args, &ConfigFile::default()).unwrap();
        assert_eq!(config.resolution, Resolution::new(600, 800));
    }

    #[test]
    fn unknown_preset_is_rejected() {
        let mut args = args();
        args.pipeline = Some("nope".into());
        let err = build_config(&args, &ConfigFile::default()).unwrap_err();
        assert!(err.to_string().contains("Unknown preset"));
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        assert!(serde_json::from_str::<ConfigFile>(r#"{"qualty": 3}"#).is_err());
    }
}
