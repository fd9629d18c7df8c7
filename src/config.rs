use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use crate::device::DeviceConfig;
use crate::error::RecorderError;
use crate::recorder::RecorderConfig;
use crate::sink::influx::DEFAULT_BATCH_SIZE;
use crate::tags::TagSpec;

#[derive(Parser, Debug)]
#[command(name = "daq-recorder")]
#[command(about = "Data-acquisition polling and recording service")]
#[command(version)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "recorder.toml", env = "DAQ_RECORDER_CONFIG")]
    pub config: PathBuf,

    /// HTTP server port
    #[arg(short, long, default_value = "8100")]
    pub listen: u16,

    /// HTTP server host
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Polling interval in milliseconds
    #[arg(long, default_value = "5000")]
    pub interval_ms: u64,

    /// Delay before the first poll of a session, in milliseconds
    #[arg(long, default_value = "1000")]
    pub warmup_ms: u64,

    /// Source name stamped on every frame
    #[arg(long, default_value = "daq-recorder")]
    pub source_name: String,

    /// List the items exposed by the device and exit
    #[arg(long)]
    pub list_tags: bool,

    #[command(subcommand)]
    pub mode: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Mode {
    /// Poll the built-in simulated acquisition unit
    Simulated(SimulatedArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SimulatedArgs {
    /// Number of device items, scan-control item included
    #[arg(long, default_value = "16")]
    pub channels: usize,

    /// Index of an item that reports an open-input marker instead of a value
    #[arg(long)]
    pub unreadable: Option<usize>,
}

impl Cli {
    /// Convert CLI args to DeviceConfig
    pub fn to_device_config(&self) -> Option<DeviceConfig> {
        match &self.mode {
            Some(Mode::Simulated(args)) => Some(DeviceConfig::Simulated {
                channels: args.channels,
                unreadable: args.unreadable,
            }),
            None => None,
        }
    }

    /// Convert CLI args to RecorderConfig
    pub fn to_recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            source_name: self.source_name.clone(),
            poll_interval: Duration::from_millis(self.interval_ms.max(1)),
            warmup_delay: Duration::from_millis(self.warmup_ms),
        }
    }
}

/// Time-series sink settings from the `[sink]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub enabled: bool,
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    pub batch_size: Option<usize>,
}

impl SinkConfig {
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }
}

/// One `[[tags]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct TagEntry {
    pub index: usize,
    #[serde(flatten)]
    pub spec: TagSpec,
}

/// Contents of the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub sink: SinkConfig,
    pub tags: Vec<TagEntry>,
}

impl FileConfig {
    /// Read and validate the configuration file
    pub fn load(path: &Path) -> Result<Self, RecorderError> {
        let contents = std::fs::read_to_string(path)?;
        let config: FileConfig = toml::from_str(&contents)?;
        config.validate()?;

        tracing::info!(
            "Loaded {} tags from {}",
            config.tags.len(),
            path.display()
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), RecorderError> {
        if self.sink.enabled && (self.sink.url.trim().is_empty() || self.sink.token.trim().is_empty())
        {
            return Err(RecorderError::Config(
                "sink URL or API token cannot be blank".into(),
            ));
        }

        // Duplicates are caught while building the map
        self.tag_map().map(|_| ())
    }

    /// Tags keyed by channel index
    pub fn tag_map(&self) -> Result<BTreeMap<usize, TagSpec>, RecorderError> {
        let mut map = BTreeMap::new();

        for entry in &self.tags {
            if entry.spec.name.trim().is_empty() {
                return Err(RecorderError::Config(format!(
                    "tag {} has a blank name",
                    entry.index
                )));
            }
            let spec = TagSpec::new(entry.spec.name.trim(), entry.spec.semantic_type.trim());
            if map.insert(entry.index, spec).is_some() {
                return Err(RecorderError::Config(format!(
                    "tag index {} configured twice",
                    entry.index
                )));
            }
        }

        Ok(map)
    }
}
