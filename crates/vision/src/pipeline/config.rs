//! Runtime configuration for the line tuner.
//!
//! The binary takes no flags; everything tunable at startup comes from
//! `LINE_TUNER_*` environment variables with defaults for each. Detection
//! parameters are not configured here, they live in the persisted file.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};

use crate::{params::PipelineVariant, store::DEFAULT_CONFIG_FILE};

pub const CAMERA_ENV: &str = "LINE_TUNER_CAMERA";
pub const CONFIG_PATH_ENV: &str = "LINE_TUNER_CONFIG";
pub const VARIANT_ENV: &str = "LINE_TUNER_VARIANT";
pub const QUEUE_CAPACITY_ENV: &str = "LINE_TUNER_QUEUE_CAPACITY";

pub const DEFAULT_CAMERA_INDEX: i32 = 0;
/// How long the consumer waits on an empty queue before re-checking the running flag.
pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Camera device index.
    pub camera_index: i32,
    /// Persisted parameter file.
    pub config_path: PathBuf,
    pub variant: PipelineVariant,
    /// `None` keeps the unbounded hand-off queue.
    pub queue_capacity: Option<usize>,
}

/// Settings the coordinator needs beyond its collaborators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineOptions {
    pub variant: PipelineVariant,
    pub queue_capacity: Option<usize>,
    pub idle_wait: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            variant: PipelineVariant::default(),
            queue_capacity: None,
            idle_wait: DEFAULT_IDLE_WAIT,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            camera_index: DEFAULT_CAMERA_INDEX,
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
            variant: PipelineVariant::default(),
            queue_capacity: None,
        }
    }
}

impl RuntimeConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys take their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(value) = get(CAMERA_ENV) {
            let index = value
                .parse::<i32>()
                .with_context(|| format!("{CAMERA_ENV} must be a camera index, got {value:?}"))?;
            if index < 0 {
                bail!("{CAMERA_ENV} must not be negative, got {index}");
            }
            config.camera_index = index;
        }

        if let Some(value) = get(CONFIG_PATH_ENV) {
            config.config_path = PathBuf::from(value);
        }

        if let Some(value) = get(VARIANT_ENV) {
            config.variant = value
                .parse()
                .with_context(|| format!("{VARIANT_ENV} is invalid"))?;
        }

        if let Some(value) = get(QUEUE_CAPACITY_ENV) {
            let capacity = value.parse::<usize>().with_context(|| {
                format!("{QUEUE_CAPACITY_ENV} must be a positive integer, got {value:?}")
            })?;
            if capacity == 0 {
                bail!("{QUEUE_CAPACITY_ENV} must be at least 1");
            }
            config.queue_capacity = Some(capacity);
        }

        Ok(config)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            variant: self.variant,
            queue_capacity: self.queue_capacity,
            idle_wait: DEFAULT_IDLE_WAIT,
        }
    }
}
