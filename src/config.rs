use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::error::PipelineError;
use crate::source::OutputNaming;

pub const MIN_FRAME_BUDGET: u32 = 1;
pub const MAX_FRAME_BUDGET: u32 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

fn default_conf_thres() -> f32 {
    0.5
}

fn default_iou_thres() -> f32 {
    0.5
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

fn default_max_frames() -> u32 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_conf_thres")]
    pub conf_thres: f32,
    #[serde(default = "default_iou_thres")]
    pub iou_thres: f32,
    /// Plain-text label file, one class name per line.
    #[serde(default)]
    pub names_file: Option<PathBuf>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            conf_thres: default_conf_thres(),
            iou_thres: default_iou_thres(),
            names_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub naming: OutputNaming,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            naming: OutputNaming::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_max_frames")]
    pub max_frames: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_frames: default_max_frames(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

impl Config {
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Rejects thresholds outside [0, 1] before a model is loaded. The frame
    /// budget is checked by `FrameBudget::new` when a stream is requested.
    pub fn validate(&self) -> Result<(), PipelineError> {
        check_unit_interval("conf-thres", self.detector.conf_thres)?;
        check_unit_interval("iou-thres", self.detector.iou_thres)?;
        Ok(())
    }
}

fn check_unit_interval(name: &str, value: f32) -> Result<(), PipelineError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfiguration(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

/// Maximum number of frames a single stream invocation may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBudget(u32);

impl FrameBudget {
    pub fn new(frames: u32) -> Result<Self, PipelineError> {
        if (MIN_FRAME_BUDGET..=MAX_FRAME_BUDGET).contains(&frames) {
            Ok(Self(frames))
        } else {
            Err(PipelineError::InvalidConfiguration(format!(
                "max-frames must be within {MIN_FRAME_BUDGET}-{MAX_FRAME_BUDGET}, got {frames}"
            )))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}
