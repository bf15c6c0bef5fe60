//! Object-detection pipeline: preprocessing, NMS and rescaling, per-class
//! annotation and JPEG encoding, driven over single images, folders and
//! live streams.

pub mod config;
pub mod detect;
pub mod error;
pub mod render;
pub mod source;
pub mod task;

pub use config::{Config, FrameBudget};
pub use detect::{Detection, DetectionResult, Detector, OnnxDetector, PostProcessor};
pub use error::{PipelineError, Result};
pub use source::{Orchestrator, OutputNaming, OutputWriter};
pub use task::{run_job, spawn_job, Job, JobOutcome};
