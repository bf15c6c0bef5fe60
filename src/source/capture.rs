use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};

use crate::error::{PipelineError, Result};

/// Sequential frame supplier for stream processing.
pub trait FrameSource {
    /// Next frame, or `None` once the stream has ended or a read failed.
    fn read_frame(&mut self) -> Option<Mat>;
}

/// OpenCV capture over a URL, file path, or numeric device index.
pub struct CaptureSource {
    url: String,
    capture: VideoCapture,
}

impl CaptureSource {
    pub fn open(url: &str) -> Result<Self> {
        let capture = match url.parse::<i32>() {
            Ok(index) => VideoCapture::new(index, videoio::CAP_ANY),
            Err(_) => VideoCapture::from_file(url, videoio::CAP_ANY),
        }
        .map_err(|e| PipelineError::StreamOpen(format!("{url}: {e}")))?;

        if !capture.is_opened().unwrap_or(false) {
            return Err(PipelineError::StreamOpen(url.to_string()));
        }

        tracing::info!(url = %url, "stream opened");
        Ok(Self {
            url: url.to_string(),
            capture,
        })
    }
}

impl FrameSource for CaptureSource {
    fn read_frame(&mut self) -> Option<Mat> {
        let mut frame = Mat::default();
        match self.capture.read(&mut frame) {
            Ok(true) if !frame.empty() => Some(frame),
            Ok(_) => {
                tracing::info!(url = %self.url, "stream ended");
                None
            }
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "frame read failed");
                None
            }
        }
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        let _ = self.capture.release();
    }
}
