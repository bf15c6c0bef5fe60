use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, TryLockError};

use opencv::core::Mat;
use opencv::imgcodecs;
use opencv::prelude::*;

use crate::config::FrameBudget;
use crate::detect::{
    inference_size, prepare, Detection, DetectionResult, Detector, PostProcessor,
};
use crate::error::{PipelineError, Result};
use crate::render::{annotate, encode_jpeg, label_for};

use super::capture::{CaptureSource, FrameSource};

pub const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct BatchItem {
    pub path: PathBuf,
    pub file_name: String,
    pub state: ItemState,
}

/// Image files of one folder, in file-name order.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub items: Vec<BatchItem>,
}

impl BatchJob {
    pub fn scan(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(PipelineError::FileNotFound(dir.to_path_buf()));
        }

        let entries = std::fs::read_dir(dir)?.map(|entry| entry.map(|e| e.path()));
        let items = collect_items(dir, entries);
        Ok(Self { items })
    }

    pub fn count(&self, state: ItemState) -> usize {
        self.items.iter().filter(|i| i.state == state).count()
    }
}

/// Image files among `entries`, sorted by file name. Entries that could not be
/// read are logged and skipped.
fn collect_items(
    dir: &Path,
    entries: impl IntoIterator<Item = std::io::Result<PathBuf>>,
) -> Vec<BatchItem> {
    let mut items = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(folder = %dir.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !path.is_file() || !has_image_extension(&path) {
            continue;
        }
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        items.push(BatchItem {
            path,
            file_name,
            state: ItemState::Pending,
        });
    }
    items.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    items
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub job: BatchJob,
    /// Successful items as `(file name, result)`, in file-name order.
    pub items: Vec<(String, DetectionResult)>,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct StreamSession {
    pub source_url: String,
    pub frame_budget: FrameBudget,
    pub frames_processed: u32,
    pub succeeded: bool,
}

impl StreamSession {
    pub fn new(source_url: impl Into<String>, frame_budget: FrameBudget) -> Self {
        Self {
            source_url: source_url.into(),
            frame_budget,
            frames_processed: 0,
            succeeded: false,
        }
    }

    fn exhausted(&self) -> bool {
        self.frames_processed >= self.frame_budget.get()
    }
}

#[derive(Debug)]
pub struct StreamOutcome {
    pub session: StreamSession,
    pub results: Vec<DetectionResult>,
    pub failed: usize,
}

/// Drives preprocess, inference, postprocess, annotation and encoding over
/// single images, folders and streams.
///
/// The detector sits behind a mutex: one operation runs at a time, and an
/// operation started while another holds the detector fails with `Busy`.
pub struct Orchestrator<D> {
    detector: Mutex<D>,
    postprocessor: PostProcessor,
}

impl<D: Detector> Orchestrator<D> {
    pub fn new(detector: D, postprocessor: PostProcessor) -> Self {
        Self {
            detector: Mutex::new(detector),
            postprocessor,
        }
    }

    fn acquire(&self) -> Result<MutexGuard<'_, D>> {
        match self.detector.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(PipelineError::Busy),
            Err(TryLockError::Poisoned(poisoned)) => {
                tracing::warn!("detector lock poisoned by an earlier panic, continuing");
                Ok(poisoned.into_inner())
            }
        }
    }

    /// Runs the full pipeline on an in-memory raster.
    pub fn process_frame(&self, image: &Mat) -> Result<DetectionResult> {
        let mut detector = self.acquire()?;
        self.run_pipeline(&mut *detector, image)
    }

    pub fn process_image(&self, path: &Path) -> Result<DetectionResult> {
        let mut detector = self.acquire()?;
        let result = self.image_pipeline(&mut *detector, path)?;
        log_detections(
            &path.display().to_string(),
            result.detections(),
            detector.class_names(),
        );
        Ok(result)
    }

    /// Processes every image in `dir`. Failures are logged and counted; they
    /// never abort the batch.
    pub fn process_folder(&self, dir: &Path) -> Result<BatchOutcome> {
        let mut job = BatchJob::scan(dir)?;
        let mut detector = self.acquire()?;
        tracing::info!(folder = %dir.display(), images = job.items.len(), "batch started");

        let mut items = Vec::new();
        for item in job.items.iter_mut() {
            match self.image_pipeline(&mut *detector, &item.path) {
                Ok(result) => {
                    log_detections(&item.file_name, result.detections(), detector.class_names());
                    item.state = ItemState::Succeeded;
                    items.push((item.file_name.clone(), result));
                }
                Err(e) => {
                    tracing::warn!(file = %item.file_name, error = %e, "skipping image");
                    item.state = ItemState::Failed;
                }
            }
        }

        let failed = job.count(ItemState::Failed);
        tracing::info!(
            folder = %dir.display(),
            succeeded = items.len(),
            failed,
            "batch finished"
        );
        Ok(BatchOutcome { job, items, failed })
    }

    /// Reads up to `max_frames` frames from `url`. The budget is checked
    /// before the stream is opened.
    pub fn process_stream(&self, url: &str, max_frames: u32) -> Result<StreamOutcome> {
        let budget = FrameBudget::new(max_frames)?;
        let mut detector = self.acquire()?;
        let mut source = CaptureSource::open(url)?;
        Ok(self.drive_frames(&mut *detector, &mut source, StreamSession::new(url, budget)))
    }

    /// Stream loop over an already opened source.
    pub fn process_frames<S: FrameSource>(
        &self,
        source: &mut S,
        session: StreamSession,
    ) -> Result<StreamOutcome> {
        let mut detector = self.acquire()?;
        Ok(self.drive_frames(&mut *detector, source, session))
    }

    fn drive_frames<S: FrameSource>(
        &self,
        detector: &mut D,
        source: &mut S,
        mut session: StreamSession,
    ) -> StreamOutcome {
        let mut results = Vec::new();
        let mut failed = 0;

        while !session.exhausted() {
            let Some(frame) = source.read_frame() else {
                break;
            };
            // A read frame consumes budget whether or not it processes cleanly
            session.frames_processed += 1;
            let index = session.frames_processed;

            match self.run_pipeline(detector, &frame) {
                Ok(result) => {
                    log_detections(
                        &format!("frame {index}"),
                        result.detections(),
                        detector.class_names(),
                    );
                    results.push(result);
                }
                Err(e) => {
                    tracing::warn!(url = %session.source_url, frame = index, error = %e, "skipping frame");
                    failed += 1;
                }
            }
        }

        session.succeeded = true;
        tracing::info!(
            url = %session.source_url,
            frames = session.frames_processed,
            results = results.len(),
            failed,
            "stream finished"
        );
        StreamOutcome {
            session,
            results,
            failed,
        }
    }

    fn image_pipeline(&self, detector: &mut D, path: &Path) -> Result<DetectionResult> {
        let image = read_image(path)?;
        self.run_pipeline(detector, &image)
    }

    fn run_pipeline(&self, detector: &mut D, image: &Mat) -> Result<DetectionResult> {
        let tensor = prepare(image)?;
        let raw = detector.infer(&tensor)?;
        let detections = self
            .postprocessor
            .postprocess(raw.view(), inference_size(), image.size()?);
        let annotated = annotate(image, &detections, detector.class_names())?;
        let encoded = encode_jpeg(&annotated)?;
        Ok(DetectionResult::new(encoded, detections))
    }
}

pub fn read_image(path: &Path) -> Result<Mat> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound(path.to_path_buf()));
    }
    let path_str = path
        .to_str()
        .ok_or_else(|| PipelineError::UnreadableImage(path.to_path_buf()))?;
    match imgcodecs::imread(path_str, imgcodecs::IMREAD_COLOR) {
        Ok(image) if !image.empty() => Ok(image),
        _ => Err(PipelineError::UnreadableImage(path.to_path_buf())),
    }
}

fn log_detections(source: &str, detections: &[Detection], class_names: Option<&[String]>) {
    if detections.is_empty() {
        tracing::info!(source = %source, "no detections");
        return;
    }

    tracing::info!(source = %source, count = detections.len(), "objects detected");
    for (i, detection) in detections.iter().enumerate() {
        let [x1, y1, x2, y2] = detection.bbox;
        let (cx, cy) = detection.center();
        tracing::debug!(
            source = %source,
            index = i + 1,
            label = %label_for(detection, class_names),
            bbox = %format!("({x1},{y1})-({x2},{y2})"),
            center = %format!("({cx},{cy})"),
            "detection"
        );
    }
}
