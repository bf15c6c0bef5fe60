mod detector;
mod postprocess;
mod preprocess;
mod types;

pub use detector::{
    end_to_end_rows, parse_names_metadata, prediction_rows, read_names_file, Detector,
    OnnxDetector, RawPredictions,
};
pub use postprocess::{
    iou, non_max_suppression, rescale, Candidate, PostProcessor, MAX_DETECTIONS,
};
pub use preprocess::{inference_size, prepare, INFERENCE_HEIGHT, INFERENCE_WIDTH};
pub use types::{Detection, DetectionResult};
