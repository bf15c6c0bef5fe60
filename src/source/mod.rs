mod capture;
mod orchestrator;
mod output;

pub use capture::{CaptureSource, FrameSource};
pub use orchestrator::{
    has_image_extension, read_image, BatchItem, BatchJob, BatchOutcome, ItemState, Orchestrator,
    StreamOutcome, StreamSession, IMAGE_EXTENSIONS,
};
pub use output::{stream_frame_name, OutputNaming, OutputWriter, SUMMARY_FILE};
