use opencv::core::{Mat, Vector};
use opencv::imgcodecs;

use crate::error::{PipelineError, Result};

/// JPEG-encodes a raster with the codec's default quality.
pub fn encode_jpeg(mat: &Mat) -> Result<Vec<u8>> {
    let mut buf = Vector::<u8>::new();
    let params = Vector::<i32>::new();
    if !imgcodecs::imencode(".jpg", mat, &mut buf, &params)? {
        return Err(PipelineError::processing("jpeg encoder rejected raster"));
    }
    Ok(buf.to_vec())
}
