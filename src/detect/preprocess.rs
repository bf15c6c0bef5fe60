use ndarray::Array4;
use opencv::core::{Mat, Size, CV_8U};
use opencv::imgproc;
use opencv::prelude::*;

use crate::error::{PipelineError, Result};

pub const INFERENCE_WIDTH: i32 = 640;
pub const INFERENCE_HEIGHT: i32 = 480;

pub fn inference_size() -> Size {
    Size::new(INFERENCE_WIDTH, INFERENCE_HEIGHT)
}

/// Stretches `image` to the inference resolution and lays it out as a
/// `[1, 3, H, W]` tensor scaled to `[0, 1]`.
///
/// Aspect ratio is not preserved and no padding is added; postprocessing
/// undoes the stretch with independent per-axis gains. Channels stay in the
/// raster's own order.
pub fn prepare(image: &Mat) -> Result<Array4<f32>> {
    let rows = image.rows();
    let cols = image.cols();
    if rows <= 0 || cols <= 0 {
        return Err(PipelineError::InvalidImage(format!(
            "raster has zero extent ({cols}x{rows})"
        )));
    }
    if image.channels() != 3 {
        return Err(PipelineError::InvalidImage(format!(
            "expected 3 channels, got {}",
            image.channels()
        )));
    }
    if image.depth() != CV_8U {
        return Err(PipelineError::InvalidImage(
            "expected 8-bit channels".to_string(),
        ));
    }

    let mut resized = Mat::default();
    imgproc::resize(
        image,
        &mut resized,
        inference_size(),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let width = INFERENCE_WIDTH as usize;
    let height = INFERENCE_HEIGHT as usize;
    let data = resized.data_bytes()?;
    if data.len() < width * height * 3 {
        return Err(PipelineError::InvalidImage(
            "resized frame data too small".to_string(),
        ));
    }

    let mut tensor = Array4::<f32>::zeros((1, 3, height, width));
    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) * 3;
            tensor[[0, 0, y, x]] = data[idx] as f32 / 255.0;
            tensor[[0, 1, y, x]] = data[idx + 1] as f32 / 255.0;
            tensor[[0, 2, y, x]] = data[idx + 2] as f32 / 255.0;
        }
    }

    Ok(tensor)
}
