use serde::Serialize;

/// A single detection in original-image pixel space.
///
/// `bbox` is `[x1, y1, x2, y2]` with `x1 <= x2`, `y1 <= y2`, both corners
/// inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: [i32; 4],
    pub confidence: f32,
    pub class_id: usize,
}

impl Detection {
    pub fn center(&self) -> (i32, i32) {
        let [x1, y1, x2, y2] = self.bbox;
        ((x1 + x2) / 2, (y1 + y2) / 2)
    }
}

/// Output of one pipeline pass: the encoded annotated image and the
/// detections drawn onto it.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    encoded_image: Vec<u8>,
    detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(encoded_image: Vec<u8>, detections: Vec<Detection>) -> Self {
        Self {
            encoded_image,
            detections,
        }
    }

    pub fn encoded_image(&self) -> &[u8] {
        &self.encoded_image
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }
}
