use ndarray::ArrayView2;
use opencv::core::Size;

use super::types::Detection;

/// Upper bound on detections kept per image.
pub const MAX_DETECTIONS: usize = 300;

/// Box in inference coordinates, `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: usize,
}

/// Intersection over union of two corner-form boxes. Degenerate pairs
/// (zero union) yield 0.
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter_area = inter_w * inter_h;

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter_area;
    if union <= 0.0 {
        0.0
    } else {
        inter_area / union
    }
}

/// Greedy class-agnostic NMS. Returns survivors in descending confidence;
/// any pair of survivors has IoU below `iou_threshold`.
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut suppressed = vec![false; candidates.len()];
    let mut keep = Vec::new();
    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        let selected = candidates[i];
        keep.push(selected);
        for j in (i + 1)..candidates.len() {
            if !suppressed[j] && iou(&selected.bbox, &candidates[j].bbox) >= iou_threshold {
                suppressed[j] = true;
            }
        }
    }
    keep
}

#[derive(Debug, Clone, Copy)]
pub struct PostProcessor {
    conf_threshold: f32,
    iou_threshold: f32,
}

impl PostProcessor {
    pub fn new(conf_threshold: f32, iou_threshold: f32) -> Self {
        Self {
            conf_threshold,
            iou_threshold,
        }
    }

    /// Turns raw prediction rows (`cx, cy, w, h, objectness, class scores...`
    /// in inference pixels) into detections in original-image pixels.
    pub fn postprocess(
        &self,
        raw: ArrayView2<f32>,
        inference: Size,
        original: Size,
    ) -> Vec<Detection> {
        let candidates = self.candidates(raw);
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut kept = non_max_suppression(candidates, self.iou_threshold);
        kept.truncate(MAX_DETECTIONS);
        kept.iter()
            .map(|c| rescale(c, inference, original))
            .collect()
    }

    /// Confidence filter. Confidence is objectness times the best class score.
    pub fn candidates(&self, raw: ArrayView2<f32>) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        if raw.ncols() < 5 {
            return candidates;
        }

        for row in raw.rows() {
            let objectness = row[4];
            let (class_id, class_score) = row
                .iter()
                .skip(5)
                .copied()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |best, (j, score)| {
                    if score > best.1 {
                        (j, score)
                    } else {
                        best
                    }
                });
            // Single-class heads carry no class columns.
            let class_score = if raw.ncols() == 5 { 1.0 } else { class_score };

            let confidence = objectness * class_score;
            if !confidence.is_finite() || confidence < self.conf_threshold {
                continue;
            }

            let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
            candidates.push(Candidate {
                bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
                confidence,
                class_id,
            });
        }
        candidates
    }
}

/// Maps a box from inference space back to the original raster with
/// independent horizontal and vertical gains, then rounds and clamps.
pub fn rescale(candidate: &Candidate, inference: Size, original: Size) -> Detection {
    let gain_x = original.width as f32 / inference.width as f32;
    let gain_y = original.height as f32 / inference.height as f32;
    let max_x = (original.width - 1).max(0);
    let max_y = (original.height - 1).max(0);

    let [x1, y1, x2, y2] = candidate.bbox;
    let x1 = (x1 * gain_x).round() as i32;
    let x2 = (x2 * gain_x).round() as i32;
    let y1 = (y1 * gain_y).round() as i32;
    let y2 = (y2 * gain_y).round() as i32;

    Detection {
        bbox: [
            x1.min(x2).clamp(0, max_x),
            y1.min(y2).clamp(0, max_y),
            x1.max(x2).clamp(0, max_x),
            y1.max(y2).clamp(0, max_y),
        ],
        confidence: candidate.confidence,
        class_id: candidate.class_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn candidate(bbox: [f32; 4], confidence: f32, class_id: usize) -> Candidate {
        Candidate {
            bbox,
            confidence,
            class_id,
        }
    }

    #[test]
    fn test_iou_known_values() {
        let a = [10.0, 10.0, 50.0, 50.0];
        let b = [12.0, 12.0, 48.0, 48.0];
        assert!((iou(&a, &b) - 1296.0 / 1600.0).abs() < 1e-6);
        assert_eq!(iou(&a, &[60.0, 60.0, 70.0, 70.0]), 0.0);
        assert_eq!(iou(&a, &a), 1.0);
    }

    #[test]
    fn test_iou_degenerate_is_zero() {
        let point = [5.0, 5.0, 5.0, 5.0];
        assert_eq!(iou(&point, &point), 0.0);
    }

    #[test]
    fn test_nms_drops_overlapping_lower_confidence() {
        let kept = non_max_suppression(
            vec![
                candidate([10.0, 10.0, 50.0, 50.0], 0.9, 0),
                candidate([12.0, 12.0, 48.0, 48.0], 0.8, 0),
            ],
            0.5,
        );
        assert_eq!(kept, vec![candidate([10.0, 10.0, 50.0, 50.0], 0.9, 0)]);
    }

    #[test]
    fn test_nms_is_class_agnostic_and_ordered() {
        let kept = non_max_suppression(
            vec![
                candidate([0.0, 0.0, 10.0, 10.0], 0.6, 1),
                candidate([100.0, 100.0, 120.0, 120.0], 0.95, 2),
                candidate([0.0, 0.0, 10.0, 11.0], 0.7, 3),
            ],
            0.5,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.95);
        assert_eq!(kept[1].class_id, 3);
    }

    #[test]
    fn test_nms_survivors_pairwise_below_threshold_and_idempotent() {
        let mut input = Vec::new();
        for i in 0..40 {
            let offset = (i * 7 % 53) as f32;
            let size = 20.0 + (i % 5) as f32 * 6.0;
            input.push(candidate(
                [offset, offset / 2.0, offset + size, offset / 2.0 + size],
                0.3 + (i as f32 * 0.013) % 0.7,
                i % 3,
            ));
        }
        let threshold = 0.45;
        let kept = non_max_suppression(input, threshold);
        for (i, a) in kept.iter().enumerate() {
            for b in kept.iter().skip(i + 1) {
                assert!(iou(&a.bbox, &b.bbox) < threshold);
            }
        }
        let again = non_max_suppression(kept.clone(), threshold);
        assert_eq!(again, kept);
    }

    #[test]
    fn test_candidates_confidence_filter() {
        let raw = array![
            [30.0, 30.0, 40.0, 40.0, 0.9, 0.1, 0.8],
            [30.0, 30.0, 40.0, 40.0, 0.6, 0.9, 0.1],
            [30.0, 30.0, 40.0, 40.0, 0.4, 0.5, 0.5],
        ];
        let pp = PostProcessor::new(0.45, 0.5);
        let candidates = pp.candidates(raw.view());
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].class_id, 1);
        assert!((candidates[0].confidence - 0.72).abs() < 1e-6);
        assert_eq!(candidates[0].bbox, [10.0, 10.0, 50.0, 50.0]);
        assert_eq!(candidates[1].class_id, 0);
    }

    #[test]
    fn test_candidates_keep_confidence_equal_to_threshold() {
        let raw = array![
            [30.0, 30.0, 20.0, 20.0, 0.5, 1.0],
            [90.0, 90.0, 20.0, 20.0, 0.5, 0.999],
        ];
        let candidates = PostProcessor::new(0.5, 0.5).candidates(raw.view());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].confidence, 0.5);
    }

    #[test]
    fn test_postprocess_caps_detection_count() {
        // 20x20 grid of disjoint 10x10 boxes
        let raw = Array2::from_shape_fn((400, 6), |(i, j)| {
            let (col, row) = ((i % 20) as f32, (i / 20) as f32);
            match j {
                0 => col * 32.0 + 10.0,
                1 => row * 24.0 + 10.0,
                2 | 3 => 10.0,
                4 => 1.0,
                _ => 0.6 + i as f32 * 0.0005,
            }
        });
        let pp = PostProcessor::new(0.5, 0.5);
        let detections = pp.postprocess(raw.view(), Size::new(640, 480), Size::new(640, 480));
        assert_eq!(detections.len(), MAX_DETECTIONS);
        assert!(detections
            .windows(2)
            .all(|pair| pair[0].confidence >= pair[1].confidence));
        assert!(detections[0].confidence > 0.79);
    }

    #[test]
    fn test_postprocess_empty_after_filter() {
        let raw = array![[30.0, 30.0, 40.0, 40.0, 0.1, 0.2]];
        let pp = PostProcessor::new(0.5, 0.5);
        let detections = pp.postprocess(
            raw.view(),
            Size::new(640, 480),
            Size::new(1280, 960),
        );
        assert!(detections.is_empty());
    }

    #[test]
    fn test_postprocess_rescales_per_axis() {
        let raw = array![[320.0, 240.0, 64.0, 48.0, 1.0, 0.9]];
        let pp = PostProcessor::new(0.5, 0.5);
        let detections = pp.postprocess(
            raw.view(),
            Size::new(640, 480),
            Size::new(1280, 240),
        );
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, [576, 108, 704, 132]);
        assert_eq!(detections[0].class_id, 0);
    }

    #[test]
    fn test_rescale_clamps_to_bounds() {
        let c = candidate([-20.0, -5.0, 700.0, 500.0], 0.9, 0);
        let d = rescale(&c, Size::new(640, 480), Size::new(320, 240));
        assert_eq!(d.bbox, [0, 0, 319, 239]);
    }

    #[test]
    fn test_rescale_orders_corners() {
        let c = candidate([50.0, 60.0, 10.0, 20.0], 0.9, 0);
        let d = rescale(&c, Size::new(640, 480), Size::new(640, 480));
        assert_eq!(d.bbox, [10, 20, 50, 60]);
    }
}
