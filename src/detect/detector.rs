use std::path::{Path, PathBuf};

use ndarray::{Array2, Array4, ArrayViewD, Axis, Ix2, Ix3};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;

use crate::error::{PipelineError, Result};

use super::preprocess::{INFERENCE_HEIGHT, INFERENCE_WIDTH};

/// Raw model output: one row per candidate, `cx, cy, w, h, objectness,
/// class scores...` in inference pixel coordinates.
pub type RawPredictions = Array2<f32>;

/// The inference capability the pipeline drives.
///
/// Implementations need not be reentrant; callers serialize access.
pub trait Detector: Send {
    /// Ordered class labels, indexed by class id, when the model carries them.
    fn class_names(&self) -> Option<&[String]>;

    fn infer(&mut self, input: &Array4<f32>) -> Result<RawPredictions>;
}

/// ONNX Runtime backed detector.
pub struct OnnxDetector {
    session: Session,
    class_names: Option<Vec<String>>,
}

impl OnnxDetector {
    /// Loads a model from a local path or an http(s) URL. Labels come from
    /// `names_file` when given, else from the model's `names` metadata.
    pub fn load(model_path: &str, names_file: Option<&Path>) -> Result<Self> {
        if !is_remote(model_path) && !Path::new(model_path).exists() {
            return Err(model_load_error(model_path, "file does not exist"));
        }

        let file_names = match names_file {
            Some(path) => Some(read_names_file(path).map_err(|e| {
                model_load_error(model_path, format!("names file {}: {e}", path.display()))
            })?),
            None => None,
        };

        let session = build_session(model_path)
            .map_err(|e| model_load_error(model_path, e.to_string()))?;

        let class_names = file_names.or_else(|| {
            session
                .metadata()
                .ok()
                .and_then(|meta| meta.custom("names").ok().flatten())
                .and_then(|raw| parse_names_metadata(&raw))
        });

        match &class_names {
            Some(names) => tracing::info!(model = %model_path, classes = names.len(), "model loaded"),
            None => tracing::info!(model = %model_path, "model loaded without class names"),
        }

        Ok(Self {
            session,
            class_names,
        })
    }
}

fn build_session(
    model_path: &str,
) -> std::result::Result<Session, Box<dyn std::error::Error + Send + Sync>> {
    let builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?;

    let session = if is_remote(model_path) {
        builder.commit_from_url(model_path)?
    } else {
        builder.commit_from_file(model_path)?
    };
    Ok(session)
}

/// Models given as http(s) URLs are fetched and cached by ort.
fn is_remote(model_path: &str) -> bool {
    model_path.starts_with("http://") || model_path.starts_with("https://")
}

fn model_load_error(path: &str, reason: impl Into<String>) -> PipelineError {
    PipelineError::ModelLoad {
        path: PathBuf::from(path),
        reason: reason.into(),
    }
}

impl Detector for OnnxDetector {
    fn class_names(&self) -> Option<&[String]> {
        self.class_names.as_deref()
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<RawPredictions> {
        let tensor_ref = TensorRef::from_array_view(input.view())?.into_dyn();
        let outputs = self.session.run(ort::inputs![tensor_ref])?;

        // End-to-end heads emit separate "logits" and "pred_boxes" outputs
        if let (Some(logits_val), Some(boxes_val)) =
            (outputs.get("logits"), outputs.get("pred_boxes"))
        {
            let logits = logits_val.try_extract_array::<f32>()?;
            let boxes = boxes_val.try_extract_array::<f32>()?;
            return end_to_end_rows(&logits, &boxes);
        }

        let value = match outputs.get("output0") {
            Some(v) => v,
            None => &outputs[0],
        };
        let raw = value.try_extract_array::<f32>()?;
        prediction_rows(&raw)
    }
}

/// Flattens a prediction tensor into rows.
///
/// Accepts `[N, 5+C]`, `[1, N, 5+C]` and the channel-major `[1, 5+C, N]`.
/// A batched tensor whose middle axis is shorter than its last is taken to be
/// channel-major and transposed.
pub fn prediction_rows(raw: &ArrayViewD<f32>) -> Result<RawPredictions> {
    let rows = match raw.shape() {
        &[1, a, b] => {
            let view = raw
                .view()
                .into_dimensionality::<Ix3>()
                .map_err(|e| PipelineError::processing(e.to_string()))?
                .index_axis_move(Axis(0), 0);
            if a < b {
                view.reversed_axes().as_standard_layout().into_owned()
            } else {
                view.to_owned()
            }
        }
        &[_, _] => raw
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|e| PipelineError::processing(e.to_string()))?
            .to_owned(),
        other => {
            return Err(PipelineError::processing(format!(
                "unsupported prediction shape {other:?}"
            )))
        }
    };

    let cols = rows.ncols();
    if cols < 5 {
        return Err(PipelineError::processing(format!(
            "prediction rows need at least 5 columns, got {cols}"
        )));
    }
    Ok(rows)
}

/// Converts end-to-end `logits [1, N, C]` and normalized `pred_boxes [1, N, 4]`
/// into the row layout used by postprocessing. Objectness is fixed at 1 and
/// class scores are sigmoid-activated.
pub fn end_to_end_rows(logits: &ArrayViewD<f32>, boxes: &ArrayViewD<f32>) -> Result<RawPredictions> {
    let logits_shape = logits.shape();
    if logits_shape.len() < 2 || boxes.shape().len() < 2 {
        return Ok(Array2::zeros((0, 5)));
    }

    let num_detections = logits_shape[logits_shape.len() - 2];
    let num_classes = logits_shape[logits_shape.len() - 1];

    let logits_flat: Vec<f32> = logits.iter().copied().collect();
    let boxes_flat: Vec<f32> = boxes.iter().copied().collect();
    if logits_flat.len() < num_detections * num_classes || boxes_flat.len() < num_detections * 4
    {
        return Err(PipelineError::processing(
            "logits and boxes disagree on detection count",
        ));
    }

    let width = INFERENCE_WIDTH as f32;
    let height = INFERENCE_HEIGHT as f32;
    let mut rows = Array2::<f32>::zeros((num_detections, 5 + num_classes));
    for i in 0..num_detections {
        rows[[i, 0]] = boxes_flat[i * 4] * width;
        rows[[i, 1]] = boxes_flat[i * 4 + 1] * height;
        rows[[i, 2]] = boxes_flat[i * 4 + 2] * width;
        rows[[i, 3]] = boxes_flat[i * 4 + 3] * height;
        rows[[i, 4]] = 1.0;
        for j in 0..num_classes {
            let logit = logits_flat[i * num_classes + j];
            rows[[i, 5 + j]] = 1.0 / (1.0 + (-logit).exp());
        }
    }
    Ok(rows)
}

pub fn read_names_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Parses exporter metadata of the form `{0: 'person', 1: 'bicycle'}`.
/// Indices must be contiguous from zero.
pub fn parse_names_metadata(raw: &str) -> Option<Vec<String>> {
    let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut names = Vec::new();
    let mut rest = body;

    while let Some(colon) = rest.find(':') {
        let key = rest[..colon].trim().trim_start_matches(',').trim();
        let index: usize = key.parse().ok()?;
        if index != names.len() {
            return None;
        }

        let value = rest[colon + 1..].trim_start();
        let quote = value.chars().next()?;
        if quote != '\'' && quote != '"' {
            return None;
        }
        let end = value[1..].find(quote)?;
        names.push(value[1..1 + end].to_string());
        rest = &value[end + 2..];
    }

    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}
