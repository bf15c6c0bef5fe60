use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::detect::{Detection, DetectionResult};

use super::orchestrator::{BatchOutcome, StreamOutcome};

pub const SUMMARY_FILE: &str = "detections.json";
const SINGLE_IMAGE_FILE: &str = "predicted_image.jpg";

/// File naming convention for annotated outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputNaming {
    /// `predicted_image.jpg` / `predicted_<file>`
    #[default]
    Predicted,
    /// `detected_<file>` for every image
    Detected,
}

impl OutputNaming {
    pub fn prefix(self) -> &'static str {
        match self {
            OutputNaming::Predicted => "predicted_",
            OutputNaming::Detected => "detected_",
        }
    }

    pub fn single_image_name(self, source: &Path) -> String {
        match self {
            OutputNaming::Predicted => SINGLE_IMAGE_FILE.to_string(),
            OutputNaming::Detected => {
                let file_name = source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "image.jpg".to_string());
                self.batch_item_name(&file_name)
            }
        }
    }

    pub fn batch_item_name(self, file_name: &str) -> String {
        format!("{}{}", self.prefix(), file_name)
    }
}

pub fn stream_frame_name(index: usize) -> String {
    format!("frame_{index:04}.jpg")
}

#[derive(Debug, Serialize)]
struct SummaryEntry<'a> {
    file: &'a str,
    detections: &'a [Detection],
}

/// Writes encoded results and a JSON summary of their detections.
pub struct OutputWriter {
    dir: PathBuf,
    naming: OutputNaming,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>, naming: OutputNaming) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, naming })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_image(&self, source: &Path, result: &DetectionResult) -> std::io::Result<PathBuf> {
        let name = self.naming.single_image_name(source);
        let path = self.write_one(&name, result)?;
        self.write_summary(&[(name.as_str(), result)])?;
        Ok(path)
    }

    pub fn write_batch(&self, outcome: &BatchOutcome) -> std::io::Result<Vec<PathBuf>> {
        let names: Vec<String> = outcome
            .items
            .iter()
            .map(|(file_name, _)| self.naming.batch_item_name(file_name))
            .collect();

        let mut written = Vec::with_capacity(names.len());
        for (name, (_, result)) in names.iter().zip(&outcome.items) {
            written.push(self.write_one(name, result)?);
        }

        let entries: Vec<(&str, &DetectionResult)> = names
            .iter()
            .map(String::as_str)
            .zip(outcome.items.iter().map(|(_, r)| r))
            .collect();
        self.write_summary(&entries)?;
        Ok(written)
    }

    pub fn write_stream(&self, outcome: &StreamOutcome) -> std::io::Result<Vec<PathBuf>> {
        let names: Vec<String> = (0..outcome.results.len()).map(stream_frame_name).collect();

        let mut written = Vec::with_capacity(names.len());
        for (name, result) in names.iter().zip(&outcome.results) {
            written.push(self.write_one(name, result)?);
        }

        let entries: Vec<(&str, &DetectionResult)> =
            names.iter().map(String::as_str).zip(&outcome.results).collect();
        self.write_summary(&entries)?;
        Ok(written)
    }

    fn write_one(&self, name: &str, result: &DetectionResult) -> std::io::Result<PathBuf> {
        let path = self.dir.join(name);
        std::fs::write(&path, result.encoded_image())?;
        tracing::debug!(path = %path.display(), bytes = result.encoded_image().len(), "wrote result");
        Ok(path)
    }

    fn write_summary(&self, entries: &[(&str, &DetectionResult)]) -> std::io::Result<PathBuf> {
        let summary: Vec<SummaryEntry<'_>> = entries
            .iter()
            .map(|&(file, result)| SummaryEntry {
                file,
                detections: result.detections(),
            })
            .collect();
        let path = self.dir.join(SUMMARY_FILE);
        std::fs::write(&path, serde_json::to_vec_pretty(&summary)?)?;
        Ok(path)
    }
}
