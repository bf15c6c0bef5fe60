use std::path::Path;

use ndarray::{array, Array2, Array4};
use opencv::core::{Mat, Scalar, Vector, CV_8UC3};
use opencv::imgcodecs;
use opencv::prelude::*;

use yoloframe::detect::RawPredictions;
use yoloframe::source::{ItemState, SUMMARY_FILE};
use yoloframe::{Detector, Orchestrator, OutputNaming, OutputWriter, PostProcessor, Result};

struct OneBoxDetector {
    names: Vec<String>,
}

impl Detector for OneBoxDetector {
    fn class_names(&self) -> Option<&[String]> {
        Some(self.names.as_slice())
    }

    fn infer(&mut self, _input: &Array4<f32>) -> Result<RawPredictions> {
        Ok(array![[320.0, 240.0, 100.0, 80.0, 0.95, 0.1, 0.9]])
    }
}

fn write_image(path: &Path, width: i32, height: i32) {
    let mat =
        Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::new(40.0, 80.0, 120.0, 0.0))
            .unwrap();
    assert!(imgcodecs::imwrite(path.to_str().unwrap(), &mat, &Vector::new()).unwrap());
}

fn orchestrator() -> Orchestrator<OneBoxDetector> {
    Orchestrator::new(
        OneBoxDetector {
            names: vec!["cat".to_string(), "dog".to_string()],
        },
        PostProcessor::new(0.5, 0.5),
    )
}

#[test]
fn folder_with_one_corrupt_file_keeps_going() {
    let dir = tempfile::tempdir().unwrap();
    write_image(&dir.path().join("c.png"), 320, 240);
    write_image(&dir.path().join("a.jpg"), 640, 480);
    std::fs::write(dir.path().join("b.jpg"), b"\x00\x01garbage").unwrap();
    write_image(&dir.path().join("d.bmp"), 100, 100);
    std::fs::write(dir.path().join("readme.txt"), b"not scanned").unwrap();
    std::fs::create_dir(dir.path().join("nested.jpg")).unwrap();

    let outcome = orchestrator().process_folder(dir.path()).unwrap();

    let names: Vec<&str> = outcome.items.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["a.jpg", "c.png", "d.bmp"]);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.job.items.len(), 4);
    assert_eq!(outcome.job.count(ItemState::Failed), 1);
    assert_eq!(outcome.job.items[1].file_name, "b.jpg");
    assert_eq!(outcome.job.items[1].state, ItemState::Failed);

    // 100x80 box at the center of the 640x480 inference frame, scaled per axis
    let (_, c_result) = &outcome.items[1];
    assert_eq!(c_result.detections()[0].bbox, [135, 100, 185, 140]);
    assert_eq!(c_result.detections()[0].class_id, 1);
}

#[test]
fn batch_outputs_are_written_with_prefix() {
    let input = tempfile::tempdir().unwrap();
    write_image(&input.path().join("one.jpg"), 64, 48);
    write_image(&input.path().join("two.png"), 64, 48);

    let outcome = orchestrator().process_folder(input.path()).unwrap();
    let output = tempfile::tempdir().unwrap();
    let writer = OutputWriter::new(output.path(), OutputNaming::Detected).unwrap();
    let written = writer.write_batch(&outcome).unwrap();

    assert_eq!(
        written,
        vec![
            output.path().join("detected_one.jpg"),
            output.path().join("detected_two.png"),
        ]
    );
    for path in &written {
        let decoded = imgcodecs::imread(path.to_str().unwrap(), imgcodecs::IMREAD_COLOR).unwrap();
        assert_eq!(decoded.cols(), 64);
    }
    assert!(output.path().join(SUMMARY_FILE).exists());
}

#[test]
fn empty_detections_still_produce_an_image() {
    struct NothingDetector;

    impl Detector for NothingDetector {
        fn class_names(&self) -> Option<&[String]> {
            None
        }

        fn infer(&mut self, _input: &Array4<f32>) -> Result<RawPredictions> {
            Ok(Array2::zeros((0, 7)))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.png");
    write_image(&path, 640, 480);

    let orchestrator = Orchestrator::new(NothingDetector, PostProcessor::new(0.5, 0.5));
    let result = orchestrator.process_image(&path).unwrap();
    assert!(result.detections().is_empty());
    assert_eq!(&result.encoded_image()[..2], &[0xFF, 0xD8]);
}
