use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgGroup, Parser};
use tracing_subscriber::EnvFilter;

use yoloframe::{
    spawn_job, Config, FrameBudget, Job, JobOutcome, OnnxDetector, Orchestrator, OutputNaming,
    OutputWriter, PipelineError, PostProcessor,
};

#[derive(Parser)]
#[command(name = "yoloframe")]
#[command(about = "Run an object-detection model over images, folders or streams")]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .multiple(false)
        .args(["image", "folder", "stream"])
))]
struct Cli {
    /// Path or URL of the ONNX model
    #[arg(long, value_name = "PATH")]
    model: String,

    /// Confidence threshold [default: 0.5]
    #[arg(long, value_name = "FLOAT")]
    conf_thres: Option<f32>,

    /// NMS IoU threshold [default: 0.5]
    #[arg(long, value_name = "FLOAT")]
    iou_thres: Option<f32>,

    /// Single image to process
    #[arg(long, value_name = "PATH")]
    image: Option<PathBuf>,

    /// Folder of images to process
    #[arg(long, value_name = "PATH")]
    folder: Option<PathBuf>,

    /// Stream URL, video file or camera index
    #[arg(long, value_name = "URL")]
    stream: Option<String>,

    /// Output directory [default: ./output]
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Maximum stream frames to read, 1-1000 [default: 100]
    #[arg(long, value_name = "N")]
    max_frames: Option<u32>,

    /// Class label file, one name per line
    #[arg(long, value_name = "PATH")]
    names: Option<PathBuf>,

    /// Output file naming convention
    #[arg(long, value_enum)]
    naming: Option<OutputNaming>,

    /// TOML file supplying defaults for the options above
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(conf) = self.conf_thres {
            config.detector.conf_thres = conf;
        }
        if let Some(iou) = self.iou_thres {
            config.detector.iou_thres = iou;
        }
        if let Some(names) = &self.names {
            config.detector.names_file = Some(names.clone());
        }
        if let Some(dir) = &self.output {
            config.output.dir = dir.clone();
        }
        if let Some(naming) = self.naming {
            config.output.naming = naming;
        }
        if let Some(max_frames) = self.max_frames {
            config.stream.max_frames = max_frames;
        }
    }

    /// The frame budget only matters, and is only checked, for streams.
    fn job(&self, max_frames: u32) -> Result<Job, PipelineError> {
        match (&self.image, &self.folder, &self.stream) {
            (Some(image), None, None) => Ok(Job::Image(image.clone())),
            (None, Some(folder), None) => Ok(Job::Folder(folder.clone())),
            (None, None, Some(url)) => Ok(Job::Stream {
                url: url.clone(),
                max_frames: FrameBudget::new(max_frames)?.get(),
            }),
            _ => Err(PipelineError::InvalidConfiguration(
                "exactly one of --image, --folder, --stream is required".to_string(),
            )),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("yoloframe=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    let job = cli.job(config.stream.max_frames)?;
    let writer = OutputWriter::new(&config.output.dir, config.output.naming)?;

    let detector = OnnxDetector::load(&cli.model, config.detector.names_file.as_deref())?;
    let postprocessor = PostProcessor::new(config.detector.conf_thres, config.detector.iou_thres);
    let orchestrator = Arc::new(Orchestrator::new(detector, postprocessor));

    let source_image = match &job {
        Job::Image(path) => Some(path.clone()),
        _ => None,
    };

    match spawn_job(orchestrator, job).await?? {
        JobOutcome::Image(result) => {
            let source = source_image.unwrap_or_default();
            let path = writer.write_image(&source, &result)?;
            tracing::info!(
                path = %path.display(),
                detections = result.detections().len(),
                "result saved"
            );
        }
        JobOutcome::Folder(outcome) => {
            writer.write_batch(&outcome)?;
            tracing::info!(
                images = outcome.items.len(),
                failed = outcome.failed,
                dir = %writer.dir().display(),
                "results saved"
            );
        }
        JobOutcome::Stream(outcome) => {
            writer.write_stream(&outcome)?;
            tracing::info!(
                frames = outcome.results.len(),
                failed = outcome.failed,
                dir = %writer.dir().display(),
                "results saved"
            );
        }
    }

    Ok(())
}
