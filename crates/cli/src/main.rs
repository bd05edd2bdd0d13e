use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use clap::Parser;

use facestream_core::detection::domain::face_detector::FaceDetector;
use facestream_core::detection::infrastructure::model_resolver;
use facestream_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use facestream_core::pipeline::orchestrator::{PipelineEvent, PipelineOrchestrator};
use facestream_core::pipeline::pipeline_error::TerminationReason;
use facestream_core::pipeline::pipeline_logger::StatsPipelineLogger;
use facestream_core::pipeline::pipeline_settings::PipelineSettings;
use facestream_core::rendering::infrastructure::image_file_sink::ImageFileSink;
use facestream_core::shared::constants::{YOLO_MODEL_NAME, YOLO_MODEL_URL};
use facestream_core::shared::source_descriptor::SourceDescriptor;
use facestream_core::video::domain::video_source::{SourceFactory, VideoSource};
use facestream_core::video::infrastructure::ffmpeg_source::{DeviceSettings, FfmpegSource};

/// Live face detection over a camera or a looping video file.
#[derive(Parser, Debug)]
#[command(name = "facestream")]
struct Cli {
    /// Capture device index (e.g. 0) or video file path.
    source: String,

    /// Directory receiving latest.png and face_<i>.png.
    #[arg(long)]
    output_dir: PathBuf,

    /// YOLO face model (.onnx). Defaults to the cached download.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Pipeline settings JSON file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Face detection confidence threshold (0.0-1.0), overrides the config.
    #[arg(long)]
    confidence: Option<f64>,

    /// Stop after this many seconds instead of running until the source fails.
    #[arg(long)]
    duration: Option<f64>,

    /// Minimum time between image writes.
    #[arg(long, default_value = "200")]
    write_interval_ms: u64,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let descriptor = parse_source(&cli.source);
    let settings = load_settings(&cli)?;
    let detector = build_detector(&cli, settings.confidence)?;
    let sink = ImageFileSink::new(&cli.output_dir, Duration::from_millis(cli.write_interval_ms))?;
    let logger = Arc::new(Mutex::new(StatsPipelineLogger::new()));

    let mut orchestrator =
        PipelineOrchestrator::new(ffmpeg_factory(&settings), detector, Box::new(sink))
            .with_settings(settings)
            .with_logger(logger);
    orchestrator.configure(descriptor)?;

    let events = orchestrator.events();
    orchestrator.start()?;
    let deadline = cli
        .duration
        .map(|secs| Instant::now() + Duration::from_secs_f64(secs));
    wait_for_end(&events, deadline);
    orchestrator.stop();

    let reason = orchestrator
        .last_termination()
        .cloned()
        .unwrap_or(TerminationReason::Stopped);
    if reason.is_failure() {
        return Err(format!("pipeline terminated ({}): {reason}", reason.code()).into());
    }
    log::info!("Output written to {}", cli.output_dir.display());
    Ok(())
}

/// Blocks until the pipeline terminates on its own or `deadline` passes.
fn wait_for_end(
    events: &crossbeam_channel::Receiver<PipelineEvent>,
    deadline: Option<Instant>,
) {
    loop {
        let timeout = match deadline {
            Some(at) => {
                let left = at.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return;
                }
                left
            }
            None => Duration::from_secs(60),
        };
        match events.recv_timeout(timeout) {
            Ok(PipelineEvent::Started(source)) => log::info!("Streaming from {source}"),
            Ok(PipelineEvent::Terminated(_)) => return,
            Err(_) if deadline.is_none() => continue,
            Err(_) => return,
        }
    }
}

fn parse_source(source: &str) -> SourceDescriptor {
    match source.parse() {
        Ok(descriptor) => descriptor,
        Err(never) => match never {},
    }
}

fn load_settings(cli: &Cli) -> Result<PipelineSettings, Box<dyn std::error::Error>> {
    let mut settings = match &cli.config {
        Some(path) => PipelineSettings::load(path)?,
        None => PipelineSettings::default(),
    };
    if let Some(confidence) = cli.confidence {
        settings.confidence = confidence;
    }
    settings.validate()?;
    Ok(settings)
}

fn ffmpeg_factory(settings: &PipelineSettings) -> SourceFactory {
    let device = DeviceSettings {
        width: settings.device_width,
        height: settings.device_height,
        fps: settings.device_fps,
    };
    Box::new(move |_: &SourceDescriptor| -> Box<dyn VideoSource> {
        Box::new(FfmpegSource::new(device))
    })
}

fn build_detector(
    cli: &Cli,
    confidence: f64,
) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    let model_path = model_resolver::resolve(
        cli.model.as_deref(),
        YOLO_MODEL_NAME,
        YOLO_MODEL_URL,
        Some(Box::new(download_progress)),
    )?;
    log::info!("Using model {}", model_path.display());
    Ok(Box::new(OnnxYoloDetector::new(&model_path, confidence)?))
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let SourceDescriptor::File(path) = parse_source(&cli.source) {
        // Network inputs (rtsp://, http://, ...) are left to ffmpeg to open.
        if !cli.source.contains("://") && !path.exists() {
            return Err(format!("Input file not found: {}", path.display()).into());
        }
    }
    if let Some(model) = &cli.model {
        if !model.is_file() {
            return Err(format!("Model file not found: {}", model.display()).into());
        }
    }
    if let Some(confidence) = cli.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!(
                "Confidence must be between 0.0 and 1.0, got {confidence}"
            )
            .into());
        }
    }
    if let Some(duration) = cli.duration {
        if !(duration.is_finite() && duration > 0.0) {
            return Err(
                format!("Duration must be a positive number of seconds, got {duration}").into(),
            );
        }
    }
    if cli.output_dir.is_file() {
        return Err(format!(
            "Output directory is a file: {}",
            cli.output_dir.display()
        )
        .into());
    }
    Ok(())
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
