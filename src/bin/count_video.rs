//! count_video - count objects crossing a horizontal line in a stored video.
//!
//! Settings come from `$COUNTER_CONFIG` (TOML) and `COUNTER_*` environment variables; flags
//! override both. Prints the per-class counts, or the full run report with `--json`.

use anyhow::Result;
use clap::{ArgGroup, Parser};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use line_counter::annotate::FrameSink;
use line_counter::config::CounterConfig;
use line_counter::detect::build_backend;
use line_counter::frame::VideoInfo;
use line_counter::ingest::{self, FrameSource};
use line_counter::{CancelFlag, ClassTable, CounterContext};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "count_video",
    about = "Count objects crossing a horizontal line in a video",
    group(ArgGroup::new("annotated").args(["output_dir", "output_video"]))
)]
struct Args {
    /// Video to count (local path, .y4m, or stub://name?frames=N)
    #[arg(long, value_name = "PATH")]
    video: String,

    /// Class table (YAML with a `names` key)
    #[arg(long, value_name = "PATH")]
    classes: Option<PathBuf>,

    /// Model file (ONNX for tract, JSON script for scripted)
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Detector backend (tract|scripted)
    #[arg(long, value_name = "NAME")]
    backend: Option<String>,

    /// Counting line row in pixels (default: 40% of frame height)
    #[arg(long, value_name = "Y", allow_negative_numbers = true)]
    line_y: Option<i32>,

    /// Half-height of the counting band in pixels
    #[arg(long, allow_negative_numbers = true)]
    tolerance: Option<i32>,

    /// Evaluate every Nth decoded frame
    #[arg(long)]
    frame_skip: Option<u32>,

    /// Minimum detection confidence
    #[arg(long)]
    conf: Option<f32>,

    /// Write annotated frames as JPEGs into this directory
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Write an annotated video (.mp4/.avi/.mkv) at the source frame rate
    #[arg(long, value_name = "PATH")]
    output_video: Option<PathBuf>,

    /// TTF/OTF font for labels on annotated frames
    #[arg(long, value_name = "PATH", requires = "annotated")]
    font: Option<PathBuf>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = CounterConfig::load()?;
    if let Some(classes) = &args.classes {
        cfg.classes_path = classes.clone();
    }
    if let Some(model) = &args.model {
        cfg.model.path = Some(model.clone());
    }
    if let Some(backend) = &args.backend {
        cfg.model.backend = backend.clone();
    }
    let mut options = cfg.count_options();
    if args.line_y.is_some() {
        options.line_y = args.line_y;
    }
    if let Some(tolerance) = args.tolerance {
        options.tolerance = tolerance;
    }
    if let Some(frame_skip) = args.frame_skip {
        options.frame_skip = frame_skip;
    }
    if let Some(conf) = args.conf {
        options.min_confidence = conf;
    }
    options.validate()?;

    let classes = {
        let _stage = ui.stage("Load class table");
        ClassTable::load(&cfg.classes_path)?
    };
    let backend = {
        let _stage = ui.stage("Load detector");
        build_backend(&cfg.model)?
    };
    let mut context = CounterContext::new(backend, classes).with_tracker_config(cfg.tracker.clone());

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || handler_flag.cancel()).expect("error setting Ctrl-C handler");

    let source = ui.track_frames(ingest::open_video(&args.video)?);
    let mut sink = open_sink(&args, source.info())?;
    let sink_ref: Option<&mut dyn FrameSink> = match sink.as_mut() {
        Some(boxed) => Some(&mut **boxed),
        None => None,
    };
    let report = {
        let _stage = ui.stage(&format!("Count {}", args.video));
        context.count_source(source, &args.video, &options, sink_ref, &cancel)?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!(
        "Total Objects Detected: {}",
        report.snapshot.total_count()
    );
    println!("Counts by Class:");
    for (class_name, count) in report.snapshot.counts_by_class() {
        println!("{}: {}", class_name, count);
    }
    if report.detections_rejected > 0 {
        println!("({} malformed detections skipped)", report.detections_rejected);
    }
    Ok(())
}

fn open_sink(args: &Args, info: VideoInfo) -> Result<Option<Box<dyn FrameSink>>> {
    if let Some(dir) = &args.output_dir {
        return open_image_sink(dir, args.font.as_deref()).map(Some);
    }
    if let Some(path) = &args.output_video {
        return open_video_sink(path, info, args.font.as_deref()).map(Some);
    }
    Ok(None)
}

#[cfg(feature = "sink-image")]
fn open_image_sink(dir: &Path, font: Option<&Path>) -> Result<Box<dyn FrameSink>> {
    Ok(Box::new(line_counter::annotate::ImageDirSink::create(dir, font)?))
}

#[cfg(not(feature = "sink-image"))]
fn open_image_sink(_dir: &Path, _font: Option<&Path>) -> Result<Box<dyn FrameSink>> {
    Err(anyhow::anyhow!(
        "--output-dir requires the sink-image feature (rebuild with --features sink-image)"
    ))
}

#[cfg(feature = "sink-video")]
fn open_video_sink(path: &Path, info: VideoInfo, font: Option<&Path>) -> Result<Box<dyn FrameSink>> {
    Ok(Box::new(line_counter::annotate::VideoFileSink::create(
        path, info, font,
    )?))
}

#[cfg(not(feature = "sink-video"))]
fn open_video_sink(
    _path: &Path,
    _info: VideoInfo,
    _font: Option<&Path>,
) -> Result<Box<dyn FrameSink>> {
    Err(anyhow::anyhow!(
        "--output-video requires the sink-video feature (rebuild with --features sink-video)"
    ))
}
