use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{info, warn};
use pulse_lib::{
    clock::{Clock, ManualClock, SystemClock},
    config::{InferenceMode, PipelineConfig, ValleyDetectorKind},
    detectors::detector_from_config,
    io::{read_samples, SampleColumn},
    metrics::{
        estimate_heart_rate, estimate_hrv, extract_features, features::FEATURE_NAMES,
        hrv_from_rr_ms, hrv_time, FeatureArity, HRVTime, HeartRateEstimate, HrvEstimate,
    },
    observe::{EventCounters, Fanout, LogObserver},
    pipeline::{Phase, PipelineSnapshot, PulsePipeline},
    quality::{LinearSoftmaxModel, QualityAssessment, SharedModel},
    record::{JsonLinesStore, RecordSchedule, RecordStore},
    signal::{TimeSeries, Valley},
};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

#[derive(Parser)]
#[command(name = "pulse", version, about = "Streaming PPG heart-rate and HRV tools")]
struct Cli {
    /// Logging verbosity (e.g., debug, info, warn)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DetectorArg {
    #[value(name = "adaptive")]
    Adaptive,
    #[value(name = "window-minimum")]
    WindowMinimum,
}

impl From<DetectorArg> for ValleyDetectorKind {
    fn from(arg: DetectorArg) -> Self {
        match arg {
            DetectorArg::Adaptive => ValleyDetectorKind::Adaptive,
            DetectorArg::WindowMinimum => ValleyDetectorKind::WindowMinimum,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recording through the streaming pipeline, one sample per tick
    Run {
        /// Newline-delimited samples; stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,
        /// TOML pipeline configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// JSON quality model
        #[arg(long)]
        model: Option<PathBuf>,
        /// Overrides the configured sample rate
        #[arg(long)]
        fps: Option<f64>,
        /// Print every Nth snapshot (the final one is always printed)
        #[arg(long, default_value_t = 0)]
        every: u64,
        /// Run quality inference on a background worker. Without it the config file
        /// decides, and replays with no config run inline.
        #[arg(long)]
        worker: bool,
        /// Include the raw buffer in printed snapshots
        #[arg(long)]
        with_buffer: bool,
        /// Append periodic records to this JSON-lines file
        #[arg(long)]
        record_out: Option<PathBuf>,
        #[arg(long, default_value = "anonymous")]
        subject: String,
        #[arg(long, default_value_t = 60.0, allow_negative_numbers = true)]
        record_every_s: f64,
        /// Clock value of the first sample (seconds since the Unix epoch); defaults to now
        #[arg(long)]
        start_time: Option<f64>,
    },
    /// Detect pulse valleys over a whole recording
    Valleys {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = 30.0)]
        fps: f64,
        #[arg(long, value_enum, default_value_t = DetectorArg::Adaptive)]
        detector: DetectorArg,
    },
    /// Heart rate and HRV estimated from a recording's valleys
    HeartRate {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = 30.0)]
        fps: f64,
        #[arg(long, value_enum, default_value_t = DetectorArg::Adaptive)]
        detector: DetectorArg,
    },
    /// HRV summary from newline-delimited RR intervals in milliseconds
    Hrv {
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Quality-model features of a recording
    Features {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        arity: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();
    match cli.command {
        Commands::Run {
            input,
            config,
            model,
            fps,
            every,
            worker,
            with_buffer,
            record_out,
            subject,
            record_every_s,
            start_time,
        } => cmd_run(RunArgs {
            input,
            config,
            model,
            fps,
            every,
            worker,
            with_buffer,
            record_out,
            subject,
            record_every_s,
            start_time,
        })?,
        Commands::Valleys {
            input,
            fps,
            detector,
        } => cmd_valleys(input.as_deref(), fps, detector)?,
        Commands::HeartRate {
            input,
            fps,
            detector,
        } => cmd_heart_rate(input.as_deref(), fps, detector)?,
        Commands::Hrv { input } => cmd_hrv(input.as_deref())?,
        Commands::Features { input, arity } => cmd_features(input.as_deref(), arity)?,
    }
    Ok(())
}

fn load_input(input: Option<&Path>) -> Result<Vec<f64>> {
    read_samples(input.unwrap_or(Path::new("-")), SampleColumn::Last)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

struct RunArgs {
    input: Option<PathBuf>,
    config: Option<PathBuf>,
    model: Option<PathBuf>,
    fps: Option<f64>,
    every: u64,
    worker: bool,
    with_buffer: bool,
    record_out: Option<PathBuf>,
    subject: String,
    record_every_s: f64,
    start_time: Option<f64>,
}

#[derive(Serialize)]
struct SnapshotLine<'a> {
    tick: u64,
    phase: Phase,
    valleys: usize,
    heart_rate: HeartRateEstimate,
    hrv: HrvEstimate,
    quality: QualityAssessment,
    #[serde(skip_serializing_if = "Option::is_none")]
    buffer: Option<&'a [f64]>,
}

impl<'a> SnapshotLine<'a> {
    fn new(snap: &'a PipelineSnapshot, with_buffer: bool) -> Self {
        Self {
            tick: snap.tick,
            phase: snap.phase,
            valleys: snap.valleys.len(),
            heart_rate: snap.heart_rate,
            hrv: snap.hrv,
            quality: snap.quality,
            buffer: with_buffer.then_some(snap.buffer.as_slice()),
        }
    }
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let mut cfg = match args.config.as_deref() {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig {
            inference: InferenceMode::Inline,
            ..PipelineConfig::default()
        },
    };
    if let Some(fps) = args.fps {
        cfg.fps = fps;
    }
    if args.worker {
        cfg.inference = InferenceMode::Worker;
    }
    cfg.validate()?;
    let mut schedule =
        RecordSchedule::every(args.record_every_s).context("invalid --record-every-s")?;
    let samples = load_input(args.input.as_deref())?;

    let clock = ManualClock::new(args.start_time.unwrap_or_else(|| SystemClock.now()));
    let step = 1.0 / cfg.fps;
    info!(
        "replaying {} samples at {} Hz ({:?} inference)",
        samples.len(),
        cfg.fps,
        cfg.inference
    );
    let counters = EventCounters::new();
    let observer = Fanout(vec![Box::new(LogObserver), Box::new(counters.clone())]);
    let mut pipeline = PulsePipeline::new(cfg)
        .with_clock(clock.clone())
        .with_observer(observer);
    if let Some(path) = args.model.clone() {
        // a model that fails to load leaves quality Unknown; the replay still runs
        pipeline.load_model(move || {
            let model: SharedModel = Arc::new(LinearSoftmaxModel::load(&path)?);
            Ok(model)
        });
        pipeline.wait_for_model(Duration::from_secs(5));
    }

    let mut store = match args.record_out.as_deref() {
        Some(path) => Some(JsonLinesStore::open(path)?),
        None => None,
    };
    let total = samples.len();
    for (i, sample) in samples.into_iter().enumerate() {
        clock.advance(step);
        let mut snap = pipeline.tick(sample);
        let last = i + 1 == total;
        if last {
            pipeline.flush_quality(Duration::from_secs(5));
            snap.quality = pipeline.quality_gate().assessment();
        }
        if let Some(store) = store.as_mut() {
            if schedule.due(clock.now()) {
                store.save(&pipeline.record(&args.subject))?;
            }
        }
        if last || (args.every > 0 && snap.tick % args.every == 0) {
            print_json(&SnapshotLine::new(&snap, args.with_buffer))?;
        }
    }
    pipeline.shutdown();
    if counters.rejected_samples() > 0 {
        warn!("{} non-finite samples dropped", counters.rejected_samples());
    }
    info!(
        "{} ticks, {} inference failures, {} stale results, {} queue-full skips",
        counters.ticks(),
        counters.inference_failures(),
        counters.stale_results(),
        counters.queue_full()
    );
    Ok(())
}

fn detect_offline(samples: Vec<f64>, fps: f64, detector: DetectorArg) -> Result<Vec<Valley>> {
    let cfg = PipelineConfig {
        fps,
        valley_detector: detector.into(),
        ..PipelineConfig::default()
    };
    cfg.validate().context("invalid --fps")?;
    let ts = TimeSeries { fs: fps, data: samples };
    // offline timestamps count from the first sample
    let now = ts.duration();
    Ok(detector_from_config(&cfg).detect(&ts, now))
}

fn cmd_valleys(input: Option<&Path>, fps: f64, detector: DetectorArg) -> Result<()> {
    let valleys = detect_offline(load_input(input)?, fps, detector)?;
    print_json(&valleys)
}

#[derive(Serialize)]
struct HeartRateSummary {
    valleys: usize,
    heart_rate: HeartRateEstimate,
    hrv: HrvEstimate,
}

fn cmd_heart_rate(input: Option<&Path>, fps: f64, detector: DetectorArg) -> Result<()> {
    let cfg = PipelineConfig::default();
    let valleys = detect_offline(load_input(input)?, fps, detector)?;
    let summary = HeartRateSummary {
        valleys: valleys.len(),
        heart_rate: estimate_heart_rate(&valleys, fps, &cfg.hr_interval_s),
        hrv: estimate_hrv(
            &valleys,
            fps,
            &cfg.rr_interval_ms,
            cfg.hrv_full_confidence_intervals,
        ),
    };
    print_json(&summary)
}

#[derive(Serialize)]
struct HrvSummary {
    estimate: HrvEstimate,
    time: HRVTime,
}

fn cmd_hrv(input: Option<&Path>) -> Result<()> {
    let cfg = PipelineConfig::default();
    let rr = load_input(input)?;
    let summary = HrvSummary {
        estimate: hrv_from_rr_ms(&rr, &cfg.rr_interval_ms, cfg.hrv_full_confidence_intervals),
        time: hrv_time(&rr, &cfg.rr_interval_ms),
    };
    print_json(&summary)
}

#[derive(Serialize)]
struct FeatureSummary {
    names: Vec<&'static str>,
    values: Vec<f64>,
}

fn cmd_features(input: Option<&Path>, arity: usize) -> Result<()> {
    let arity = FeatureArity::from_len(arity)
        .with_context(|| format!("unsupported feature arity {arity} (expected 8 or 10)"))?;
    let data = load_input(input)?;
    let values = extract_features(&data, arity);
    let names = FEATURE_NAMES[..arity.len()].to_vec();
    print_json(&FeatureSummary { names, values })
}
