use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use flate2::read::GzDecoder;
use log::{debug, info};
use nystagmus_tracker::{GazeSample, NystagmusPipeline, TrackerConfig, TrackerError, TrackerEvent};
use serde::Deserialize;
use serde_json::json;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Synthetic {
    /// centre + amplitude·sin(2πft)
    Sinusoid,
    /// Fixation, one ramped jump of `amplitude`, fixation
    Saccade,
}

#[derive(Parser, Debug)]
struct Args {
    /// Path to a recorded session (.json or .json.gz)
    #[arg(long, conflicts_with = "synthetic")]
    log: Option<PathBuf>,

    /// Generate a synthetic trace instead of reading a log
    #[arg(long, value_enum)]
    synthetic: Option<Synthetic>,

    /// Synthetic oscillation frequency [Hz]
    #[arg(long, default_value = "2.5")]
    frequency: f64,

    /// Synthetic amplitude [px]
    #[arg(long, default_value = "60.0")]
    amplitude: f64,

    /// Synthetic centre / fixation position [px]
    #[arg(long, default_value = "960.0")]
    centre: f64,

    /// Synthetic trace length [frames]
    #[arg(long, default_value = "600")]
    frames: usize,

    /// JSON file overriding TrackerConfig defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Steps of the final trajectory to report
    #[arg(long, default_value = "30")]
    steps: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SessionFile {
    Wrapped { samples: Vec<GazeSample> },
    Bare(Vec<GazeSample>),
}

impl SessionFile {
    fn into_samples(self) -> Vec<GazeSample> {
        match self {
            SessionFile::Wrapped { samples } | SessionFile::Bare(samples) => samples,
        }
    }
}

fn load_session(path: &Path) -> anyhow::Result<Vec<GazeSample>> {
    let file = File::open(path)?;
    let session: SessionFile = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        serde_json::from_reader(BufReader::new(gz))?
    } else {
        serde_json::from_reader(BufReader::new(file))?
    };
    let samples = session.into_samples();
    check_session(&samples)?;
    Ok(samples)
}

fn check_session(samples: &[GazeSample]) -> Result<(), TrackerError> {
    if samples.is_empty() {
        return Err(TrackerError::InvalidSession("no samples".to_string()));
    }
    if let Some(pair) = samples.windows(2).find(|w| w[1].frame_id <= w[0].frame_id) {
        return Err(TrackerError::InvalidSession(format!(
            "frame ids must increase: {} after {}",
            pair[1].frame_id, pair[0].frame_id
        )));
    }
    Ok(())
}

fn synthesize(kind: Synthetic, args: &Args, dt: f64) -> Vec<GazeSample> {
    let xs: Vec<f64> = match kind {
        Synthetic::Sinusoid => (0..args.frames)
            .map(|i| {
                args.centre + args.amplitude * (2.0 * PI * args.frequency * i as f64 * dt).sin()
            })
            .collect(),
        Synthetic::Saccade => {
            let hold = args.frames / 2;
            (0..args.frames)
                .map(|i| {
                    let ramp = (i as f64 - hold as f64).clamp(0.0, 4.0) / 4.0;
                    args.centre + args.amplitude * ramp
                })
                .collect()
        }
    };
    xs.into_iter()
        .enumerate()
        .map(|(i, x)| GazeSample { frame_id: i as u64, x })
        .collect()
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TrackerConfig> {
    match path {
        Some(p) => Ok(TrackerConfig::from_json(&fs::read_to_string(p)?)?),
        None => Ok(TrackerConfig::default()),
    }
}

fn run(samples: &[GazeSample], config: TrackerConfig, steps: usize) -> serde_json::Value {
    let mut pipeline = NystagmusPipeline::new(config);
    let mut regimes: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut event_counts: BTreeMap<&'static str, usize> = BTreeMap::new();

    for sample in samples {
        let out = pipeline.process_sample(sample);
        debug!("{}", out.diagnostic);
        *regimes.entry(pipeline.estimator().regime().regime.name()).or_insert(0) += 1;
        for event in &out.events {
            *event_counts.entry(event_name(event)).or_insert(0) += 1;
        }
    }

    info!("{}", pipeline.diagnostic_report());

    let trajectory: Vec<_> = pipeline
        .predict_trajectory(steps)
        .iter()
        .map(|p| {
            json!({
                "position": p.position,
                "std_dev": p.std_dev,
                "confidence": p.confidence(),
            })
        })
        .collect();

    json!({
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "samples": samples.len(),
        "summary": pipeline.summary(),
        "regimes": regimes,
        "events": event_counts,
        "next_event_time": pipeline.predict_next_event_time(),
        "trajectory": trajectory,
    })
}

fn event_name(event: &TrackerEvent) -> &'static str {
    match event {
        TrackerEvent::LargeJumpAbsorbed { .. } => "large_jump",
        TrackerEvent::NumericalRecovery { .. } => "numerical_recovery",
        TrackerEvent::MeasurementRejected { .. } => "rejected",
        TrackerEvent::OutlierSuppressed { .. } => "outlier_suppressed",
        TrackerEvent::PeakDetected { .. } => "peak",
        TrackerEvent::NystagmusOnset { .. } => "nystagmus_onset",
        TrackerEvent::NystagmusLost { .. } => "nystagmus_lost",
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    let (source, samples) = if let Some(log) = args.log.as_ref() {
        (log.display().to_string(), load_session(log)?)
    } else if let Some(kind) = args.synthetic {
        let samples = synthesize(kind, &args, config.sample_interval);
        check_session(&samples)?;
        (format!("synthetic:{kind:?}").to_lowercase(), samples)
    } else {
        anyhow::bail!("Provide --log or --synthetic");
    };

    let mut report = run(&samples, config, args.steps);
    report["source"] = json!(source);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
