// pipeline.rs: Per-frame orchestration for the nystagmus tracker
//
// Independent of file I/O, clocks and the image-processing frontend:
// gaze samples in, corrected positions, predictions and events out.
// The replay binary and any live frontend drive the same code path.

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::error::NumericalError;
use crate::filters::{GuardDecision, OutlierGuard, StateEstimator, StepOutcome};
use crate::ledger::{AccuracyBuckets, PredictionLedger, PredictionStats};
use crate::types::{GazeSample, PeakKind, PeriodicityEstimate, PredictedPoint, Regime};

/// Window for the recent prediction error shown in reports
const RECENT_ERROR_WINDOW: usize = 20;

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum TrackerEvent {
    LargeJumpAbsorbed { frame_id: u64, jump: f64 },
    NumericalRecovery { frame_id: u64, error: NumericalError },
    MeasurementRejected { frame_id: u64 },
    OutlierSuppressed { frame_id: u64, raw: f64, filtered: f64, corrected: f64 },
    PeakDetected { frame_id: u64, kind: PeakKind, confidence: f64 },
    NystagmusOnset { frame_id: u64, frequency: f64, amplitude: f64 },
    NystagmusLost { frame_id: u64 },
}

// ─── Frame output ────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct FrameOutput {
    pub frame_id: u64,
    /// Filtered value after the outlier guard
    pub corrected: f64,
    /// Estimator output before the guard
    pub filtered: f64,
    /// Prediction stored for `frame_id + 1`
    pub next_prediction: f64,
    /// Error of the prediction made for this frame, if one existed
    pub prediction_error: Option<f64>,
    pub events: Vec<TrackerEvent>,
    /// One-line summary, e.g. `F12 | filter 1.3 | pred 4.0 | next 812.6 | V=...`
    pub diagnostic: String,
}

// ─── Summary ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub frames_processed: u64,
    pub filter_samples: u64,
    pub prediction_samples: u64,
    pub filter_mean_error: f64,
    pub filter_max_error: f64,
    pub prediction_mean_error: f64,
    pub prediction_max_error: f64,
    pub filter_accuracy: AccuracyBuckets,
    pub prediction_accuracy: AccuracyBuckets,
    pub cached_predictions: usize,
    pub recent_prediction_error: f64,
    pub regime: Regime,
    pub periodicity: PeriodicityEstimate,
    pub status: String,
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct NystagmusPipeline {
    estimator: StateEstimator,
    guard: OutlierGuard,
    ledger: PredictionLedger,
    stats: PredictionStats,
    frames_processed: u64,
    peak_latched: bool,
    nystagmus_active: bool,
}

impl NystagmusPipeline {
    pub fn new(config: TrackerConfig) -> Self {
        let guard = OutlierGuard::new(&config);
        let ledger = PredictionLedger::new(config.ledger_capacity);
        let stats = PredictionStats::new(&config);
        Self {
            estimator: StateEstimator::new(config),
            guard,
            ledger,
            stats,
            frames_processed: 0,
            peak_latched: false,
            nystagmus_active: false,
        }
    }

    pub fn process_sample(&mut self, sample: &GazeSample) -> FrameOutput {
        self.process_frame(sample.x, sample.frame_id)
    }

    /// Score the pending prediction, filter, predict the next frame and
    /// guard the output.
    pub fn process_frame(&mut self, raw: f64, frame_id: u64) -> FrameOutput {
        let mut events = Vec::new();
        self.frames_processed += 1;
        // NaN stays NaN; the estimator and guard both skip it
        let bounded = raw.clamp(0.0, self.estimator.config().screen_width);

        // 1. Score the prediction made for this frame
        let prediction_error = if bounded.is_finite() {
            self.ledger.evaluate(frame_id, bounded)
        } else {
            None
        };
        if let Some(err) = prediction_error {
            self.stats.prediction.push(err);
        }

        // 2. Filter
        let filtered = self.estimator.update(raw, frame_id);
        match self.estimator.last_outcome() {
            StepOutcome::LargeJump { jump } => {
                events.push(TrackerEvent::LargeJumpAbsorbed { frame_id, jump: *jump })
            }
            StepOutcome::Recovered(err) => events.push(TrackerEvent::NumericalRecovery {
                frame_id,
                error: err.clone(),
            }),
            StepOutcome::Rejected => events.push(TrackerEvent::MeasurementRejected { frame_id }),
            _ => {}
        }
        self.collect_detector_events(frame_id, &mut events);

        // 3. Predict the next frame
        let next_prediction = self.estimator.predict_next().position;

        // 4. Guard against filter excursions
        let corrected = self.guard.filter(bounded, filtered, self.estimator.config());
        if self.guard.last_decision() == GuardDecision::Suppressed {
            events.push(TrackerEvent::OutlierSuppressed { frame_id, raw, filtered, corrected });
        }

        // 5. Store prediction, record filter error
        self.ledger
            .store_prediction(frame_id + 1, next_prediction, self.estimator.timestamp());
        let filter_error = bounded.is_finite().then(|| (bounded - corrected).abs());
        if let Some(err) = filter_error.filter(|_| frame_id > 0) {
            self.stats.filter.push(err);
        }
        let diagnostic = format!(
            "F{} | filter {} | pred {} | next {:.1} | {}",
            frame_id,
            fmt_error(filter_error),
            fmt_error(prediction_error),
            next_prediction,
            self.status_line()
        );

        FrameOutput {
            frame_id,
            corrected,
            filtered,
            next_prediction,
            prediction_error,
            events,
            diagnostic,
        }
    }

    fn collect_detector_events(&mut self, frame_id: u64, events: &mut Vec<TrackerEvent>) {
        let peak = self.estimator.peak();
        let confirmed = peak.is_peak && peak.kind != PeakKind::None;
        if confirmed && !self.peak_latched {
            events.push(TrackerEvent::PeakDetected {
                frame_id,
                kind: peak.kind,
                confidence: peak.confidence,
            });
        }
        self.peak_latched = confirmed;

        let periodicity = self.estimator.periodicity();
        match (self.nystagmus_active, periodicity.is_active) {
            (false, true) => {
                info!(
                    "[Pipeline] nystagmus onset at F{frame_id}: {:.2} Hz, {:.0} px",
                    periodicity.frequency, periodicity.amplitude
                );
                events.push(TrackerEvent::NystagmusOnset {
                    frame_id,
                    frequency: periodicity.frequency,
                    amplitude: periodicity.amplitude,
                });
            }
            (true, false) => {
                info!("[Pipeline] nystagmus lost at F{frame_id}");
                events.push(TrackerEvent::NystagmusLost { frame_id });
            }
            _ => {}
        }
        self.nystagmus_active = periodicity.is_active;
    }

    // ─── Predictions ─────────────────────────────────────────────────────────

    pub fn predict_trajectory(&self, n: usize) -> Vec<PredictedPoint> {
        self.estimator.predict_steps(n)
    }

    /// (position, confidence) pairs
    pub fn predict_with_confidence(&self, n: usize) -> Vec<(f64, f64)> {
        self.estimator.predict_with_confidence(n)
    }

    pub fn prediction_for_frame(&self, frame_id: u64) -> Option<f64> {
        self.ledger.prediction_for(frame_id)
    }

    pub fn has_prediction(&self, frame_id: u64) -> bool {
        self.ledger.has_prediction(frame_id)
    }

    pub fn predict_next_event_time(&self) -> Option<f64> {
        self.estimator.predict_next_event_time()
    }

    // ─── Reporting ───────────────────────────────────────────────────────────

    /// Share of filter errors under the "good" threshold [%]
    pub fn filter_accuracy(&self) -> f64 {
        self.stats.filter.buckets().good
    }

    /// Share of prediction errors under the "good" threshold [%]
    pub fn prediction_accuracy(&self) -> f64 {
        self.stats.prediction.buckets().good
    }

    pub fn status_line(&self) -> String {
        let mut status = format!("V={:.1}px/s", self.estimator.velocity());

        let periodicity = self.estimator.periodicity();
        if periodicity.is_active {
            status.push_str(&format!(
                ", nystagmus({:.1}Hz, {:.0}px)",
                periodicity.frequency, periodicity.amplitude
            ));
        }

        let peak = self.estimator.peak();
        if peak.is_peak && peak.kind != PeakKind::None {
            let kind = if peak.kind == PeakKind::Max { "MAX" } else { "MIN" };
            status.push_str(&format!(", peak({kind}, {:.2})", peak.confidence));
        } else if peak.approaching {
            status.push_str(", approaching peak");
        }

        status.push_str(&format!(", regime:{}", self.estimator.regime().regime.name()));
        status
    }

    pub fn diagnostic_report(&self) -> String {
        let thresholds = self.estimator.config().accuracy_thresholds;
        let mut lines = Vec::new();
        lines.push("=== Nystagmus tracker ===".to_string());
        lines.push(format!("Frames processed: {}", self.frames_processed));

        let windows = [("Filter", &self.stats.filter), ("Prediction", &self.stats.prediction)];
        for (label, stats) in windows {
            let buckets = stats.buckets();
            lines.push(format!(
                "{label} error: mean {:.2}, max {:.2} over {} samples",
                stats.mean(),
                stats.max(),
                stats.len()
            ));
            lines.push(format!(
                "  <{:.0}: {:.1}%  <{:.0}: {:.1}%  <{:.0}: {:.1}%",
                thresholds[0],
                buckets.excellent,
                thresholds[1],
                buckets.good,
                thresholds[2],
                buckets.acceptable
            ));
        }

        lines.push(format!("Status: {}", self.status_line()));
        lines.push(format!(
            "Cached predictions: {}, recent error {:.2}",
            self.ledger.len(),
            self.ledger.recent_average_error(RECENT_ERROR_WINDOW)
        ));
        lines.join("\n")
    }

    pub fn summary(&self) -> PipelineSummary {
        PipelineSummary {
            frames_processed: self.frames_processed,
            filter_samples: self.stats.filter.total(),
            prediction_samples: self.stats.prediction.total(),
            filter_mean_error: self.stats.filter.mean(),
            filter_max_error: self.stats.filter.max(),
            prediction_mean_error: self.stats.prediction.mean(),
            prediction_max_error: self.stats.prediction.max(),
            filter_accuracy: self.stats.filter.buckets(),
            prediction_accuracy: self.stats.prediction.buckets(),
            cached_predictions: self.ledger.len(),
            recent_prediction_error: self.ledger.recent_average_error(RECENT_ERROR_WINDOW),
            regime: self.estimator.regime().regime,
            periodicity: self.estimator.periodicity(),
            status: self.status_line(),
        }
    }

    pub fn estimator(&self) -> &StateEstimator {
        &self.estimator
    }

    pub fn config(&self) -> &TrackerConfig {
        self.estimator.config()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn reset(&mut self) {
        self.estimator.reset();
        self.guard.reset();
        self.ledger.clear();
        self.stats.reset();
        self.frames_processed = 0;
        self.peak_latched = false;
        self.nystagmus_active = false;
    }
}

fn fmt_error(err: Option<f64>) -> String {
    match err {
        Some(e) => format!("{e:.1}"),
        None => "n/a".to_string(),
    }
}
