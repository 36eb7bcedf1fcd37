pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// Coarse classification of the current eye motion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    Stable,
    SmoothPursuit,
    Saccade,
    NystagmusLike,
    Transition,
}

impl Regime {
    pub fn name(&self) -> &'static str {
        match self {
            Regime::Stable => "stable",
            Regime::SmoothPursuit => "smooth-pursuit",
            Regime::Saccade => "saccade",
            Regime::NystagmusLike => "nystagmus",
            Regime::Transition => "transition",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegimeEstimate {
    pub regime: Regime,
    /// How decisively the window sits inside the regime's bucket [0, 1]
    pub confidence: f64,
}

impl Default for RegimeEstimate {
    fn default() -> Self {
        Self {
            regime: Regime::Stable,
            confidence: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeakKind {
    Max,
    Min,
    None,
}

/// Result of the latest peak detection pass. Ephemeral: rebuilt every update.
///
/// `confidence` is the vote share of every pass, confirmed or not, so an
/// approaching peak already scales the approach compensation before the
/// vote threshold is met. `kind` and `detection_frame` stay unset until
/// the peak is confirmed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeakEvent {
    pub kind: PeakKind,
    /// Vote share (votes / 5), reported even when the peak is not confirmed
    pub confidence: f64,
    pub is_peak: bool,
    pub approaching: bool,
    pub detection_frame: Option<u64>,
}

impl Default for PeakEvent {
    fn default() -> Self {
        Self {
            kind: PeakKind::None,
            confidence: 0.0,
            is_peak: false,
            approaching: false,
            detection_frame: None,
        }
    }
}

/// Oscillation estimate built from direction-reversal intervals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodicityEstimate {
    /// Mean interval between direction reversals [s]
    pub period: f64,
    pub period_confidence: f64,
    /// Count of retained reversal intervals over twice their summed span,
    /// i.e. one over twice the mean reversal interval [Hz]
    pub frequency: f64,
    /// Half the position range over the window [px]
    pub amplitude: f64,
    /// Time of the latest reversal [s]
    pub last_event_time: Option<f64>,
    pub is_active: bool,
}

/// One step of a forward trajectory.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictedPoint {
    pub position: f64,
    pub std_dev: f64,
}

impl PredictedPoint {
    /// Maps uncertainty onto (0, 1]: 1 / (1 + σ/10)
    pub fn confidence(&self) -> f64 {
        1.0 / (1.0 + self.std_dev / 10.0)
    }
}

/// One gaze sample as handed over by the image-processing stage.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    pub frame_id: u64,
    pub x: f64,
}
