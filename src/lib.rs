//! Real-time tracking and short-horizon prediction of horizontal eye
//! position for nystagmus analysis.
//!
//! [`StateEstimator`] runs a four-state unscented Kalman filter whose noise
//! and transition are steered by regime, peak and periodicity detectors.
//! [`NystagmusPipeline`] wraps it with an outlier guard, a prediction ledger
//! and rolling accuracy statistics.

pub mod config;
pub mod error;
pub mod filters;
pub mod ledger;
pub mod motion;
pub mod pipeline;
pub mod types;
pub mod window;

#[cfg(test)]
mod testutil;

pub use config::{RegimeTuning, TrackerConfig};
pub use error::{NumResult, NumericalError, TrackerError};
pub use filters::{
    EstimatorSnapshot, ForwardPredictor, OutlierGuard, StateEstimator, StepOutcome,
    TransitionContext,
};
pub use ledger::{AccuracyBuckets, PredictionLedger, PredictionStats, RollingErrorStats};
pub use pipeline::{FrameOutput, NystagmusPipeline, PipelineSummary, TrackerEvent};
pub use types::{
    GazeSample, PeakEvent, PeakKind, PeriodicityEstimate, PredictedPoint, Regime, RegimeEstimate,
};
