// config.rs: every tunable of the tracker in one place
//
// Defaults reproduce the tuning the tracker was calibrated with on 1920 px
// wide recordings at 60 Hz. The blend weights under "Post-processing" and
// "Large jump" were tuned by eye and should be recalibrated on new rigs.

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;
use crate::types::{Regime, STATE_DIM};

/// Per-regime knobs for the noise controller and both transition models.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegimeTuning {
    /// Multiplier applied to the base process noise
    pub motion_factor: f64,
    /// Sigma point spread
    pub alpha: f64,
    /// (velocity, acceleration, jerk) decay used while filtering
    pub filter_decay: [f64; 3],
    /// (velocity, acceleration, jerk) decay used for open-loop prediction
    pub predict_decay: [f64; 3],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    // ── Geometry & timing ──
    pub sample_interval: f64,
    pub screen_width: f64,
    pub max_velocity: f64,
    pub max_acceleration: f64,
    pub max_jerk: f64,
    pub max_measured_velocity: f64,
    pub max_measured_acceleration: f64,
    pub history_size: usize,

    // ── Covariance ──
    pub initial_covariance: [f64; STATE_DIM],
    pub recovery_covariance: [f64; STATE_DIM],
    pub covariance_floor: [f64; STATE_DIM],
    pub covariance_ceiling_factor: f64,
    pub eigen_floor: f64,
    pub regularization: f64,

    // ── Unscented transform ──
    pub ut_beta: f64,
    pub ut_kappa: f64,

    // ── Noise controller ──
    pub base_process_noise: [f64; STATE_DIM],
    pub base_measurement_noise: f64,
    pub process_noise_min: [f64; STATE_DIM],
    pub process_noise_max: [f64; STATE_DIM],
    pub measurement_noise_min: f64,
    pub measurement_noise_max: f64,
    pub peak_motion_factor: f64,
    pub peak_measurement_scale: f64,
    pub peak_alpha: f64,
    pub approach_motion_factor: f64,
    pub approach_measurement_scale: f64,
    pub approach_alpha: f64,
    pub stability_min_history: usize,
    pub stability_midpoint: f64,
    pub stability_slope: f64,

    // ── Regime tuning ──
    pub stable: RegimeTuning,
    pub smooth_pursuit: RegimeTuning,
    pub saccade: RegimeTuning,
    pub nystagmus_like: RegimeTuning,
    pub transition: RegimeTuning,

    // ── Large jump ──
    pub jump_threshold: f64,
    pub jump_measurement_weight: f64,
    pub jump_velocity_weight: f64,
    pub jump_acceleration_decay: f64,
    pub jump_covariance_cap: [f64; STATE_DIM],

    // ── Innovation gate ──
    pub innovation_gate: f64,
    pub innovation_gate_span: f64,
    pub min_gain_scale: f64,

    // ── Filtering transition ──
    pub peak_decay: [f64; 3],
    pub approach_decay: [f64; 2],
    pub peak_acceleration_inversion: f64,
    pub peak_jerk_inversion: f64,
    pub approach_position_gain: f64,
    pub phase_nudge_gain: f64,
    pub phase_nudge_confidence: f64,

    // ── Prediction transition ──
    pub predict_phase_position_gain: f64,
    pub predict_phase_velocity_gain: f64,

    // ── Post-processing ──
    pub peak_compensation: f64,
    pub phase_correction_confidence: f64,
    pub phase_correction_magnitude: f64,

    // ── Regime classifier ──
    pub regime_window: usize,
    pub regime_min_samples: usize,
    pub stable_velocity: f64,
    pub stable_range: f64,
    pub pursuit_velocity: f64,
    pub pursuit_range: f64,
    pub saccade_acceleration: f64,
    pub saccade_velocity: f64,
    pub saccade_confidence_scale: f64,
    pub nystagmus_min_range: f64,
    pub transition_confidence: f64,

    // ── Peak detector ──
    pub peak_window: usize,
    pub peak_min_samples: usize,
    pub peak_scales: [usize; 3],
    pub zero_cross_votes: u32,
    pub peak_vote_threshold: u32,
    pub near_zero_velocity: f64,
    pub small_velocity: f64,
    pub approach_velocity: f64,
    pub approach_deceleration: f64,

    // ── Periodicity tracker ──
    pub periodicity_window: usize,
    pub periodicity_min_samples: usize,
    pub max_intervals: usize,
    pub min_intervals: usize,
    pub reversal_velocity_floor: f64,
    pub min_frequency: f64,
    pub max_frequency: f64,
    pub min_velocity_variance: f64,
    pub min_amplitude: f64,
    pub event_confidence: f64,

    // ── Outlier guard ──
    pub outlier_history: usize,
    pub outlier_default_threshold: f64,
    pub outlier_threshold_min: f64,
    pub outlier_threshold_max: f64,
    pub outlier_min_samples: u64,
    pub outlier_max_blend: f64,
    pub outlier_median_weight: f64,
    pub outlier_conservative_weight: f64,

    // ── Ledger & statistics ──
    pub ledger_capacity: usize,
    pub stats_window: usize,
    pub accuracy_thresholds: [f64; 3],
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sample_interval: 1.0 / 60.0,
            screen_width: 1920.0,
            max_velocity: 300.0,
            max_acceleration: 800.0,
            max_jerk: 2000.0,
            max_measured_velocity: 350.0,
            max_measured_acceleration: 1000.0,
            history_size: 20,

            initial_covariance: [25.0, 100.0, 400.0, 1600.0],
            recovery_covariance: [50.0, 200.0, 800.0, 3200.0],
            covariance_floor: [1.0, 10.0, 50.0, 200.0],
            covariance_ceiling_factor: 100.0,
            eigen_floor: 1e-9,
            regularization: 1e-9,

            ut_beta: 2.0,
            ut_kappa: 3.0 - STATE_DIM as f64,

            base_process_noise: [0.5, 10.0, 50.0, 200.0],
            base_measurement_noise: 8.0,
            process_noise_min: [0.1, 1.0, 10.0, 50.0],
            process_noise_max: [10.0, 100.0, 500.0, 2000.0],
            measurement_noise_min: 2.0,
            measurement_noise_max: 20.0,
            peak_motion_factor: 2.5,
            peak_measurement_scale: 0.5,
            peak_alpha: 0.02,
            approach_motion_factor: 1.8,
            approach_measurement_scale: 0.7,
            approach_alpha: 0.01,
            stability_min_history: 10,
            stability_midpoint: 50.0,
            stability_slope: 0.1,

            stable: RegimeTuning {
                motion_factor: 0.5,
                alpha: 0.0001,
                filter_decay: [0.85, 0.80, 0.75],
                predict_decay: [0.90, 0.85, 0.80],
            },
            smooth_pursuit: RegimeTuning {
                motion_factor: 0.8,
                alpha: 0.0005,
                filter_decay: [0.92, 0.88, 0.85],
                predict_decay: [0.95, 0.92, 0.88],
            },
            saccade: RegimeTuning {
                motion_factor: 2.0,
                alpha: 0.01,
                filter_decay: [0.98, 0.95, 0.92],
                // ballistic: assume the eye is about to stop
                predict_decay: [0.85, 0.70, 0.60],
            },
            nystagmus_like: RegimeTuning {
                motion_factor: 1.2,
                alpha: 0.001,
                filter_decay: [0.93, 0.90, 0.87],
                predict_decay: [0.95, 0.92, 0.90],
            },
            transition: RegimeTuning {
                motion_factor: 1.0,
                alpha: 0.001,
                filter_decay: [0.95, 0.90, 0.85],
                predict_decay: [0.98, 0.95, 0.90],
            },

            jump_threshold: 120.0,
            jump_measurement_weight: 0.4,
            jump_velocity_weight: 0.3,
            jump_acceleration_decay: 0.2,
            jump_covariance_cap: [100.0, 400.0, 1600.0, 6400.0],

            innovation_gate: 50.0,
            innovation_gate_span: 100.0,
            min_gain_scale: 0.3,

            peak_decay: [0.99, 0.97, 0.95],
            approach_decay: [0.96, 0.93],
            peak_acceleration_inversion: -0.5,
            peak_jerk_inversion: -0.8,
            approach_position_gain: 0.1,
            phase_nudge_gain: 0.05,
            phase_nudge_confidence: 0.7,

            predict_phase_position_gain: 0.1,
            predict_phase_velocity_gain: 0.5,

            peak_compensation: 0.4,
            phase_correction_confidence: 0.8,
            phase_correction_magnitude: 2.0,

            regime_window: 10,
            regime_min_samples: 5,
            stable_velocity: 10.0,
            stable_range: 20.0,
            pursuit_velocity: 50.0,
            pursuit_range: 40.0,
            saccade_acceleration: 500.0,
            saccade_velocity: 100.0,
            saccade_confidence_scale: 1000.0,
            nystagmus_min_range: 40.0,
            transition_confidence: 0.5,

            peak_window: 15,
            peak_min_samples: 7,
            peak_scales: [3, 5, 7],
            zero_cross_votes: 2,
            peak_vote_threshold: 2,
            near_zero_velocity: 5.0,
            small_velocity: 10.0,
            approach_velocity: 20.0,
            approach_deceleration: 150.0,

            periodicity_window: 30,
            periodicity_min_samples: 15,
            max_intervals: 10,
            min_intervals: 3,
            reversal_velocity_floor: 15.0,
            min_frequency: 0.5,
            max_frequency: 6.0,
            min_velocity_variance: 100.0,
            min_amplitude: 20.0,
            event_confidence: 0.7,

            outlier_history: 5,
            outlier_default_threshold: 40.0,
            outlier_threshold_min: 30.0,
            outlier_threshold_max: 100.0,
            outlier_min_samples: 10,
            outlier_max_blend: 0.7,
            outlier_median_weight: 0.6,
            outlier_conservative_weight: 0.7,

            ledger_capacity: 100,
            stats_window: 100,
            accuracy_thresholds: [5.0, 15.0, 30.0],
        }
    }
}

impl TrackerConfig {
    pub fn tuning(&self, regime: Regime) -> &RegimeTuning {
        match regime {
            Regime::Stable => &self.stable,
            Regime::SmoothPursuit => &self.smooth_pursuit,
            Regime::Saccade => &self.saccade,
            Regime::NystagmusLike => &self.nystagmus_like,
            Regime::Transition => &self.transition,
        }
    }

    /// Upper diagonal bound for state `i`
    pub fn covariance_ceiling(&self, i: usize) -> f64 {
        self.covariance_floor[i] * self.covariance_ceiling_factor
    }

    /// Load a (possibly partial) JSON override on top of the defaults.
    pub fn from_json(text: &str) -> Result<Self, TrackerError> {
        let config: TrackerConfig = serde_json::from_str(text)
            .map_err(|e| TrackerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        let invalid = |msg: String| Err(TrackerError::InvalidConfig(msg));

        if !(self.sample_interval.is_finite() && self.sample_interval > 0.0) {
            return invalid(format!("sample_interval must be > 0, got {}", self.sample_interval));
        }
        if !(self.screen_width.is_finite() && self.screen_width > 0.0) {
            return invalid(format!("screen_width must be > 0, got {}", self.screen_width));
        }
        for (name, bound) in [
            ("max_velocity", self.max_velocity),
            ("max_acceleration", self.max_acceleration),
            ("max_jerk", self.max_jerk),
            ("max_measured_velocity", self.max_measured_velocity),
            ("max_measured_acceleration", self.max_measured_acceleration),
            ("jump_threshold", self.jump_threshold),
        ] {
            if !(bound.is_finite() && bound > 0.0) {
                return invalid(format!("{name} must be > 0, got {bound}"));
            }
        }
        if self.covariance_floor.iter().any(|&f| !(f > 0.0)) {
            return invalid("covariance_floor entries must be > 0".into());
        }
        if self.covariance_ceiling_factor < 1.0 {
            return invalid("covariance_ceiling_factor must be >= 1".into());
        }
        if self
            .process_noise_min
            .iter()
            .zip(self.process_noise_max.iter())
            .any(|(lo, hi)| lo > hi)
        {
            return invalid("process_noise_min exceeds process_noise_max".into());
        }
        if self.measurement_noise_min <= 0.0
            || self.measurement_noise_min > self.measurement_noise_max
        {
            return invalid("measurement noise range is empty".into());
        }
        let max_scale = self.peak_scales.iter().copied().max().unwrap_or(0);
        if self.peak_scales.iter().any(|&s| s < 3 || s % 2 == 0) {
            return invalid("peak_scales must be odd and >= 3".into());
        }
        if self.peak_min_samples < max_scale.max(4) || self.peak_window < self.peak_min_samples {
            return invalid("peak window must hold the largest scale".into());
        }
        if self.regime_min_samples == 0 || self.regime_window < self.regime_min_samples {
            return invalid("regime_window must be >= regime_min_samples > 0".into());
        }
        if self.periodicity_window < self.periodicity_min_samples || self.min_intervals == 0 {
            return invalid("periodicity window is too small".into());
        }
        if self.max_intervals < self.min_intervals {
            return invalid("max_intervals must be >= min_intervals".into());
        }
        if self.outlier_history == 0 || self.ledger_capacity == 0 || self.stats_window == 0 {
            return invalid("history, ledger and stats capacities must be > 0".into());
        }
        if self.outlier_threshold_min > self.outlier_threshold_max {
            return invalid("outlier threshold range is empty".into());
        }
        if !(self.ut_beta.is_finite() && self.ut_kappa.is_finite()) {
            return invalid("ut_beta and ut_kappa must be finite".into());
        }
        // λ + n = α²(n + κ) must stay positive for every alpha below
        if STATE_DIM as f64 + self.ut_kappa <= 0.0 {
            return invalid(format!("ut_kappa must be > -{STATE_DIM}, got {}", self.ut_kappa));
        }
        let regimes = [
            Regime::Stable,
            Regime::SmoothPursuit,
            Regime::Saccade,
            Regime::NystagmusLike,
            Regime::Transition,
        ];
        let alphas = regimes
            .iter()
            .map(|&r| (r.name(), self.tuning(r).alpha))
            .chain([("peak", self.peak_alpha), ("approach", self.approach_alpha)]);
        for (name, alpha) in alphas {
            if !(alpha.is_finite() && alpha > 0.0) {
                return invalid(format!("{name} alpha must be > 0, got {alpha}"));
            }
        }
        Ok(())
    }
}
