use log::warn;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::forward::ForwardPredictor;
use super::sigma::{
    all_finite, condition_covariance, generate_sigma_points, recombine, SqrtMethod,
    UnscentedWeights,
};
use super::transition::{filtering_transition, TransitionContext};
use crate::config::TrackerConfig;
use crate::error::{NumResult, NumericalError};
use crate::motion::{
    NoiseController, NoiseParams, PeakDetector, PeriodicityTracker, RegimeClassifier,
};
use crate::types::{
    PeakEvent, PeriodicityEstimate, PredictedPoint, RegimeEstimate, ACC, JERK, POS, STATE_DIM, VEL,
};
use crate::window::RollingWindow;

/// How the last `update` call was resolved.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// Nothing processed yet
    Idle,
    /// First valid measurement seeded the state
    Bootstrap,
    /// Full sigma point cycle; carries the worst square root fallback used
    Filtered(SqrtMethod),
    /// Discontinuity blended in without running the filter
    LargeJump { jump: f64 },
    /// Numerical failure; covariance reinflated and the raw value returned
    Recovered(NumericalError),
    /// Non-finite measurement ignored
    Rejected,
}

/// Read-only copy of everything the forward predictor needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimatorSnapshot {
    pub initialized: bool,
    /// [position, velocity, acceleration, jerk]
    pub state: [f64; STATE_DIM],
    pub covariance: [[f64; STATE_DIM]; STATE_DIM],
    pub context: TransitionContext,
    pub noise: NoiseParams,
}

/// Single-axis unscented Kalman filter over [position, velocity,
/// acceleration, jerk], with regime, peak and periodicity detectors driving
/// its noise and transition.
#[derive(Clone, Debug)]
pub struct StateEstimator {
    config: TrackerConfig,

    /// State vector [4D]
    state: Array1<f64>,

    /// Covariance matrix [4x4]
    covariance: Array2<f64>,

    initialized: bool,
    /// Time of the latest accepted measurement, frame_id × dt [s]
    timestamp: f64,
    last_frame: Option<u64>,
    last_measurement: Option<f64>,
    last_velocity: Option<f64>,
    last_outcome: StepOutcome,

    regime: RegimeClassifier,
    peaks: PeakDetector,
    periodicity: PeriodicityTracker,
    noise: NoiseController,

    velocity_history: RollingWindow,
    position_history: RollingWindow,
    acceleration_history: RollingWindow,
    measurement_history: RollingWindow,
}

fn diagonal(values: &[f64; STATE_DIM]) -> Array2<f64> {
    Array2::from_shape_fn((STATE_DIM, STATE_DIM), |(i, j)| if i == j { values[i] } else { 0.0 })
}

impl StateEstimator {
    pub fn new(config: TrackerConfig) -> Self {
        let history = config.history_size;
        Self {
            state: Array1::zeros(STATE_DIM),
            covariance: diagonal(&config.initial_covariance),
            initialized: false,
            timestamp: 0.0,
            last_frame: None,
            last_measurement: None,
            last_velocity: None,
            last_outcome: StepOutcome::Idle,
            regime: RegimeClassifier::new(&config),
            peaks: PeakDetector::new(&config),
            periodicity: PeriodicityTracker::new(&config),
            noise: NoiseController::new(&config),
            velocity_history: RollingWindow::new(history),
            position_history: RollingWindow::new(history),
            acceleration_history: RollingWindow::new(history),
            measurement_history: RollingWindow::new(history),
            config,
        }
    }

    /// Clear every window and return to the uninitialized state.
    pub fn reset(&mut self) {
        self.state = Array1::zeros(STATE_DIM);
        self.covariance = diagonal(&self.config.initial_covariance);
        self.initialized = false;
        self.timestamp = 0.0;
        self.last_frame = None;
        self.last_measurement = None;
        self.last_velocity = None;
        self.last_outcome = StepOutcome::Idle;
        self.regime.reset();
        self.peaks.reset();
        self.periodicity.reset();
        self.noise.reset(&self.config);
        self.velocity_history.clear();
        self.position_history.clear();
        self.acceleration_history.clear();
        self.measurement_history.clear();
    }

    /// Fold one measurement into the estimate and return the corrected
    /// position. Always finite and inside [0, screen_width].
    ///
    /// Frame ids must strictly increase between accepted measurements.
    pub fn update(&mut self, measurement: f64, frame_id: u64) -> f64 {
        if !measurement.is_finite() {
            self.last_outcome = StepOutcome::Rejected;
            return self.state[POS];
        }
        debug_assert!(
            self.last_frame.map_or(true, |last| frame_id > last),
            "frame ids must increase: {frame_id} after {:?}",
            self.last_frame
        );

        let dt = self.config.sample_interval;
        let z = measurement.clamp(0.0, self.config.screen_width);
        self.timestamp = frame_id as f64 * dt;
        self.last_frame = Some(frame_id);

        if !self.initialized {
            self.bootstrap(z);
            return z;
        }

        // 1. Differentiate the raw trace
        let cfg = &self.config;
        let previous = self.last_measurement.unwrap_or(z);
        let max_v = cfg.max_measured_velocity;
        let max_a = cfg.max_measured_acceleration;
        let velocity = ((z - previous) / dt).clamp(-max_v, max_v);
        let acceleration = match self.last_velocity {
            Some(prev_v) => ((velocity - prev_v) / dt).clamp(-max_a, max_a),
            None => 0.0,
        };
        self.last_measurement = Some(z);
        self.last_velocity = Some(velocity);

        // 2. Detectors
        let peak = self.peaks.update(z, velocity, acceleration, frame_id, cfg);
        let periodicity = self.periodicity.update(z, velocity, self.timestamp, cfg);
        let regime = self.regime.update(velocity, acceleration, cfg);

        // 3. Discontinuities bypass the filter
        let jump = (z - previous).abs();
        if jump > self.config.jump_threshold {
            self.absorb_jump(z, velocity);
            self.last_outcome = StepOutcome::LargeJump { jump };
            self.push_history(z, velocity, acceleration);
            return self.state[POS];
        }

        // 4. Noise for this step
        let noise = self.noise.adapt(regime.regime, &peak, &self.velocity_history, &self.config);
        let ctx = TransitionContext {
            regime: regime.regime,
            peak,
            periodicity,
            now: self.timestamp,
            dt,
        };

        // 5. Sigma point cycle on locals, committed only on success
        let filtered = match self.sigma_cycle(z, &ctx, &noise) {
            Ok((state, covariance, method)) => {
                self.state = state;
                self.covariance = covariance;
                self.last_outcome = StepOutcome::Filtered(method);
                self.state[POS]
            }
            Err(err) => {
                self.partial_reset(z, &err);
                self.last_outcome = StepOutcome::Recovered(err);
                self.push_history(z, velocity, acceleration);
                return z;
            }
        };

        // 6. Post-processing
        let result = self.post_process(filtered, z, &peak, &periodicity);
        self.push_history(z, velocity, acceleration);
        result
    }

    fn bootstrap(&mut self, z: f64) {
        self.state = Array1::from(vec![z, 0.0, 0.0, 0.0]);
        self.covariance = diagonal(&self.config.initial_covariance);
        self.initialized = true;
        self.last_measurement = Some(z);
        self.last_velocity = None;
        self.last_outcome = StepOutcome::Bootstrap;
        self.measurement_history.push(z);
        self.position_history.push(z);
    }

    /// Blend toward the new value, damp the derivatives and widen the
    /// covariance without ever shrinking it.
    fn absorb_jump(&mut self, z: f64, velocity: f64) {
        let cfg = &self.config;
        let w = cfg.jump_measurement_weight;
        self.state[POS] = w * z + (1.0 - w) * self.state[POS];
        self.state[VEL] = cfg.jump_velocity_weight * velocity;
        self.state[ACC] *= cfg.jump_acceleration_decay;
        self.state[JERK] = 0.0;

        let mut p = self.covariance.clone();
        for i in 0..STATE_DIM {
            let current = p[[i, i]];
            p[[i, i]] = current.max((2.0 * current).min(cfg.jump_covariance_cap[i]));
        }
        self.covariance = condition_covariance(&p, cfg);
        self.clamp_state();
    }

    fn sigma_cycle(
        &self,
        z: f64,
        ctx: &TransitionContext,
        noise: &NoiseParams,
    ) -> NumResult<(Array1<f64>, Array2<f64>, SqrtMethod)> {
        let cfg = &self.config;
        let weights = UnscentedWeights::new(noise.alpha, cfg.ut_beta, cfg.ut_kappa)?;

        // 1. Generate sigma points
        let (sigmas, first_method) =
            generate_sigma_points(&self.state, &self.covariance, &weights, cfg);

        // 2. Propagate through the filtering transition
        let propagated: Vec<Array1<f64>> = sigmas
            .iter()
            .map(|s| filtering_transition(s, ctx, cfg))
            .collect();

        // 3. Recombine (+Q)
        let (x_pred, mut p_pred) = recombine(&propagated, &weights)?;
        for i in 0..STATE_DIM {
            p_pred[[i, i]] += noise.process[i];
        }

        // 4. Redraw at the prediction and map to measurement space
        let (sigmas, second_method) = generate_sigma_points(&x_pred, &p_pred, &weights, cfg);
        let z_sigmas: Vec<f64> = sigmas.iter().map(|s| s[POS]).collect();
        let z_centre = z_sigmas[0];
        let z_pred = z_centre
            + z_sigmas
                .iter()
                .enumerate()
                .skip(1)
                .map(|(i, zi)| weights.mean[i] * (zi - z_centre))
                .sum::<f64>();

        // 5. Innovation and cross covariance
        let mut s = noise.measurement;
        let mut p_xz = Array1::<f64>::zeros(STATE_DIM);
        for (i, (sigma, zi)) in sigmas.iter().zip(z_sigmas.iter()).enumerate() {
            let dz = zi - z_pred;
            s += weights.cov[i] * dz * dz;
            p_xz.scaled_add(weights.cov[i] * dz, &(sigma - &x_pred));
        }
        if !(s.is_finite() && s > 0.0) {
            return Err(NumericalError::SingularInnovation(s));
        }

        // 6. Gain, damped for large innovations
        let innovation = z - z_pred;
        let mut gain = p_xz / s;
        let magnitude = innovation.abs();
        if magnitude > cfg.innovation_gate {
            let excess = (magnitude - cfg.innovation_gate) / cfg.innovation_gate_span;
            let scale = (1.0 - excess).max(cfg.min_gain_scale);
            gain *= scale;
        }

        // 7. Correct
        let state = &x_pred + &(&gain * innovation);
        let mut covariance = p_pred;
        for a in 0..STATE_DIM {
            for b in 0..STATE_DIM {
                covariance[[a, b]] -= gain[a] * s * gain[b];
            }
        }
        if !all_finite(state.iter()) || !all_finite(covariance.iter()) {
            return Err(NumericalError::NonFinite("posterior"));
        }

        let covariance = condition_covariance(&covariance, cfg);
        let state = clamp_state(state, cfg);
        Ok((state, covariance, first_method.max(second_method)))
    }

    /// Reinflate the covariance and drop the higher-order terms, keeping
    /// position and velocity.
    fn partial_reset(&mut self, z: f64, err: &NumericalError) {
        warn!("[UKF] numerical failure ({err}), partial reset at t={:.3}s", self.timestamp);
        self.covariance = diagonal(&self.config.recovery_covariance);
        self.state[ACC] *= 0.5;
        self.state[JERK] = 0.0;
        for i in 0..STATE_DIM {
            if !self.state[i].is_finite() {
                self.state[i] = if i == POS { z } else { 0.0 };
            }
        }
        self.clamp_state();
    }

    fn post_process(
        &self,
        filtered: f64,
        z: f64,
        peak: &PeakEvent,
        periodicity: &PeriodicityEstimate,
    ) -> f64 {
        let cfg = &self.config;
        let mut result = filtered;

        if peak.is_peak || peak.approaching {
            result += (z - result) * peak.confidence * cfg.peak_compensation;
        }

        if periodicity.is_confident(cfg.phase_correction_confidence) {
            if let Some(phase) = periodicity.interval_phase(self.timestamp) {
                let wave = (2.0 * std::f64::consts::PI * phase).sin();
                result += cfg.phase_correction_magnitude * wave;
            }
        }

        result.clamp(0.0, cfg.screen_width)
    }

    fn push_history(&mut self, z: f64, velocity: f64, acceleration: f64) {
        self.velocity_history.push(velocity);
        self.measurement_history.push(z);
        self.position_history.push(self.state[POS]);
        self.acceleration_history.push(acceleration);
    }

    fn clamp_state(&mut self) {
        let state = std::mem::replace(&mut self.state, Array1::zeros(0));
        self.state = clamp_state(state, &self.config);
    }

    // ─── Prediction ───

    pub fn snapshot(&self) -> EstimatorSnapshot {
        let mut state = [0.0; STATE_DIM];
        let mut covariance = [[0.0; STATE_DIM]; STATE_DIM];
        for i in 0..STATE_DIM {
            state[i] = self.state[i];
            for j in 0..STATE_DIM {
                covariance[i][j] = self.covariance[[i, j]];
            }
        }
        EstimatorSnapshot {
            initialized: self.initialized,
            state,
            covariance,
            context: TransitionContext {
                regime: self.regime.current().regime,
                peak: self.peaks.current(),
                periodicity: self.periodicity.estimate(),
                now: self.timestamp,
                dt: self.config.sample_interval,
            },
            noise: self.noise.last(),
        }
    }

    /// Open-loop trajectory for the next `n` frames. Never touches the
    /// live filter.
    pub fn predict_steps(&self, n: usize) -> Vec<PredictedPoint> {
        ForwardPredictor::new(&self.config).predict_steps(&self.snapshot(), n)
    }

    /// Prediction for the frame after the latest update.
    pub fn predict_next(&self) -> PredictedPoint {
        let fallback = PredictedPoint {
            position: self.state[POS],
            std_dev: self.config.initial_covariance[POS].sqrt(),
        };
        self.predict_steps(1).first().copied().unwrap_or(fallback)
    }

    /// Trajectory as (position, confidence) pairs, confidence = 1 / (1 + σ/10).
    pub fn predict_with_confidence(&self, n: usize) -> Vec<(f64, f64)> {
        self.predict_steps(n).iter().map(|p| (p.position, p.confidence())).collect()
    }

    pub fn predict_next_event_time(&self) -> Option<f64> {
        self.periodicity.predict_next_event_time(&self.config)
    }

    // ─── Accessors ───

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn position(&self) -> f64 {
        self.state[POS]
    }

    pub fn velocity(&self) -> f64 {
        if self.initialized {
            self.state[VEL]
        } else {
            0.0
        }
    }

    pub fn acceleration(&self) -> f64 {
        if self.initialized {
            self.state[ACC]
        } else {
            0.0
        }
    }

    pub fn state(&self) -> &Array1<f64> {
        &self.state
    }

    pub fn covariance(&self) -> &Array2<f64> {
        &self.covariance
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn last_outcome(&self) -> &StepOutcome {
        &self.last_outcome
    }

    pub fn regime(&self) -> RegimeEstimate {
        self.regime.current()
    }

    pub fn peak(&self) -> PeakEvent {
        self.peaks.current()
    }

    pub fn periodicity(&self) -> PeriodicityEstimate {
        self.periodicity.estimate()
    }

    pub fn velocity_history(&self) -> &RollingWindow {
        &self.velocity_history
    }

    pub fn position_history(&self) -> &RollingWindow {
        &self.position_history
    }

    pub fn acceleration_history(&self) -> &RollingWindow {
        &self.acceleration_history
    }

    pub fn measurement_history(&self) -> &RollingWindow {
        &self.measurement_history
    }
}

/// Clamp every component into its physical range.
pub fn clamp_state(mut state: Array1<f64>, config: &TrackerConfig) -> Array1<f64> {
    state[POS] = state[POS].clamp(0.0, config.screen_width);
    state[VEL] = state[VEL].clamp(-config.max_velocity, config.max_velocity);
    state[ACC] = state[ACC].clamp(-config.max_acceleration, config.max_acceleration);
    state[JERK] = state[JERK].clamp(-config.max_jerk, config.max_jerk);
    state
}
