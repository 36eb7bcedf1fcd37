//! State transition models
//!
//! Both models share the same constant-jerk kinematic skeleton and differ in
//! how they shape the higher-order terms. The filtering model reacts to
//! what the detectors just saw (peak inversion, approach damping). The
//! prediction model runs open loop, so it decays more slowly and injects the
//! expected oscillation phase instead of reacting to an observed peak.

use std::f64::consts::PI;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::types::{
    PeakEvent, PeakKind, PeriodicityEstimate, Regime, ACC, JERK, POS, STATE_DIM, VEL,
};

/// Everything a transition needs besides the state itself.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionContext {
    pub regime: Regime,
    pub peak: PeakEvent,
    pub periodicity: PeriodicityEstimate,
    /// Time at the start of the step [s]
    pub now: f64,
    pub dt: f64,
}

/// Constant-jerk extrapolation over `dt`.
pub fn kinematic_step(x: &Array1<f64>, dt: f64) -> Array1<f64> {
    let dt2 = dt * dt;
    let dt3 = dt2 * dt;
    let mut next = Array1::<f64>::zeros(STATE_DIM);
    next[POS] = x[POS] + x[VEL] * dt + 0.5 * x[ACC] * dt2 + x[JERK] * dt3 / 6.0;
    next[VEL] = x[VEL] + x[ACC] * dt + 0.5 * x[JERK] * dt2;
    next[ACC] = x[ACC] + x[JERK] * dt;
    next[JERK] = x[JERK];
    next
}

fn apply_decay(x: &mut Array1<f64>, decay: [f64; 3]) {
    x[VEL] *= decay[0];
    x[ACC] *= decay[1];
    x[JERK] *= decay[2];
}

fn clamp_derivatives(x: &mut Array1<f64>, config: &TrackerConfig) {
    x[VEL] = x[VEL].clamp(-config.max_velocity, config.max_velocity);
    x[ACC] = x[ACC].clamp(-config.max_acceleration, config.max_acceleration);
    x[JERK] = x[JERK].clamp(-config.max_jerk, config.max_jerk);
}

/// Transition used inside the measurement-corrected filter cycle.
pub fn filtering_transition(
    x: &Array1<f64>,
    ctx: &TransitionContext,
    config: &TrackerConfig,
) -> Array1<f64> {
    let mut next = kinematic_step(x, ctx.dt);
    let mut decay = config.tuning(ctx.regime).filter_decay;

    if ctx.peak.is_peak {
        decay = config.peak_decay;
        if ctx.peak.kind != PeakKind::None {
            // the turn reverses the higher-order terms
            next[ACC] *= config.peak_acceleration_inversion;
            next[JERK] *= config.peak_jerk_inversion;
        }
    } else if ctx.peak.approaching {
        decay[0] = config.approach_decay[0];
        decay[1] = config.approach_decay[1];
        next[POS] += x[VEL] * ctx.dt * ctx.peak.confidence * config.approach_position_gain;
    }
    apply_decay(&mut next, decay);

    let periodicity = &ctx.periodicity;
    if periodicity.is_confident(config.phase_nudge_confidence) {
        if let Some(next_event) = periodicity.next_event_time(config.event_confidence) {
            let time_to_event = next_event - ctx.now;
            if time_to_event > 0.0 && time_to_event < periodicity.period {
                let phase = 2.0 * PI * time_to_event / periodicity.period;
                next[POS] += phase.sin() * periodicity.amplitude * config.phase_nudge_gain;
            }
        }
    }

    clamp_derivatives(&mut next, config);
    next
}

/// Open-loop transition used by the forward predictor.
pub fn prediction_transition(
    x: &Array1<f64>,
    ctx: &TransitionContext,
    config: &TrackerConfig,
) -> Array1<f64> {
    let mut next = kinematic_step(x, ctx.dt);

    let periodicity = &ctx.periodicity;
    if periodicity.is_confident(config.event_confidence) {
        // phase at the end of this step
        if let Some(phase) = periodicity.cycle_phase(ctx.now + ctx.dt) {
            let angle = 2.0 * PI * phase;
            next[POS] += config.predict_phase_position_gain * periodicity.amplitude * angle.sin();
            next[VEL] += config.predict_phase_velocity_gain * periodicity.amplitude * angle.cos();
        }
    }

    apply_decay(&mut next, config.tuning(ctx.regime).predict_decay);
    clamp_derivatives(&mut next, config);
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ctx(regime: Regime) -> TransitionContext {
        TransitionContext {
            regime,
            peak: PeakEvent::default(),
            periodicity: PeriodicityEstimate::default(),
            now: 1.0,
            dt: 1.0 / 60.0,
        }
    }

    fn oscillating() -> PeriodicityEstimate {
        PeriodicityEstimate {
            period: 0.25,
            period_confidence: 0.95,
            frequency: 2.0,
            amplitude: 60.0,
            last_event_time: Some(0.9),
            is_active: true,
        }
    }

    #[test]
    fn test_kinematic_step() {
        let x = Array1::from(vec![100.0, 60.0, 30.0, 6.0]);
        let next = kinematic_step(&x, 0.5);
        assert_abs_diff_eq!(next[POS], 100.0 + 30.0 + 3.75 + 0.125, epsilon = 1e-12);
        assert_abs_diff_eq!(next[VEL], 60.0 + 15.0 + 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(next[ACC], 33.0, epsilon = 1e-12);
        assert_eq!(next[JERK], 6.0);
    }

    #[test]
    fn test_regime_decay() {
        let config = TrackerConfig::default();
        let x = Array1::from(vec![500.0, 100.0, 0.0, 0.0]);
        let stable = filtering_transition(&x, &ctx(Regime::Stable), &config);
        let saccade = filtering_transition(&x, &ctx(Regime::Saccade), &config);
        assert_abs_diff_eq!(stable[VEL], 85.0, epsilon = 1e-9);
        assert_abs_diff_eq!(saccade[VEL], 98.0, epsilon = 1e-9);
    }

    #[test]
    fn test_confirmed_peak_inverts_acceleration() {
        let config = TrackerConfig::default();
        let x = Array1::from(vec![500.0, 0.0, 400.0, 100.0]);
        let mut c = ctx(Regime::NystagmusLike);
        c.peak = PeakEvent {
            kind: PeakKind::Max,
            confidence: 0.6,
            is_peak: true,
            approaching: false,
            detection_frame: Some(60),
        };
        let next = filtering_transition(&x, &c, &config);
        let plain = kinematic_step(&x, c.dt);
        assert_abs_diff_eq!(next[ACC], plain[ACC] * -0.5 * 0.97, epsilon = 1e-9);
        assert_abs_diff_eq!(next[JERK], 100.0 * -0.8 * 0.95, epsilon = 1e-9);
    }

    #[test]
    fn test_approaching_peak_leads_position() {
        let config = TrackerConfig::default();
        let x = Array1::from(vec![500.0, 60.0, 0.0, 0.0]);
        let mut c = ctx(Regime::Transition);
        c.peak.approaching = true;
        c.peak.confidence = 0.4;
        let next = filtering_transition(&x, &c, &config);
        let plain = kinematic_step(&x, c.dt);
        assert_abs_diff_eq!(next[POS] - plain[POS], 60.0 * c.dt * 0.4 * 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(next[VEL], 60.0 * 0.96, epsilon = 1e-9);
    }

    #[test]
    fn test_phase_nudge_only_with_confident_period() {
        let config = TrackerConfig::default();
        let x = Array1::from(vec![960.0, 0.0, 0.0, 0.0]);
        let mut c = ctx(Regime::NystagmusLike);
        c.periodicity = oscillating();
        let nudged = filtering_transition(&x, &c, &config);
        // next event at 1.15, 0.15 s away: sin(2π·0.6)·60·0.05
        let expected = (2.0 * PI * 0.6).sin() * 60.0 * 0.05;
        assert_abs_diff_eq!(nudged[POS] - 960.0, expected, epsilon = 1e-9);

        c.periodicity.is_active = false;
        let plain = filtering_transition(&x, &c, &config);
        assert_eq!(plain[POS], 960.0);
    }

    #[test]
    fn test_prediction_transition_decays_slower() {
        let config = TrackerConfig::default();
        let x = Array1::from(vec![500.0, 100.0, 200.0, 0.0]);
        let c = ctx(Regime::Stable);
        let filt = filtering_transition(&x, &c, &config);
        let pred = prediction_transition(&x, &c, &config);
        assert!(pred[VEL] > filt[VEL]);
        assert!(pred[ACC] > filt[ACC]);
    }

    #[test]
    fn test_prediction_ignores_peak_inversion() {
        let config = TrackerConfig::default();
        let x = Array1::from(vec![500.0, 0.0, 400.0, 100.0]);
        let mut c = ctx(Regime::Transition);
        c.peak.is_peak = true;
        c.peak.kind = PeakKind::Max;
        let next = prediction_transition(&x, &c, &config);
        assert!(next[ACC] > 0.0);
        assert!(next[JERK] > 0.0);
    }

    #[test]
    fn test_prediction_phase_term_uses_step_time() {
        let config = TrackerConfig::default();
        let x = Array1::from(vec![960.0, 0.0, 0.0, 0.0]);
        let mut early = ctx(Regime::NystagmusLike);
        early.periodicity = oscillating();
        let mut late = early;
        late.now += 5.0 * early.dt;
        let a = prediction_transition(&x, &early, &config);
        let b = prediction_transition(&x, &late, &config);
        assert!((a[POS] - b[POS]).abs() > 1e-6);
        // cycle of 0.5 s, end of step at 1.0 + 1/60: φ = (0.1 + 1/60) / 0.5
        let phase = (0.1 + 1.0 / 60.0) / 0.5;
        assert_abs_diff_eq!(a[POS] - 960.0, 0.1 * 60.0 * (2.0 * PI * phase).sin(), epsilon = 1e-9);
    }

    #[test]
    fn test_clamps() {
        let config = TrackerConfig::default();
        let x = Array1::from(vec![500.0, 5000.0, -9000.0, 1e6]);
        let next = filtering_transition(&x, &ctx(Regime::Saccade), &config);
        assert!(next[VEL].abs() <= config.max_velocity);
        assert!(next[ACC].abs() <= config.max_acceleration);
        assert!(next[JERK].abs() <= config.max_jerk);
    }
}
