use crate::config::TrackerConfig;
use crate::types::{Regime, RegimeEstimate};
use crate::window::RollingWindow;

/// Sliding-window motion classifier over instantaneous velocity and
/// acceleration.
#[derive(Clone, Debug)]
pub struct RegimeClassifier {
    velocities: RollingWindow,
    accelerations: RollingWindow,
    current: RegimeEstimate,
}

impl RegimeClassifier {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            velocities: RollingWindow::new(config.regime_window),
            accelerations: RollingWindow::new(config.regime_window),
            current: RegimeEstimate::default(),
        }
    }

    pub fn update(
        &mut self,
        velocity: f64,
        acceleration: f64,
        config: &TrackerConfig,
    ) -> RegimeEstimate {
        self.velocities.push(velocity);
        self.accelerations.push(acceleration);
        self.current = classify(&self.velocities, &self.accelerations, config);
        self.current
    }

    pub fn current(&self) -> RegimeEstimate {
        self.current
    }

    pub fn reset(&mut self) {
        self.velocities.clear();
        self.accelerations.clear();
        self.current = RegimeEstimate::default();
    }
}

fn classify(
    velocities: &RollingWindow,
    accelerations: &RollingWindow,
    config: &TrackerConfig,
) -> RegimeEstimate {
    if velocities.len() < config.regime_min_samples {
        return RegimeEstimate::default();
    }

    let avg_vel = velocities.mean();
    let vel_range = velocities.range();
    let peak_vel = velocities.max_abs();
    let peak_acc = accelerations.max_abs();

    let (regime, confidence) = if avg_vel.abs() < config.stable_velocity
        && vel_range < config.stable_range
    {
        (Regime::Stable, 1.0 - vel_range / config.stable_range)
    } else if avg_vel.abs() < config.pursuit_velocity && vel_range < config.pursuit_range {
        (Regime::SmoothPursuit, 1.0 - vel_range / config.pursuit_range)
    } else if avg_vel.abs() < config.pursuit_velocity
        && vel_range >= config.nystagmus_min_range
        && direction_reversals(velocities, config.reversal_velocity_floor) > 0
    {
        // Back-and-forth motion that nets out near zero
        (Regime::NystagmusLike, vel_range / (2.0 * config.nystagmus_min_range))
    } else if peak_acc > config.saccade_acceleration && peak_vel > config.saccade_velocity {
        (Regime::Saccade, peak_acc / config.saccade_confidence_scale)
    } else {
        (Regime::Transition, config.transition_confidence)
    };

    RegimeEstimate {
        regime,
        confidence: confidence.clamp(0.0, 1.0),
    }
}

/// Sign changes between successive velocities whose magnitude clears `floor`
fn direction_reversals(velocities: &RollingWindow, floor: f64) -> usize {
    let mut last_sign = 0.0_f64;
    let mut reversals = 0;
    for v in velocities.iter().filter(|v| v.abs() > floor) {
        let sign = v.signum();
        if last_sign != 0.0 && sign != last_sign {
            reversals += 1;
        }
        last_sign = sign;
    }
    reversals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(classifier: &mut RegimeClassifier, samples: &[(f64, f64)]) -> RegimeEstimate {
        let config = TrackerConfig::default();
        let mut last = RegimeEstimate::default();
        for &(v, a) in samples {
            last = classifier.update(v, a, &config);
        }
        last
    }

    #[test]
    fn test_short_window_is_stable() {
        let config = TrackerConfig::default();
        let mut classifier = RegimeClassifier::new(&config);
        let est = feed(&mut classifier, &[(200.0, 900.0); 4]);
        assert_eq!(est.regime, Regime::Stable);
        assert_eq!(est.confidence, 0.0);
    }

    #[test]
    fn test_fixation_is_stable() {
        let config = TrackerConfig::default();
        let mut classifier = RegimeClassifier::new(&config);
        let est = feed(
            &mut classifier,
            &[(1.0, 0.0), (-1.0, 0.0), (2.0, 0.0), (0.0, 0.0), (1.0, 0.0)],
        );
        assert_eq!(est.regime, Regime::Stable);
        // range 3 of 20
        assert!((est.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_slow_drift_is_smooth_pursuit() {
        let config = TrackerConfig::default();
        let mut classifier = RegimeClassifier::new(&config);
        let est = feed(
            &mut classifier,
            &[(30.0, 0.0), (32.0, 10.0), (35.0, 5.0), (31.0, 0.0), (33.0, 0.0)],
        );
        assert_eq!(est.regime, Regime::SmoothPursuit);
        assert!(est.confidence > 0.8);
    }

    #[test]
    fn test_fast_ramp_is_saccade() {
        let config = TrackerConfig::default();
        let mut classifier = RegimeClassifier::new(&config);
        let est = feed(
            &mut classifier,
            &[(0.0, 0.0), (0.0, 0.0), (300.0, 1000.0), (350.0, 1000.0), (350.0, 0.0)],
        );
        assert_eq!(est.regime, Regime::Saccade);
        assert_eq!(est.confidence, 1.0);
    }

    #[test]
    fn test_oscillation_is_nystagmus_like() {
        let config = TrackerConfig::default();
        let mut classifier = RegimeClassifier::new(&config);
        let est = feed(
            &mut classifier,
            &[
                (120.0, 0.0),
                (60.0, -400.0),
                (-40.0, -600.0),
                (-110.0, -400.0),
                (-60.0, 300.0),
                (40.0, 600.0),
            ],
        );
        assert_eq!(est.regime, Regime::NystagmusLike);
        assert_eq!(est.confidence, 1.0);
    }

    #[test]
    fn test_ambiguous_is_transition() {
        let config = TrackerConfig::default();
        let mut classifier = RegimeClassifier::new(&config);
        // fast but smooth: no sign flip, no large acceleration
        let est = feed(
            &mut classifier,
            &[(80.0, 50.0), (90.0, 50.0), (100.0, 50.0), (130.0, 50.0), (150.0, 50.0)],
        );
        assert_eq!(est.regime, Regime::Transition);
        assert_eq!(est.confidence, 0.5);
    }

    #[test]
    fn test_reset_clears_window() {
        let config = TrackerConfig::default();
        let mut classifier = RegimeClassifier::new(&config);
        feed(&mut classifier, &[(300.0, 1000.0); 6]);
        classifier.reset();
        assert_eq!(classifier.current(), RegimeEstimate::default());
        let est = feed(&mut classifier, &[(300.0, 1000.0); 4]);
        assert_eq!(est.regime, Regime::Stable);
    }
}
