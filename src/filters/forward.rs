use log::warn;
use ndarray::{Array1, Array2};

use super::sigma::{
    all_finite, condition_covariance, generate_sigma_points, recombine, UnscentedWeights,
};
use super::transition::{prediction_transition, TransitionContext};
use super::ukf_4d::EstimatorSnapshot;
use crate::config::TrackerConfig;
use crate::error::{NumResult, NumericalError};
use crate::types::{PredictedPoint, POS, STATE_DIM};

/// Open-loop multi-step extrapolation from an estimator snapshot.
///
/// Each step is a full unscented propagation through the prediction
/// transition with no measurement correction, so the position variance
/// only grows (up to the covariance ceiling).
pub struct ForwardPredictor<'a> {
    config: &'a TrackerConfig,
}

impl<'a> ForwardPredictor<'a> {
    pub fn new(config: &'a TrackerConfig) -> Self {
        Self { config }
    }

    pub fn predict_steps(&self, snapshot: &EstimatorSnapshot, n: usize) -> Vec<PredictedPoint> {
        let cfg = self.config;
        if !snapshot.initialized {
            warn!("[Predict] estimator not initialized, returning {n} default points");
            let default = PredictedPoint {
                position: 0.0,
                std_dev: cfg.initial_covariance[POS].sqrt(),
            };
            return vec![default; n];
        }

        let mut x = Array1::from(snapshot.state.to_vec());
        let mut p =
            Array2::from_shape_fn((STATE_DIM, STATE_DIM), |(i, j)| snapshot.covariance[i][j]);
        let std_ceiling = cfg.covariance_ceiling(POS).sqrt();

        let mut last = PredictedPoint {
            position: x[POS].clamp(0.0, cfg.screen_width),
            std_dev: p[[POS, POS]].max(0.0).sqrt().min(std_ceiling),
        };
        if !(last.position.is_finite() && last.std_dev.is_finite()) {
            last = PredictedPoint {
                position: 0.0,
                std_dev: std_ceiling,
            };
        }

        let weights = match UnscentedWeights::new(snapshot.noise.alpha, cfg.ut_beta, cfg.ut_kappa) {
            Ok(w) => w,
            Err(err) => {
                warn!("[Predict] {err}, holding current position");
                return vec![last; n];
            }
        };

        let mut points = Vec::with_capacity(n);
        for k in 0..n {
            let ctx = TransitionContext {
                now: snapshot.context.now + k as f64 * snapshot.context.dt,
                ..snapshot.context
            };
            match self.step(&x, &p, &ctx, &weights, snapshot) {
                Ok((next_x, next_p)) => {
                    let std_dev = next_p[[POS, POS]].sqrt().min(std_ceiling).max(last.std_dev);
                    last = PredictedPoint {
                        position: next_x[POS],
                        std_dev,
                    };
                    x = next_x;
                    p = next_p;
                    points.push(last);
                }
                Err(err) => {
                    warn!("[Predict] {err} at step {}/{n}, repeating last point", k + 1);
                    points.resize(n, last);
                    break;
                }
            }
        }
        points
    }

    fn step(
        &self,
        x: &Array1<f64>,
        p: &Array2<f64>,
        ctx: &TransitionContext,
        weights: &UnscentedWeights,
        snapshot: &EstimatorSnapshot,
    ) -> NumResult<(Array1<f64>, Array2<f64>)> {
        let cfg = self.config;

        // 1. Generate sigma points
        let (sigmas, _) = generate_sigma_points(x, p, weights, cfg);

        // 2. Propagate through the prediction transition
        let propagated: Vec<Array1<f64>> = sigmas
            .iter()
            .map(|s| prediction_transition(s, ctx, cfg))
            .collect();

        // 3. Recombine (+Q), no correction
        let (mut next_x, mut next_p) = recombine(&propagated, weights)?;
        for i in 0..STATE_DIM {
            next_p[[i, i]] += snapshot.noise.process[i];
        }

        // 4. Condition without letting the diagonal shrink below the
        //    previous step (unless the ceiling forces it)
        let mut next_p = condition_covariance(&next_p, cfg);
        for i in 0..STATE_DIM {
            next_p[[i, i]] = next_p[[i, i]].max(p[[i, i]].min(cfg.covariance_ceiling(i)));
        }

        next_x[POS] = next_x[POS].clamp(0.0, cfg.screen_width);
        if !all_finite(next_x.iter()) || !all_finite(next_p.iter()) {
            return Err(NumericalError::NonFinite("forward step"));
        }
        Ok((next_x, next_p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::NoiseParams;
    use crate::types::{PeakEvent, PeriodicityEstimate, Regime};

    fn snapshot(state: [f64; STATE_DIM], regime: Regime) -> EstimatorSnapshot {
        let config = TrackerConfig::default();
        let mut covariance = [[0.0; STATE_DIM]; STATE_DIM];
        for i in 0..STATE_DIM {
            covariance[i][i] = config.initial_covariance[i];
        }
        EstimatorSnapshot {
            initialized: true,
            state,
            covariance,
            context: TransitionContext {
                regime,
                peak: PeakEvent::default(),
                periodicity: PeriodicityEstimate::default(),
                now: 2.0,
                dt: config.sample_interval,
            },
            noise: NoiseParams::baseline(&config),
        }
    }

    #[test]
    fn test_moving_target_keeps_moving() {
        let config = TrackerConfig::default();
        let predictor = ForwardPredictor::new(&config);
        let start = snapshot([800.0, 120.0, 0.0, 0.0], Regime::SmoothPursuit);
        let points = predictor.predict_steps(&start, 10);
        assert_eq!(points.len(), 10);
        for pair in points.windows(2) {
            assert!(pair[1].position > pair[0].position);
        }
        // decaying velocity: less than the constant-velocity distance
        assert!(points[9].position < 800.0 + 120.0 * 10.0 * config.sample_interval);
    }

    #[test]
    fn test_saccade_prediction_stops_quickly() {
        let config = TrackerConfig::default();
        let predictor = ForwardPredictor::new(&config);
        let state = [800.0, 250.0, 0.0, 0.0];
        let saccade = predictor.predict_steps(&snapshot(state, Regime::Saccade), 20);
        let pursuit = predictor.predict_steps(&snapshot(state, Regime::SmoothPursuit), 20);
        assert!(saccade[19].position < pursuit[19].position);
    }

    #[test]
    fn test_std_dev_bounded_and_non_decreasing() {
        let config = TrackerConfig::default();
        let predictor = ForwardPredictor::new(&config);
        let start = snapshot([50.0, -200.0, -500.0, 0.0], Regime::Transition);
        let points = predictor.predict_steps(&start, 200);
        let ceiling = config.covariance_ceiling(POS).sqrt();
        for pair in points.windows(2) {
            assert!(pair[1].std_dev >= pair[0].std_dev);
        }
        assert!(points.iter().all(|p| p.std_dev <= ceiling + 1e-9));
        // heading left into the screen edge
        assert!(points.iter().all(|p| p.position >= 0.0));
    }

    #[test]
    fn test_non_finite_snapshot_repeats_last_point() {
        let config = TrackerConfig::default();
        let predictor = ForwardPredictor::new(&config);
        let mut snap = snapshot([600.0, f64::NAN, 0.0, 0.0], Regime::Stable);
        snap.covariance[1][1] = f64::NAN;
        let points = predictor.predict_steps(&snap, 6);
        assert_eq!(points.len(), 6);
        assert!(points.iter().all(|p| p.position.is_finite() && p.std_dev.is_finite()));
        assert!(points.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_zero_steps() {
        let config = TrackerConfig::default();
        let predictor = ForwardPredictor::new(&config);
        let start = snapshot([600.0, 0.0, 0.0, 0.0], Regime::Stable);
        assert!(predictor.predict_steps(&start, 0).is_empty());
    }
}
