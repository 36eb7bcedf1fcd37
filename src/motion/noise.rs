use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::types::{PeakEvent, Regime, STATE_DIM};
use crate::window::RollingWindow;

/// Noise magnitudes and sigma spread for one filter step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseParams {
    /// Diagonal of Q
    pub process: [f64; STATE_DIM],
    /// R
    pub measurement: f64,
    pub alpha: f64,
}

impl NoiseParams {
    /// Unadjusted base noise, used before the first adaptation.
    pub fn baseline(config: &TrackerConfig) -> Self {
        Self {
            process: config.base_process_noise,
            measurement: config.base_measurement_noise,
            alpha: config.transition.alpha,
        }
    }
}

/// Adaptive Q/R policy driven by regime, peak state and velocity dispersion.
#[derive(Clone, Debug)]
pub struct NoiseController {
    last: NoiseParams,
}

impl NoiseController {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            last: NoiseParams::baseline(config),
        }
    }

    pub fn last(&self) -> NoiseParams {
        self.last
    }

    pub fn reset(&mut self, config: &TrackerConfig) {
        self.last = NoiseParams::baseline(config);
    }

    pub fn adapt(
        &mut self,
        regime: Regime,
        peak: &PeakEvent,
        velocities: &RollingWindow,
        config: &TrackerConfig,
    ) -> NoiseParams {
        let tuning = config.tuning(regime);
        let mut motion_factor = tuning.motion_factor;
        let mut measurement = config.base_measurement_noise;
        let mut alpha = tuning.alpha;

        if peak.is_peak {
            motion_factor *= config.peak_motion_factor;
            measurement *= config.peak_measurement_scale;
            alpha = config.peak_alpha;
        } else if peak.approaching {
            motion_factor *= config.approach_motion_factor;
            measurement *= config.approach_measurement_scale;
            alpha = config.approach_alpha;
        }

        let mut process = config.base_process_noise.map(|q| q * motion_factor);
        // more process noise means the measurement is trusted more
        measurement /= motion_factor * 0.5 + 0.5;

        if velocities.len() >= config.stability_min_history {
            let spread = velocities.std_dev();
            // logistic in the velocity spread, 0.5 at the midpoint
            let logit = config.stability_slope * (spread - config.stability_midpoint);
            let stab = 1.0 / (1.0 + (-logit).exp());
            for q in process.iter_mut() {
                *q *= 0.5 + stab;
            }
            measurement *= 1.5 - 0.5 * stab;
        }

        for (i, q) in process.iter_mut().enumerate() {
            *q = q.clamp(config.process_noise_min[i], config.process_noise_max[i]);
        }
        let measurement =
            measurement.clamp(config.measurement_noise_min, config.measurement_noise_max);

        self.last = NoiseParams {
            process,
            measurement,
            alpha,
        };
        self.last
    }
}
