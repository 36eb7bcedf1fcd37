use crate::config::TrackerConfig;
use crate::window::RollingWindow;

/// How `OutlierGuard::filter` resolved a sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    /// Candidate within threshold, passed through
    Trusted,
    /// Between one and two thresholds, pulled toward the raw value
    Blended,
    /// Beyond two thresholds, replaced by the history median blend
    Suppressed,
    /// Non-finite raw value, candidate passed through untouched
    Skipped,
}

/// Robust post-filter blend between the filtered candidate and the raw
/// measurement, with a threshold that adapts to the raw input spread.
#[derive(Clone, Debug)]
pub struct OutlierGuard {
    history: RollingWindow,
    // Welford accumulators over raw inputs
    count: u64,
    mean: f64,
    m2: f64,
    last_decision: GuardDecision,
}

impl OutlierGuard {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            history: RollingWindow::new(config.outlier_history),
            count: 0,
            mean: 0.0,
            m2: 0.0,
            last_decision: GuardDecision::Trusted,
        }
    }

    pub fn filter(&mut self, raw: f64, candidate: f64, config: &TrackerConfig) -> f64 {
        if !raw.is_finite() {
            self.last_decision = GuardDecision::Skipped;
            return candidate;
        }
        self.observe(raw);

        let threshold = self.threshold(config);
        let err = (raw - candidate).abs();

        let (result, decision) = if err < threshold {
            (candidate, GuardDecision::Trusted)
        } else if err < 2.0 * threshold {
            let w = ((err - threshold) / threshold).min(config.outlier_max_blend);
            (candidate + (raw - candidate) * w, GuardDecision::Blended)
        } else {
            let blended = match median(&self.history) {
                Some(med) => {
                    let w = config.outlier_median_weight;
                    w * med + (1.0 - w) * candidate
                }
                None => {
                    let w = config.outlier_conservative_weight;
                    w * candidate + (1.0 - w) * raw
                }
            };
            (blended, GuardDecision::Suppressed)
        };

        self.history.push(result);
        self.last_decision = decision;
        result
    }

    /// clamp(2σ, min, max) once enough raw samples with some spread exist,
    /// else the default
    pub fn threshold(&self, config: &TrackerConfig) -> f64 {
        let variance = self.variance();
        if self.count > config.outlier_min_samples && variance > 0.0 {
            (2.0 * variance.sqrt())
                .clamp(config.outlier_threshold_min, config.outlier_threshold_max)
        } else {
            config.outlier_default_threshold
        }
    }

    pub fn last_decision(&self) -> GuardDecision {
        self.last_decision
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.count = 0;
        self.mean = 0.0;
        self.m2 = 0.0;
        self.last_decision = GuardDecision::Trusted;
    }

    fn observe(&mut self, raw: f64) {
        self.count += 1;
        let delta = raw - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (raw - self.mean);
    }

    /// Population variance of the raw inputs
    fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }
}

/// Upper median (`sorted[len / 2]`)
fn median(window: &RollingWindow) -> Option<f64> {
    if window.is_empty() {
        return None;
    }
    let mut values: Vec<f64> = window.iter().collect();
    values.sort_by(f64::total_cmp);
    values.get(values.len() / 2).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_trusts_close_candidate() {
        let config = TrackerConfig::default();
        let mut guard = OutlierGuard::new(&config);
        assert_eq!(guard.filter(510.0, 500.0, &config), 500.0);
        assert_eq!(guard.last_decision(), GuardDecision::Trusted);
    }

    #[test]
    fn test_blends_moderate_error() {
        let config = TrackerConfig::default();
        let mut guard = OutlierGuard::new(&config);
        // err 60 against the default threshold 40: weight 0.5
        let out = guard.filter(560.0, 500.0, &config);
        assert_abs_diff_eq!(out, 530.0, epsilon = 1e-12);
        assert_eq!(guard.last_decision(), GuardDecision::Blended);
    }

    #[test]
    fn test_suppresses_without_history() {
        let config = TrackerConfig::default();
        let mut guard = OutlierGuard::new(&config);
        let out = guard.filter(700.0, 500.0, &config);
        assert_abs_diff_eq!(out, 0.7 * 500.0 + 0.3 * 700.0, epsilon = 1e-12);
        assert_eq!(guard.last_decision(), GuardDecision::Suppressed);
    }

    #[test]
    fn test_suppresses_with_median() {
        let config = TrackerConfig::default();
        let mut guard = OutlierGuard::new(&config);
        for v in [498.0, 502.0, 500.0] {
            guard.filter(v, v, &config);
        }
        let out = guard.filter(900.0, 520.0, &config);
        assert_abs_diff_eq!(out, 0.6 * 500.0 + 0.4 * 520.0, epsilon = 1e-12);
    }

    #[test]
    fn test_threshold_adapts_to_spread() {
        let config = TrackerConfig::default();
        let mut guard = OutlierGuard::new(&config);
        for i in 0..11 {
            guard.filter(500.0 + (i % 2) as f64, 500.0, &config);
        }
        // tiny spread clamps to the minimum
        assert_eq!(guard.threshold(&config), config.outlier_threshold_min);

        let mut noisy = OutlierGuard::new(&config);
        for i in 0..20 {
            let raw = if i % 2 == 0 { 300.0 } else { 900.0 };
            noisy.filter(raw, raw, &config);
        }
        assert_eq!(noisy.threshold(&config), config.outlier_threshold_max);
    }

    #[test]
    fn test_non_finite_raw_is_skipped() {
        let config = TrackerConfig::default();
        let mut guard = OutlierGuard::new(&config);
        assert_eq!(guard.filter(f64::NAN, 640.0, &config), 640.0);
        assert_eq!(guard.last_decision(), GuardDecision::Skipped);
        assert_eq!(guard.threshold(&config), config.outlier_default_threshold);
    }

    #[test]
    fn test_median_is_upper() {
        let mut window = RollingWindow::new(5);
        assert_eq!(median(&window), None);
        for v in [4.0, 1.0, 3.0, 2.0] {
            window.push(v);
        }
        assert_eq!(median(&window), Some(3.0));
    }
}
