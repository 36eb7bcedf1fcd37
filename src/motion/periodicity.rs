use std::collections::VecDeque;

use crate::config::TrackerConfig;
use crate::types::PeriodicityEstimate;
use crate::window::{variance, RollingWindow};

impl PeriodicityEstimate {
    /// Expected time of the next reversal, if the period is trusted.
    pub fn next_event_time(&self, min_confidence: f64) -> Option<f64> {
        match self.last_event_time {
            Some(last) if self.period > 0.0 && self.period_confidence > min_confidence => {
                Some(last + self.period)
            }
            _ => None,
        }
    }

    /// Fraction of the current reversal interval elapsed at `time`, in [0, 1).
    pub fn interval_phase(&self, time: f64) -> Option<f64> {
        self.phase_over(time, self.period)
    }

    /// Fraction of the full oscillation cycle (two reversals) elapsed at `time`.
    pub fn cycle_phase(&self, time: f64) -> Option<f64> {
        self.phase_over(time, 2.0 * self.period)
    }

    fn phase_over(&self, time: f64, span: f64) -> Option<f64> {
        let last = self.last_event_time?;
        if !(span > 0.0) || !time.is_finite() {
            return None;
        }
        Some((time - last).rem_euclid(span) / span)
    }

    /// Active and trusted enough to drive phase corrections.
    pub fn is_confident(&self, min_confidence: f64) -> bool {
        self.is_active && self.period_confidence > min_confidence
    }
}

/// Direction-reversal statistics over a sliding window of the trace.
#[derive(Clone, Debug)]
pub struct PeriodicityTracker {
    positions: RollingWindow,
    velocities: RollingWindow,
    timestamps: RollingWindow,
    intervals: VecDeque<f64>,
    /// Sign of the last velocity that cleared the reversal floor, 0 before any
    last_direction: f64,
    estimate: PeriodicityEstimate,
}

impl PeriodicityTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            positions: RollingWindow::new(config.periodicity_window),
            velocities: RollingWindow::new(config.periodicity_window),
            timestamps: RollingWindow::new(config.periodicity_window),
            intervals: VecDeque::with_capacity(config.max_intervals + 1),
            last_direction: 0.0,
            estimate: PeriodicityEstimate::default(),
        }
    }

    pub fn update(
        &mut self,
        position: f64,
        velocity: f64,
        time: f64,
        config: &TrackerConfig,
    ) -> PeriodicityEstimate {
        self.positions.push(position);
        self.velocities.push(velocity);
        self.timestamps.push(time);

        if velocity.abs() > config.reversal_velocity_floor {
            let direction = velocity.signum();
            if self.last_direction != 0.0 && direction != self.last_direction {
                self.record_reversal(time, config);
            }
            self.last_direction = direction;
        }

        self.refresh_interval_stats(config);
        self.refresh_activity(config);
        self.estimate
    }

    pub fn estimate(&self) -> PeriodicityEstimate {
        self.estimate
    }

    pub fn predict_next_event_time(&self, config: &TrackerConfig) -> Option<f64> {
        self.estimate.next_event_time(config.event_confidence)
    }

    pub fn reset(&mut self) {
        self.positions.clear();
        self.velocities.clear();
        self.timestamps.clear();
        self.intervals.clear();
        self.last_direction = 0.0;
        self.estimate = PeriodicityEstimate::default();
    }

    fn record_reversal(&mut self, time: f64, config: &TrackerConfig) {
        if let Some(last) = self.estimate.last_event_time {
            let interval = time - last;
            if interval > 0.0 {
                self.intervals.push_back(interval);
                while self.intervals.len() > config.max_intervals {
                    self.intervals.pop_front();
                }
            }
        }
        self.estimate.last_event_time = Some(time);
    }

    fn refresh_interval_stats(&mut self, config: &TrackerConfig) {
        let est = &mut self.estimate;
        if self.intervals.len() < config.min_intervals {
            est.period = 0.0;
            est.period_confidence = 0.0;
            est.frequency = 0.0;
            return;
        }

        let count = self.intervals.len() as f64;
        let spanned: f64 = self.intervals.iter().sum();
        let mean = spanned / count;
        let spread = variance(self.intervals.iter().copied()).sqrt();

        est.period = mean;
        est.period_confidence = 1.0 / (1.0 + spread / mean);
        // two reversals per cycle
        est.frequency = count / (2.0 * spanned);
    }

    fn refresh_activity(&mut self, config: &TrackerConfig) {
        if self.positions.len() < config.periodicity_min_samples {
            self.estimate.amplitude = 0.0;
            self.estimate.is_active = false;
            return;
        }

        let amplitude = self.positions.range() / 2.0;
        let speed_variance = variance(self.velocities.iter().map(f64::abs));
        let frequency = self.estimate.frequency;

        self.estimate.amplitude = amplitude;
        self.estimate.is_active = frequency > config.min_frequency
            && frequency < config.max_frequency
            && speed_variance > config.min_velocity_variance
            && amplitude > config.min_amplitude;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::sinusoid;
    use approx::assert_abs_diff_eq;

    fn feed_sinusoid(
        tracker: &mut PeriodicityTracker,
        freq: f64,
        amplitude: f64,
        frames: usize,
    ) -> PeriodicityEstimate {
        let config = TrackerConfig::default();
        let dt = config.sample_interval;
        let trace = sinusoid(960.0, amplitude, freq, dt, frames);
        let mut last = PeriodicityEstimate::default();
        for i in 1..trace.len() {
            let velocity = (trace[i] - trace[i - 1]) / dt;
            last = tracker.update(trace[i], velocity, i as f64 * dt, &config);
        }
        last
    }

    #[test]
    fn test_detects_two_hertz_oscillation() {
        let config = TrackerConfig::default();
        let mut tracker = PeriodicityTracker::new(&config);
        let est = feed_sinusoid(&mut tracker, 2.0, 60.0, 180);
        assert!(est.is_active);
        assert!((est.frequency - 2.0).abs() < 0.4, "frequency {}", est.frequency);
        assert!((est.amplitude - 60.0).abs() < 5.0, "amplitude {}", est.amplitude);
        assert!(est.period_confidence > 0.7);
        assert!(tracker.predict_next_event_time(&config).is_some());
    }

    #[test]
    fn test_frequency_band() {
        let config = TrackerConfig::default();
        for freq in [1.0, 3.0, 4.0] {
            let mut tracker = PeriodicityTracker::new(&config);
            let est = feed_sinusoid(&mut tracker, freq, 60.0, 300);
            assert!(est.is_active, "{freq} Hz not detected");
            assert!(
                (est.frequency - freq).abs() <= 0.2 * freq,
                "{freq} Hz estimated as {}",
                est.frequency
            );
        }
    }

    #[test]
    fn test_small_amplitude_is_inactive() {
        let config = TrackerConfig::default();
        let mut tracker = PeriodicityTracker::new(&config);
        let est = feed_sinusoid(&mut tracker, 2.0, 10.0, 180);
        assert!(!est.is_active);
    }

    #[test]
    fn test_constant_signal_has_no_period() {
        let config = TrackerConfig::default();
        let mut tracker = PeriodicityTracker::new(&config);
        for i in 0..60 {
            tracker.update(500.0, 0.0, i as f64 / 60.0, &config);
        }
        let est = tracker.estimate();
        assert!(!est.is_active);
        assert_eq!(est.period, 0.0);
        assert_eq!(est.last_event_time, None);
        assert_eq!(tracker.predict_next_event_time(&config), None);
    }

    #[test]
    fn test_phase_helpers() {
        let est = PeriodicityEstimate {
            period: 0.25,
            period_confidence: 0.9,
            frequency: 2.0,
            amplitude: 50.0,
            last_event_time: Some(1.0),
            is_active: true,
        };
        assert_abs_diff_eq!(est.interval_phase(1.125).unwrap_or(-1.0), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(est.cycle_phase(1.125).unwrap_or(-1.0), 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(est.next_event_time(0.7).unwrap_or(-1.0), 1.25, epsilon = 1e-12);
        assert_eq!(est.next_event_time(0.95), None);
        assert!(est.is_confident(0.8));
        assert_eq!(PeriodicityEstimate::default().cycle_phase(1.0), None);
    }

    #[test]
    fn test_reset() {
        let config = TrackerConfig::default();
        let mut tracker = PeriodicityTracker::new(&config);
        feed_sinusoid(&mut tracker, 2.0, 60.0, 120);
        tracker.reset();
        assert_eq!(tracker.estimate(), PeriodicityEstimate::default());
    }
}
