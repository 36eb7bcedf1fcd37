use crate::config::TrackerConfig;
use crate::types::{PeakEvent, PeakKind};
use crate::window::RollingWindow;

/// Multi-scale turning point detector.
///
/// Each update votes on whether the trace just turned: one vote per scale at
/// which the centre sample is a strict local extremum, plus
/// `zero_cross_votes` when the velocity flips sign or stalls. The event is
/// rebuilt from scratch on every update.
#[derive(Clone, Debug)]
pub struct PeakDetector {
    positions: RollingWindow,
    velocities: RollingWindow,
    accelerations: RollingWindow,
    current: PeakEvent,
}

impl PeakDetector {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            positions: RollingWindow::new(config.peak_window),
            velocities: RollingWindow::new(config.peak_window),
            accelerations: RollingWindow::new(config.peak_window),
            current: PeakEvent::default(),
        }
    }

    pub fn update(
        &mut self,
        position: f64,
        velocity: f64,
        acceleration: f64,
        frame_id: u64,
        config: &TrackerConfig,
    ) -> PeakEvent {
        self.positions.push(position);
        self.velocities.push(velocity);
        self.accelerations.push(acceleration);
        self.current = self.detect(frame_id, config);
        self.current
    }

    pub fn current(&self) -> PeakEvent {
        self.current
    }

    pub fn reset(&mut self) {
        self.positions.clear();
        self.velocities.clear();
        self.accelerations.clear();
        self.current = PeakEvent::default();
    }

    fn detect(&self, frame_id: u64, config: &TrackerConfig) -> PeakEvent {
        if self.positions.len() < config.peak_min_samples {
            return PeakEvent::default();
        }

        let scale_votes = config
            .peak_scales
            .iter()
            .filter(|&&scale| is_extremum_at_scale(&self.positions, scale))
            .count() as u32;

        // newest three velocities, oldest first
        let (v1, v2, v3) = match (
            self.velocities.from_back(2),
            self.velocities.from_back(1),
            self.velocities.from_back(0),
        ) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => return PeakEvent::default(),
        };
        let latest_acc = self.accelerations.last().unwrap_or(0.0);

        let zero_cross = v1 * v3 < 0.0
            || (v2.abs() < config.near_zero_velocity && v3.abs() < config.small_velocity);
        let approaching = v3.abs() < v2.abs()
            && v3.abs() < config.approach_velocity
            && latest_acc.abs() > config.approach_deceleration;

        let votes = scale_votes + if zero_cross { config.zero_cross_votes } else { 0 };
        let max_votes = config.peak_scales.len() as u32 + config.zero_cross_votes;
        let confidence = votes as f64 / max_votes as f64;
        let is_peak = votes >= config.peak_vote_threshold;

        PeakEvent {
            kind: if is_peak { self.classify_kind() } else { PeakKind::None },
            confidence,
            is_peak,
            approaching,
            detection_frame: is_peak.then_some(frame_id),
        }
    }

    /// Compares the second newest sample with the two before it and the newest one.
    fn classify_kind(&self) -> PeakKind {
        let p = |back| self.positions.from_back(back);
        match (p(3), p(2), p(1), p(0)) {
            (Some(b1), Some(b2), Some(centre), Some(after)) => {
                let before = (b1 + b2) / 2.0;
                if centre > before && centre > after {
                    PeakKind::Max
                } else if centre < before && centre < after {
                    PeakKind::Min
                } else {
                    PeakKind::None
                }
            }
            _ => PeakKind::None,
        }
    }
}

/// True when the centre of the newest `scale` samples is strictly above, or
/// strictly below, every other sample of that sub-window.
fn is_extremum_at_scale(positions: &RollingWindow, scale: usize) -> bool {
    let n = positions.len();
    if scale < 3 || n < scale {
        return false;
    }
    let start = n - scale;
    let half = scale / 2;
    let centre = match positions.get(start + half) {
        Some(c) => c,
        None => return false,
    };

    let mut is_max = true;
    let mut is_min = true;
    for (i, val) in positions.iter().skip(start).enumerate() {
        if i == half {
            continue;
        }
        if val >= centre {
            is_max = false;
        }
        if val <= centre {
            is_min = false;
        }
    }
    is_max || is_min
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(detector: &mut PeakDetector, samples: &[(f64, f64, f64)]) -> PeakEvent {
        let config = TrackerConfig::default();
        let mut last = PeakEvent::default();
        for (i, &(p, v, a)) in samples.iter().enumerate() {
            last = detector.update(p, v, a, i as u64, &config);
        }
        last
    }

    #[test]
    fn test_needs_minimum_samples() {
        let config = TrackerConfig::default();
        let mut detector = PeakDetector::new(&config);
        let event = run(&mut detector, &[(100.0, 0.0, 0.0); 6]);
        assert_eq!(event, PeakEvent::default());
    }

    #[test]
    fn test_extremum_at_scale() {
        let mut window = RollingWindow::new(15);
        for p in [1.0, 2.0, 3.0, 5.0, 3.0, 2.0, 1.0] {
            window.push(p);
        }
        // centre of the last 3 is 2.0, last 7 is 5.0
        assert!(!is_extremum_at_scale(&window, 3));
        assert!(is_extremum_at_scale(&window, 7));
        // plateaus are not strict extrema
        let mut flat = RollingWindow::new(15);
        for p in [1.0, 3.0, 3.0] {
            flat.push(p);
        }
        assert!(!is_extremum_at_scale(&flat, 3));
    }

    #[test]
    fn test_detects_maximum() {
        let config = TrackerConfig::default();
        let mut detector = PeakDetector::new(&config);
        let event = run(
            &mut detector,
            &[
                (900.0, 60.0, 0.0),
                (910.0, 60.0, 0.0),
                (920.0, 60.0, 0.0),
                (930.0, 60.0, 0.0),
                (938.0, 48.0, -720.0),
                (944.0, 36.0, -720.0),
                (948.0, 24.0, -720.0),
                (950.0, 12.0, -720.0),
                (948.0, -12.0, -1000.0),
            ],
        );
        // velocity flipped sign (2 votes) and 950 is a 3-scale max (1 vote)
        assert!(event.is_peak);
        assert_eq!(event.kind, PeakKind::Max);
        assert!((event.confidence - 0.6).abs() < 1e-12);
        assert_eq!(event.detection_frame, Some(8));
    }

    #[test]
    fn test_detects_minimum() {
        let config = TrackerConfig::default();
        let mut detector = PeakDetector::new(&config);
        let event = run(
            &mut detector,
            &[
                (1000.0, -60.0, 0.0),
                (990.0, -60.0, 0.0),
                (980.0, -60.0, 0.0),
                (970.0, -60.0, 0.0),
                (962.0, -48.0, 720.0),
                (956.0, -36.0, 720.0),
                (952.0, -24.0, 720.0),
                (950.0, -12.0, 720.0),
                (952.0, 12.0, 1000.0),
            ],
        );
        assert!(event.is_peak);
        assert_eq!(event.kind, PeakKind::Min);
    }

    #[test]
    fn test_monotonic_ramp_is_not_a_peak() {
        let config = TrackerConfig::default();
        let mut detector = PeakDetector::new(&config);
        let samples: Vec<(f64, f64, f64)> =
            (0..12).map(|i| (500.0 + 10.0 * i as f64, 600.0, 0.0)).collect();
        let event = run(&mut detector, &samples);
        assert!(!event.is_peak);
        assert_eq!(event.kind, PeakKind::None);
        assert_eq!(event.confidence, 0.0);
        assert_eq!(event.detection_frame, None);
    }

    #[test]
    fn test_approaching_turn() {
        let config = TrackerConfig::default();
        let mut detector = PeakDetector::new(&config);
        let samples: Vec<(f64, f64, f64)> = [80.0, 70.0, 60.0, 50.0, 40.0, 30.0, 25.0, 18.0]
            .iter()
            .enumerate()
            .map(|(i, &v)| (500.0 + 5.0 * i as f64, v, -420.0))
            .collect();
        let event = run(&mut detector, &samples);
        assert!(event.approaching);
        assert!(!event.is_peak);
    }

    #[test]
    fn test_unconfirmed_vote_share_is_reported() {
        let config = TrackerConfig::default();
        let mut detector = PeakDetector::new(&config);
        // only the 3-sample scale sees a turn, velocity never crosses zero
        let positions = [5.0, 5.0, 5.0, 8.0, 10.0, 12.0, 11.0];
        let velocities = [60.0, 60.0, 60.0, 60.0, 60.0, 30.0, 15.0];
        let samples: Vec<(f64, f64, f64)> = positions
            .iter()
            .zip(velocities.iter())
            .map(|(&p, &v)| (p, v, -900.0))
            .collect();
        let event = run(&mut detector, &samples);
        assert!(!event.is_peak);
        assert!(event.approaching);
        assert_eq!(event.kind, PeakKind::None);
        assert_eq!(event.detection_frame, None);
        assert_eq!(event.confidence, 1.0 / 5.0);
    }

    #[test]
    fn test_reset() {
        let config = TrackerConfig::default();
        let mut detector = PeakDetector::new(&config);
        run(&mut detector, &[(100.0, 0.0, 0.0); 10]);
        detector.reset();
        assert_eq!(detector.current(), PeakEvent::default());
    }
}
