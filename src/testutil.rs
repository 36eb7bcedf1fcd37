//! Synthetic gaze traces shared by the unit tests.

use std::f64::consts::PI;

/// `frames` samples of `centre + amplitude·sin(2π·freq·t)` at spacing `dt`.
pub fn sinusoid(centre: f64, amplitude: f64, freq: f64, dt: f64, frames: usize) -> Vec<f64> {
    (0..frames)
        .map(|i| centre + amplitude * (2.0 * PI * freq * i as f64 * dt).sin())
        .collect()
}

/// Fixation at `from`, a linear ramp over `ramp_frames`, then fixation at `to`.
pub fn saccade(from: f64, to: f64, hold_frames: usize, ramp_frames: usize) -> Vec<f64> {
    let mut trace = vec![from; hold_frames];
    for k in 1..=ramp_frames {
        trace.push(from + (to - from) * k as f64 / ramp_frames as f64);
    }
    trace.extend(std::iter::repeat(to).take(hold_frames));
    trace
}
