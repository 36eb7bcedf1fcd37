// ledger.rs: prediction bookkeeping and rolling error statistics
//
// Predictions are stored against the frame they target and scored once that
// frame's measurement arrives. Error windows are O(1) amortized per sample:
// running sum for the mean, a monotonic deque for the windowed max and
// incremental bucket counts.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub predicted: f64,
    /// Time the prediction was made [s]
    pub timestamp: f64,
    /// |predicted − actual| once evaluated
    pub error: Option<f64>,
}

/// Capped map of predictions keyed by target frame id. The lowest id is
/// evicted on overflow.
#[derive(Clone, Debug)]
pub struct PredictionLedger {
    records: BTreeMap<u64, PredictionRecord>,
    capacity: usize,
}

impl PredictionLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Store (or replace) the prediction for `target_frame`.
    pub fn store_prediction(&mut self, target_frame: u64, predicted: f64, timestamp: f64) {
        self.records.insert(
            target_frame,
            PredictionRecord {
                predicted,
                timestamp,
                error: None,
            },
        );
        while self.records.len() > self.capacity {
            self.records.pop_first();
        }
    }

    /// Score the stored prediction for `target_frame` against `actual`.
    /// `None` when nothing was predicted for that frame.
    pub fn evaluate(&mut self, target_frame: u64, actual: f64) -> Option<f64> {
        let record = self.records.get_mut(&target_frame)?;
        let error = (record.predicted - actual).abs();
        record.error = Some(error);
        Some(error)
    }

    pub fn has_prediction(&self, target_frame: u64) -> bool {
        self.records.contains_key(&target_frame)
    }

    pub fn prediction_for(&self, target_frame: u64) -> Option<f64> {
        self.records.get(&target_frame).map(|r| r.predicted)
    }

    pub fn record(&self, target_frame: u64) -> Option<&PredictionRecord> {
        self.records.get(&target_frame)
    }

    /// Mean error over the `k` highest-id evaluated records, 0 when none.
    pub fn recent_average_error(&self, k: usize) -> f64 {
        let (sum, count) = self
            .records
            .values()
            .rev()
            .filter_map(|r| r.error)
            .take(k)
            .fold((0.0, 0usize), |(s, n), e| (s + e, n + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Share of the window under each accuracy threshold [%].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyBuckets {
    pub excellent: f64,
    pub good: f64,
    pub acceptable: f64,
}

/// Windowed error statistics.
#[derive(Clone, Debug)]
pub struct RollingErrorStats {
    window: VecDeque<f64>,
    capacity: usize,
    sum: f64,
    /// Non-increasing; front is the window max
    max_candidates: VecDeque<f64>,
    thresholds: [f64; 3],
    bucket_counts: [usize; 3],
    total: u64,
}

impl RollingErrorStats {
    pub fn new(capacity: usize, thresholds: [f64; 3]) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity + 1),
            capacity,
            sum: 0.0,
            max_candidates: VecDeque::new(),
            thresholds,
            bucket_counts: [0; 3],
            total: 0,
        }
    }

    pub fn push(&mut self, error: f64) {
        if !error.is_finite() {
            return;
        }
        self.window.push_back(error);
        self.sum += error;
        self.total += 1;
        while self.max_candidates.back().is_some_and(|&m| m < error) {
            self.max_candidates.pop_back();
        }
        self.max_candidates.push_back(error);
        for (count, &limit) in self.bucket_counts.iter_mut().zip(self.thresholds.iter()) {
            if error < limit {
                *count += 1;
            }
        }

        if self.window.len() > self.capacity {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
                if self.max_candidates.front() == Some(&old) {
                    self.max_candidates.pop_front();
                }
                for (count, &limit) in self.bucket_counts.iter_mut().zip(self.thresholds.iter()) {
                    if old < limit {
                        *count -= 1;
                    }
                }
            }
        }
    }

    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            // clamp away float residue from repeated add/subtract
            (self.sum / self.window.len() as f64).max(0.0)
        }
    }

    pub fn max(&self) -> f64 {
        self.max_candidates.front().copied().unwrap_or(0.0)
    }

    pub fn buckets(&self) -> AccuracyBuckets {
        if self.window.is_empty() {
            return AccuracyBuckets::default();
        }
        let pct = |count: usize| count as f64 * 100.0 / self.window.len() as f64;
        AccuracyBuckets {
            excellent: pct(self.bucket_counts[0]),
            good: pct(self.bucket_counts[1]),
            acceptable: pct(self.bucket_counts[2]),
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Samples pushed since the last reset, including evicted ones
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.max_candidates.clear();
        self.sum = 0.0;
        self.bucket_counts = [0; 3];
        self.total = 0;
    }
}

/// Filter-error and prediction-error windows side by side.
#[derive(Clone, Debug)]
pub struct PredictionStats {
    pub filter: RollingErrorStats,
    pub prediction: RollingErrorStats,
}

impl PredictionStats {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            filter: RollingErrorStats::new(config.stats_window, config.accuracy_thresholds),
            prediction: RollingErrorStats::new(config.stats_window, config.accuracy_thresholds),
        }
    }

    pub fn reset(&mut self) {
        self.filter.reset();
        self.prediction.reset();
    }
}
