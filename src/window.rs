use std::collections::VecDeque;

/// Fixed-capacity FIFO of recent samples with the summary statistics the
/// detectors need. Oldest sample is evicted on overflow.
#[derive(Clone, Debug)]
pub struct RollingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        RollingWindow {
            values: VecDeque::with_capacity(capacity + 1),
            capacity: capacity.max(1),
        }
    }

    /// Push a value, returning the evicted one if the window was full
    pub fn push(&mut self, value: f64) -> Option<f64> {
        self.values.push_back(value);
        if self.values.len() > self.capacity {
            self.values.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn last(&self) -> Option<f64> {
        self.values.back().copied()
    }

    pub fn first(&self) -> Option<f64> {
        self.values.front().copied()
    }

    /// Sample `back` positions from the newest (0 = newest)
    pub fn from_back(&self, back: usize) -> Option<f64> {
        let n = self.values.len();
        if back < n {
            self.values.get(n - 1 - back).copied()
        } else {
            None
        }
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + Clone + '_ {
        self.values.iter().copied()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population standard deviation
    pub fn std_dev(&self) -> f64 {
        variance(self.values.iter().copied()).sqrt()
    }

    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    /// max - min, 0 when empty
    pub fn range(&self) -> f64 {
        match (self.min(), self.max()) {
            (Some(lo), Some(hi)) => hi - lo,
            _ => 0.0,
        }
    }

    /// Largest absolute value, 0 when empty
    pub fn max_abs(&self) -> f64 {
        self.values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }
}

/// Population variance of a sample set, 0 for an empty set
pub fn variance(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let (count, sum) = values.clone().fold((0usize, 0.0), |(n, s), v| (n + 1, s + v));
    if count == 0 {
        return 0.0;
    }
    let mean = sum / count as f64;
    values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_single_value() {
        let mut window = RollingWindow::new(5);
        assert!(window.push(5.0).is_none());
        assert_eq!(window.last(), Some(5.0));
        assert_eq!(window.mean(), 5.0);
        assert_eq!(window.std_dev(), 0.0);
    }

    #[test]
    fn test_window_wrapping() {
        let mut window = RollingWindow::new(2);
        window.push(1.0);
        window.push(2.0);
        let evicted = window.push(3.0); // drops 1.0, keeps [2.0, 3.0]
        assert_eq!(evicted, Some(1.0));
        assert_eq!(window.len(), 2);
        assert_abs_diff_eq!(window.mean(), 2.5, epsilon = 1e-12);
        assert_eq!(window.first(), Some(2.0));
    }

    #[test]
    fn test_statistics() {
        let mut window = RollingWindow::new(10);
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            window.push(v);
        }
        assert_abs_diff_eq!(window.mean(), 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(window.std_dev(), 2.0, epsilon = 1e-12);
        assert_eq!(window.range(), 7.0);
        assert_eq!(window.from_back(0), Some(9.0));
        assert_eq!(window.from_back(2), Some(5.0));
        assert_eq!(window.from_back(8), None);
    }

    #[test]
    fn test_variance_of_mapped_window() {
        let mut window = RollingWindow::new(4);
        assert_eq!(variance(window.iter()), 0.0);
        for v in [-3.0, 1.0, -5.0, 3.0, 7.0] {
            window.push(v);
        }
        // |1|, |-5|, |3|, |7| once -3 is evicted
        assert_abs_diff_eq!(variance(window.iter().map(f64::abs)), 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(variance(window.iter()), 18.75, epsilon = 1e-12);
    }

    #[test]
    fn test_max_abs_and_empty() {
        let mut window = RollingWindow::new(4);
        assert_eq!(window.range(), 0.0);
        assert_eq!(window.max_abs(), 0.0);
        window.push(-12.0);
        window.push(3.0);
        assert_eq!(window.max_abs(), 12.0);
        window.clear();
        assert!(window.is_empty());
    }
}
