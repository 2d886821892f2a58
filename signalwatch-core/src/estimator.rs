//! Sliding-window congestion estimation.

use std::collections::VecDeque;

use signalwatch_types::CongestionLevel;

use crate::assembler::Estimate;

/// Number of recent counts averaged when no capacity is configured.
pub const DEFAULT_HISTORY_CAPACITY: usize = 30;

/// Average vehicle counts at which congestion escalates.
///
/// `average < medium` is Low, `medium <= average < high` is Medium and
/// `average >= high` is High.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CongestionThresholds {
    pub medium: f64,
    pub high: f64,
}

impl Default for CongestionThresholds {
    fn default() -> Self {
        Self {
            medium: 5.0,
            high: 15.0,
        }
    }
}

impl CongestionThresholds {
    /// Classify an averaged vehicle count.
    pub fn classify(&self, average: f64) -> CongestionLevel {
        if average >= self.high {
            CongestionLevel::High
        } else if average >= self.medium {
            CongestionLevel::Medium
        } else {
            CongestionLevel::Low
        }
    }
}

/// Fixed-capacity FIFO of the most recent vehicle counts.
///
/// Keeps a running sum so the average is exact and O(1), computed over the
/// counts actually present (a half-filled window is not padded with zeros).
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    counts: VecDeque<u32>,
    capacity: usize,
    sum: u64,
}

impl HistoryWindow {
    /// Create an empty window. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            counts: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0,
        }
    }

    /// Append a count, returning the evicted oldest count if the window was full.
    pub fn push(&mut self, count: u32) -> Option<u32> {
        let evicted = if self.counts.len() == self.capacity {
            self.counts.pop_front()
        } else {
            None
        };
        if let Some(old) = evicted {
            self.sum -= u64::from(old);
        }
        self.counts.push_back(count);
        self.sum += u64::from(count);
        evicted
    }

    /// Mean of the current contents, or 0 before the first count.
    pub fn average(&self) -> f64 {
        if self.counts.is_empty() {
            return 0.0;
        }
        self.sum as f64 / self.counts.len() as f64
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Counts oldest first.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.counts.iter().copied()
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

/// Classifies congestion from the average of recent vehicle counts.
///
/// Averaging damps frame-to-frame detector noise: a single busy frame does
/// not flip the signal timing.
#[derive(Debug, Clone, Default)]
pub struct CongestionEstimator {
    window: HistoryWindow,
    thresholds: CongestionThresholds,
}

impl CongestionEstimator {
    pub fn new(capacity: usize, thresholds: CongestionThresholds) -> Self {
        Self {
            window: HistoryWindow::new(capacity),
            thresholds,
        }
    }

    /// Record one frame's count and return the resulting congestion level.
    pub fn update(&mut self, count: u32) -> CongestionLevel {
        self.window.push(count);
        self.level()
    }

    /// Current level without recording anything.
    pub fn level(&self) -> CongestionLevel {
        self.thresholds.classify(self.window.average())
    }

    pub fn average(&self) -> f64 {
        self.window.average()
    }

    /// Average and level together, as carried by a snapshot.
    pub fn estimate(&self) -> Estimate {
        Estimate {
            average: self.average(),
            level: self.level(),
        }
    }

    pub fn window(&self) -> &HistoryWindow {
        &self.window
    }

    pub fn thresholds(&self) -> &CongestionThresholds {
        &self.thresholds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_mean(counts: &[u32], capacity: usize) -> f64 {
        let tail = &counts[counts.len().saturating_sub(capacity)..];
        if tail.is_empty() {
            return 0.0;
        }
        let sum: u64 = tail.iter().map(|&c| u64::from(c)).sum();
        sum as f64 / tail.len() as f64
    }

    #[test]
    fn empty_window_averages_zero() {
        let estimator = CongestionEstimator::default();
        assert_eq!(estimator.average(), 0.0);
        assert_eq!(estimator.level(), CongestionLevel::Low);
        assert!(estimator.window().is_empty());
    }

    #[test]
    fn average_tracks_last_values_in_order() {
        // Deterministic but irregular sequence, long enough to wrap twice.
        let counts: Vec<u32> = (0..75u32).map(|i| (i * 37 + 11) % 29).collect();
        let mut estimator = CongestionEstimator::default();

        for n in 1..=counts.len() {
            estimator.update(counts[n - 1]);
            let expected = reference_mean(&counts[..n], DEFAULT_HISTORY_CAPACITY);
            assert_eq!(estimator.average(), expected, "after {} counts", n);
            assert!(estimator.window().len() <= DEFAULT_HISTORY_CAPACITY);
        }

        let window: Vec<u32> = estimator.window().iter().collect();
        assert_eq!(window, counts[counts.len() - 30..].to_vec());
    }

    #[test]
    fn partial_window_is_not_padded() {
        let mut estimator = CongestionEstimator::default();
        estimator.update(10);
        estimator.update(20);
        assert_eq!(estimator.average(), 15.0);
        assert_eq!(estimator.level(), CongestionLevel::High);
    }

    #[test]
    fn push_reports_eviction() {
        let mut window = HistoryWindow::new(2);
        assert_eq!(window.push(1), None);
        assert_eq!(window.push(2), None);
        assert_eq!(window.push(3), Some(1));
        assert_eq!(window.iter().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(window.average(), 2.5);
    }

    #[test]
    fn zero_capacity_keeps_latest_count() {
        let mut window = HistoryWindow::new(0);
        window.push(4);
        window.push(9);
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.average(), 9.0);
    }

    #[test]
    fn classification_boundaries_are_exact() {
        let t = CongestionThresholds::default();
        assert_eq!(t.classify(0.0), CongestionLevel::Low);
        assert_eq!(t.classify(4.999), CongestionLevel::Low);
        assert_eq!(t.classify(4.999_999_999), CongestionLevel::Low);
        assert_eq!(t.classify(5.0), CongestionLevel::Medium);
        assert_eq!(t.classify(14.999), CongestionLevel::Medium);
        assert_eq!(t.classify(14.999_999_999), CongestionLevel::Medium);
        assert_eq!(t.classify(15.0), CongestionLevel::High);
        assert_eq!(t.classify(250.0), CongestionLevel::High);
    }

    #[test]
    fn classifies_average_not_instantaneous_count() {
        let mut estimator = CongestionEstimator::default();
        for _ in 0..29 {
            estimator.update(0);
        }
        // One very busy frame barely moves a 30-frame average.
        assert_eq!(estimator.update(100), CongestionLevel::Low);
        assert!((estimator.average() - 100.0 / 30.0).abs() < 1e-12);
    }

    #[test]
    fn full_window_crosses_high_on_twenty_third_busy_frame() {
        let mut estimator = CongestionEstimator::default();
        for _ in 0..30 {
            estimator.update(0);
        }
        for i in 1..=26 {
            let level = estimator.update(20);
            if i < 23 {
                assert_ne!(level, CongestionLevel::High, "{} busy frames", i);
            } else {
                assert_eq!(level, CongestionLevel::High, "{} busy frames", i);
            }
        }
    }

    #[test]
    fn custom_thresholds() {
        let thresholds = CongestionThresholds {
            medium: 2.0,
            high: 4.0,
        };
        let mut estimator = CongestionEstimator::new(3, thresholds);
        assert_eq!(estimator.update(2), CongestionLevel::Medium);
        assert_eq!(estimator.update(6), CongestionLevel::High);
        assert_eq!(estimator.update(0), CongestionLevel::Medium);
        assert_eq!(estimator.update(0), CongestionLevel::Medium);
        assert_eq!(estimator.update(0), CongestionLevel::Low);
    }
}
