//! Running loss accumulators, the validation history, and the early-stopping
//! rule.

use crate::model::LossComponents;

/// Per-interval sums of the three loss components.
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    sums: LossComponents,
    count: usize,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, losses: &LossComponents) {
        self.sums.total += losses.total;
        self.sums.mse += losses.mse;
        self.sums.log_loss += losses.log_loss;
        self.count += 1;
    }

    /// Steps accumulated since the last flush.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Report the interval and reset.
    ///
    /// Sums are averaged over `interval` only once `step > interval`; the
    /// first interval reports raw sums.
    pub fn flush(&mut self, step: usize, interval: usize) -> LossComponents {
        let mut report = self.sums;
        if step > interval && interval > 0 {
            let n = interval as f64;
            report.total /= n;
            report.mse /= n;
            report.log_loss /= n;
        }
        *self = Self::new();
        report
    }
}

/// Append-only validation total losses, one per reporting interval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationHistory {
    values: Vec<f64>,
}

impl ValidationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.values.push(value);
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// Mean of up to `patience` values immediately before the latest one.
    ///
    /// `None` when there is no prior value.
    pub fn trailing_mean(&self, patience: usize) -> Option<f64> {
        let end = self.values.len().checked_sub(1)?;
        let start = end.saturating_sub(patience);
        let window = &self.values[start..end];
        if window.is_empty() {
            return None;
        }
        Some(window.iter().sum::<f64>() / window.len() as f64)
    }
}

/// Whether the latest validation loss is worse than the trailing mean.
///
/// Never fires when disabled, at or before `min_steps`, or when there is no
/// prior validation value to compare against.
pub fn should_stop_early(
    history: &ValidationHistory,
    step: usize,
    enabled: bool,
    min_steps: usize,
    patience: usize,
) -> bool {
    if !enabled || step <= min_steps {
        return false;
    }
    match (history.last(), history.trailing_mean(patience)) {
        (Some(current), Some(mean)) => current > mean,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(values: &[f64]) -> ValidationHistory {
        let mut h = ValidationHistory::new();
        for &v in values {
            h.push(v);
        }
        h
    }

    #[test]
    fn test_first_interval_reports_raw_sums() {
        let mut stats = RunningStats::new();
        for _ in 0..4 {
            stats.update(&LossComponents::new(1.0, 0.5, 0.25));
        }
        let report = stats.flush(4, 4);
        assert_eq!(report, LossComponents::new(4.0, 2.0, 1.0));
        assert_eq!(stats.count(), 0, "flush must reset the accumulators");
    }

    #[test]
    fn test_later_intervals_report_means() {
        let mut stats = RunningStats::new();
        for _ in 0..4 {
            stats.update(&LossComponents::new(1.0, 0.5, 0.25));
        }
        let report = stats.flush(8, 4);
        assert_eq!(report, LossComponents::new(1.0, 0.5, 0.25));
    }

    #[test]
    fn test_trailing_mean_excludes_latest() {
        let h = history(&[1.0, 2.0, 3.0, 10.0]);
        assert_eq!(h.trailing_mean(2), Some(2.5));
        assert_eq!(h.trailing_mean(10), Some(2.0));
        assert_eq!(history(&[5.0]).trailing_mean(3), None);
        assert_eq!(ValidationHistory::new().trailing_mean(3), None);
    }

    #[test]
    fn test_never_stops_at_or_before_min_steps() {
        // Monotonically increasing validation loss: worst case for stopping.
        let mut h = ValidationHistory::new();
        for step in (40..=200).step_by(40) {
            h.push(step as f64);
            assert!(
                !should_stop_early(&h, step, true, 200, 200),
                "stopped at step {step} before min steps"
            );
        }
        h.push(240.0);
        assert!(should_stop_early(&h, 240, true, 200, 200));
    }

    #[test]
    fn test_disabled_never_stops() {
        let h = history(&[1.0, 2.0, 3.0]);
        assert!(!should_stop_early(&h, 1_000, false, 0, 2));
    }

    #[test]
    fn test_improving_loss_does_not_stop() {
        let h = history(&[3.0, 2.0, 1.0]);
        assert!(!should_stop_early(&h, 1_000, true, 0, 2));
        // Equal to the mean is not worse.
        let h = history(&[2.0, 2.0, 2.0]);
        assert!(!should_stop_early(&h, 1_000, true, 0, 2));
    }

    #[test]
    fn test_single_value_never_stops() {
        let h = history(&[100.0]);
        assert!(!should_stop_early(&h, 1_000, true, 0, 5));
    }
}
