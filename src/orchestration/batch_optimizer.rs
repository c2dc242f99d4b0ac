// Sub-batch sizing
//
// Larger workloads get larger sub-batches so per-call overhead is amortized;
// a busy dispatcher gets smaller ones so calls finish and free slots sooner.

use serde::Serialize;
use std::ops::Range;

use crate::core::config::BatchConfig;

/// How loaded the dispatcher currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadHint {
    Idle,
    Normal,
    Busy,
    Constrained,
}

impl LoadHint {
    pub fn factor(self) -> f64 {
        match self {
            LoadHint::Idle | LoadHint::Normal => 1.0,
            LoadHint::Busy => 0.75,
            LoadHint::Constrained => 0.5,
        }
    }

    /// Derive the hint from free call slots
    pub fn from_permits(available: usize, capacity: usize) -> Self {
        if capacity == 0 {
            return LoadHint::Constrained;
        }
        let free = available as f64 / capacity as f64;
        if free >= 0.75 {
            LoadHint::Idle
        } else if free >= 0.5 {
            LoadHint::Normal
        } else if free >= 0.25 {
            LoadHint::Busy
        } else {
            LoadHint::Constrained
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptimizer {
    min_batch: usize,
    max_batch: usize,
    target_calls: usize,
}

impl BatchOptimizer {
    pub fn new(config: &BatchConfig) -> Self {
        Self {
            min_batch: config.min_batch.max(1),
            max_batch: config.max_batch.max(1),
            target_calls: config.target_calls.max(1),
        }
    }

    /// Size in `[min_batch, min(max_batch, provider_max_batch)]`. When the
    /// provider ceiling is below `min_batch` the ceiling wins.
    pub fn compute_batch_size(&self, total_items: usize, provider_max_batch: usize, load: LoadHint) -> usize {
        let ceiling = self.max_batch.min(provider_max_batch).max(1);
        let floor = self.min_batch.min(ceiling);

        let raw = total_items.div_ceil(self.target_calls);
        let scaled = (raw as f64 * load.factor()).ceil() as usize;
        scaled.clamp(floor, ceiling)
    }

    /// Consecutive index ranges of at most `size` covering `0..total`
    pub fn chunk(total: usize, size: usize) -> Vec<Range<usize>> {
        let size = size.max(1);
        (0..total)
            .step_by(size)
            .map(|start| start..(start + size).min(total))
            .collect()
    }
}

impl Default for BatchOptimizer {
    fn default() -> Self {
        Self {
            min_batch: 3,
            max_batch: 25,
            target_calls: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let opt = BatchOptimizer::default();
        assert_eq!(opt.compute_batch_size(1, 25, LoadHint::Normal), 3);
        assert_eq!(opt.compute_batch_size(40, 25, LoadHint::Normal), 10);
        assert_eq!(opt.compute_batch_size(1000, 25, LoadHint::Normal), 25);
        assert_eq!(opt.compute_batch_size(0, 25, LoadHint::Idle), 3);
    }

    #[test]
    fn test_provider_ceiling_wins() {
        let opt = BatchOptimizer::default();
        assert_eq!(opt.compute_batch_size(1000, 8, LoadHint::Normal), 8);
        assert_eq!(opt.compute_batch_size(1000, 2, LoadHint::Normal), 2);
        assert_eq!(opt.compute_batch_size(1, 2, LoadHint::Normal), 2);
    }

    #[test]
    fn test_monotonic_in_total() {
        let opt = BatchOptimizer::default();
        for load in [LoadHint::Idle, LoadHint::Busy, LoadHint::Constrained] {
            let mut prev = 0;
            for total in 0..200 {
                let size = opt.compute_batch_size(total, 15, load);
                assert!(size >= prev);
                assert!((3..=15).contains(&size));
                prev = size;
            }
        }
    }

    #[test]
    fn test_load_scales_down() {
        let opt = BatchOptimizer::default();
        assert_eq!(opt.compute_batch_size(80, 25, LoadHint::Normal), 20);
        assert_eq!(opt.compute_batch_size(80, 25, LoadHint::Busy), 15);
        assert_eq!(opt.compute_batch_size(80, 25, LoadHint::Constrained), 10);
    }

    #[test]
    fn test_hint_from_permits() {
        assert_eq!(LoadHint::from_permits(8, 8), LoadHint::Idle);
        assert_eq!(LoadHint::from_permits(4, 8), LoadHint::Normal);
        assert_eq!(LoadHint::from_permits(2, 8), LoadHint::Busy);
        assert_eq!(LoadHint::from_permits(1, 8), LoadHint::Constrained);
        assert_eq!(LoadHint::from_permits(0, 0), LoadHint::Constrained);
    }

    #[test]
    fn test_chunk() {
        assert_eq!(BatchOptimizer::chunk(7, 3), vec![0..3, 3..6, 6..7]);
        assert!(BatchOptimizer::chunk(0, 3).is_empty());
        assert_eq!(BatchOptimizer::chunk(2, 0), vec![0..1, 1..2]);
    }
}
