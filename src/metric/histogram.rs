/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use anyhow::anyhow;

use crate::types::Value;

/// A quantile point emitted at flush time, with its derived key suffix.
#[derive(Clone, Debug, PartialEq)]
pub struct Percentile {
    rank: f64,
    suffix: String,
}

impl Percentile {
    /// Build from a rank in `(0, 1)`, e.g. `0.95` becomes suffix `p95` and
    /// `0.999` becomes `p999`.
    pub fn new(rank: f64) -> anyhow::Result<Self> {
        if !(rank > 0.0 && rank < 1.0) {
            return Err(anyhow!("percentile rank {rank} is out of range (0, 1)"));
        }
        let mut label = format!("{}", rank * 100.0);
        label.retain(|c| c != '.');
        Ok(Percentile {
            rank,
            suffix: format!("p{label}"),
        })
    }

    pub fn default_set() -> Vec<Percentile> {
        [0.75, 0.95, 0.98, 0.99]
            .iter()
            .map(|r| Percentile::new(*r).unwrap())
            .collect()
    }

    #[inline]
    pub fn rank(&self) -> f64 {
        self.rank
    }

    #[inline]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

/// Running summary for histogram and timer metrics: count, sum, min, max and
/// a raw sample buffer sorted at flush time for quantile extraction.
#[derive(Default)]
pub struct HistoSummary {
    count: Value,
    sum: Value,
    min: Value,
    max: Value,
    samples: Vec<Value>,
}

/// One flush-interval's worth of summary values, extracted and detached from
/// the live record so emission can happen outside the payload lock.
pub struct HistoSnapshot {
    pub count: Value,
    pub sum: Value,
    pub mean: Value,
    pub min: Value,
    pub max: Value,
    samples: Vec<Value>,
}

impl HistoSummary {
    /// Fold one sample in, weighted by `freq` (`1/sample_rate` occurrences).
    pub fn push(&mut self, value: Value, freq: Value) {
        if self.samples.is_empty() {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += freq;
        self.sum += value * freq;
        self.samples.push(value);
    }

    /// Extract the current window and reset the accumulators. The sample
    /// buffer's allocation moves into the snapshot; the record keeps an empty
    /// buffer and is never freed.
    pub fn snapshot_reset(&mut self) -> Option<HistoSnapshot> {
        if self.samples.is_empty() {
            return None;
        }
        let mut samples = std::mem::take(&mut self.samples);
        samples.sort_unstable_by(|a, b| a.total_cmp(b));
        let snapshot = HistoSnapshot {
            count: self.count,
            sum: self.sum,
            mean: self.sum / self.count,
            min: self.min,
            max: self.max,
            samples,
        };
        self.count = 0.0;
        self.sum = 0.0;
        self.min = 0.0;
        self.max = 0.0;
        Some(snapshot)
    }
}

impl HistoSnapshot {
    pub fn median(&self) -> Value {
        self.value_at(0.5)
    }

    /// Value at the given rank over the sorted sample buffer.
    pub fn value_at(&self, rank: f64) -> Value {
        let n = self.samples.len();
        let pos = ((rank * n as f64).ceil() as usize).saturating_sub(1);
        self.samples[pos.min(n - 1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_suffixes() {
        assert_eq!(Percentile::new(0.75).unwrap().suffix(), "p75");
        assert_eq!(Percentile::new(0.95).unwrap().suffix(), "p95");
        assert_eq!(Percentile::new(0.999).unwrap().suffix(), "p999");
        assert!(Percentile::new(0.0).is_err());
        assert!(Percentile::new(1.0).is_err());
        assert!(Percentile::new(42.0).is_err());
    }

    #[test]
    fn summary_accumulates_and_resets() {
        let mut histo = HistoSummary::default();
        for v in [5.0, 1.0, 3.0] {
            histo.push(v, 1.0);
        }
        let snap = histo.snapshot_reset().unwrap();
        assert_eq!(snap.count, 3.0);
        assert_eq!(snap.sum, 9.0);
        assert_eq!(snap.mean, 3.0);
        assert_eq!(snap.min, 1.0);
        assert_eq!(snap.max, 5.0);
        assert_eq!(snap.median(), 3.0);

        // the window was reset, nothing left to extract
        assert!(histo.snapshot_reset().is_none());
    }

    #[test]
    fn sample_rate_weights_count_and_sum() {
        let mut histo = HistoSummary::default();
        // @0.5 means each observed value stands for two occurrences
        histo.push(10.0, 2.0);
        let snap = histo.snapshot_reset().unwrap();
        assert_eq!(snap.count, 2.0);
        assert_eq!(snap.sum, 20.0);
        assert_eq!(snap.mean, 10.0);
    }

    #[test]
    fn quantiles_over_sorted_buffer() {
        let mut histo = HistoSummary::default();
        for v in 1..=100 {
            histo.push(v as Value, 1.0);
        }
        let snap = histo.snapshot_reset().unwrap();
        assert_eq!(snap.value_at(0.5), 50.0);
        assert_eq!(snap.value_at(0.95), 95.0);
        assert_eq!(snap.value_at(0.99), 99.0);
        assert_eq!(snap.min, 1.0);
        assert_eq!(snap.max, 100.0);
    }
}
