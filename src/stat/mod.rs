/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use crate::metric::Metric;
use crate::registry::MetricRegistry;
use crate::types::{MetricType, SampleMods};

/// Daemon self-monitoring counters, recorded as internal-stats metrics so
/// they travel the normal aggregation and flush pipeline.
pub struct InternalStats {
    received: Arc<Metric>,
    errors: Arc<Metric>,
}

impl InternalStats {
    pub fn new(registry: &MetricRegistry, prefix: &str) -> Self {
        let received =
            registry.find_or_create(&format!("{prefix}.metrics"), MetricType::InternalStats);
        let errors =
            registry.find_or_create(&format!("{prefix}.errors"), MetricType::InternalStats);
        InternalStats { received, errors }
    }

    pub fn add_received(&self, n: u64) {
        if n > 0 {
            self.received.record(n as f64, 1.0, SampleMods::default());
        }
    }

    pub fn add_errors(&self, n: u64) {
        if n > 0 {
            self.errors.record(n as f64, 1.0, SampleMods::default());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_flow_through_flush() {
        let registry = MetricRegistry::new(1);
        let stats = InternalStats::new(&registry, "tallyd");
        stats.add_received(10);
        stats.add_received(5);
        stats.add_errors(1);
        stats.add_errors(0);

        let mut out = Vec::new();
        registry.walk_shard(0, &mut |metric| {
            metric.sample(&[], &mut |_, key, value| {
                out.push((key.to_string(), value));
            });
            true
        });
        out.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            out,
            vec![
                ("tallyd.errors".to_string(), 1.0),
                ("tallyd.metrics".to_string(), 15.0)
            ]
        );

        // internal stats reset like meters
        stats.add_received(2);
        let mut out = Vec::new();
        registry.walk_shard(0, &mut |metric| {
            metric.sample(&[], &mut |_, key, value| {
                out.push((key.to_string(), value));
            });
            true
        });
        assert_eq!(out, vec![("tallyd.metrics".to_string(), 2.0)]);
    }
}
