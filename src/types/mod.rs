/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

/// Scalar type for sample values and aggregates.
pub type Value = f64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricType {
    /// last-write-wins value, optionally adjusted by relative samples
    Gauge,
    /// sum of incoming values, reset to zero on each flush
    Meter,
    /// monotonic value, the delta since the previous flush is emitted
    Counter,
    Histogram,
    Timer,
    /// daemon self-monitoring, aggregates like a meter
    InternalStats,
}

impl MetricType {
    /// Map a statsd wire type code to a metric type.
    pub fn from_statsd(code: &[u8]) -> Option<Self> {
        match code {
            b"g" => Some(MetricType::Gauge),
            b"c" => Some(MetricType::Meter),
            b"C" => Some(MetricType::Counter),
            b"h" => Some(MetricType::Histogram),
            b"ms" => Some(MetricType::Timer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Meter => "meter",
            MetricType::Counter => "counter",
            MetricType::Histogram => "histogram",
            MetricType::Timer => "timer",
            MetricType::InternalStats => "internal",
        }
    }
}

/// Modifier flags carried along with a single sample.
#[derive(Clone, Copy, Debug, Default)]
pub struct SampleMods {
    /// the sample adjusts the current gauge value instead of replacing it
    pub relative: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statsd_type_codes() {
        assert_eq!(MetricType::from_statsd(b"g"), Some(MetricType::Gauge));
        assert_eq!(MetricType::from_statsd(b"c"), Some(MetricType::Meter));
        assert_eq!(MetricType::from_statsd(b"C"), Some(MetricType::Counter));
        assert_eq!(MetricType::from_statsd(b"h"), Some(MetricType::Histogram));
        assert_eq!(MetricType::from_statsd(b"ms"), Some(MetricType::Timer));
        assert_eq!(MetricType::from_statsd(b"x"), None);
        assert_eq!(MetricType::from_statsd(b""), None);
    }
}
