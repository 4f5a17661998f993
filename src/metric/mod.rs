/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::sync::Mutex;

use crate::tags::TagSet;
use crate::types::{MetricType, SampleMods, Value};

mod state;
pub use state::{AtomicMetricState, MetricState};

mod histogram;
pub use histogram::{HistoSnapshot, HistoSummary, Percentile};

enum Payload {
    Gauge { value: Value },
    Meter { value: Value },
    Counter { value: Value, previous: Value },
    Histo(HistoSummary),
}

impl Payload {
    fn new(r#type: MetricType) -> Self {
        match r#type {
            MetricType::Gauge => Payload::Gauge { value: 0.0 },
            MetricType::Meter | MetricType::InternalStats => Payload::Meter { value: 0.0 },
            MetricType::Counter => Payload::Counter {
                value: 0.0,
                previous: 0.0,
            },
            MetricType::Histogram | MetricType::Timer => Payload::Histo(HistoSummary::default()),
        }
    }
}

/// One aggregation slot.
///
/// The payload sits behind a per-metric mutex so concurrent samples from
/// different ingestion threads serialize without contending across unrelated
/// metrics. The state field is independent of that lock and is only touched
/// through atomic operations, so a flush pass never waits on an ingestion
/// thread to decide eligibility.
pub struct Metric {
    key: Box<str>,
    name_len: usize,
    r#type: MetricType,
    tags: Option<Arc<TagSet>>,
    state: AtomicMetricState,
    payload: Mutex<Payload>,
}

impl Metric {
    pub fn new(
        key: &str,
        name_len: usize,
        r#type: MetricType,
        tags: Option<Arc<TagSet>>,
        disabled: bool,
    ) -> Self {
        let initial = if disabled {
            MetricState::Disabled
        } else {
            MetricState::Inactive
        };
        Metric {
            key: Box::from(key),
            name_len,
            r#type,
            tags,
            state: AtomicMetricState::new(initial),
            payload: Mutex::new(Payload::new(r#type)),
        }
    }

    /// The full metric key, tag text included.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The metric name part of the key, without tag text.
    #[inline]
    pub fn name(&self) -> &str {
        &self.key[..self.name_len]
    }

    #[inline]
    pub fn metric_type(&self) -> MetricType {
        self.r#type
    }

    #[inline]
    pub fn tag_set(&self) -> Option<&Arc<TagSet>> {
        self.tags.as_ref()
    }

    #[inline]
    pub fn state(&self) -> MetricState {
        self.state.load()
    }

    /// Administrative enable/disable, never driven by the hot path.
    pub fn set_disabled(&self, disabled: bool) {
        if disabled {
            self.state.store(MetricState::Disabled);
        } else {
            self.state.compare_and_swap(MetricState::Disabled, MetricState::Inactive);
        }
    }

    /// Fold one sample into the payload.
    ///
    /// The inactive-to-active swap happens while the payload lock is still
    /// held, so a combine racing a flush pass always leaves the metric active
    /// for the next pass.
    pub fn record(&self, value: Value, sample_rate: Value, mods: SampleMods) {
        if self.state.load() == MetricState::Disabled {
            return;
        }

        let freq = if sample_rate > 0.0 && sample_rate < 1.0 {
            1.0 / sample_rate
        } else {
            1.0
        };

        let mut payload = self.payload.lock().unwrap();
        match &mut *payload {
            Payload::Gauge { value: current } => {
                if mods.relative {
                    *current += value;
                } else {
                    *current = value;
                }
            }
            Payload::Meter { value: current } => *current += value * freq,
            Payload::Counter { value: current, .. } => *current += value * freq,
            Payload::Histo(histo) => histo.push(value, freq),
        }
        self.state
            .compare_and_swap(MetricState::Inactive, MetricState::Active);
    }

    /// Flush pass entry point: extract and reset the current window, then
    /// invoke `cb` once per derived key.
    ///
    /// Skips metrics that are not active. Emission runs after the payload
    /// lock is released; only the extract-and-reset and the active-to-inactive
    /// swap happen under it.
    pub fn sample<F>(&self, percentiles: &[Percentile], cb: &mut F)
    where
        F: FnMut(&Metric, &str, Value),
    {
        if self.state.load() != MetricState::Active {
            return;
        }

        let extracted = {
            let mut payload = self.payload.lock().unwrap();
            let extracted = match &mut *payload {
                // gauges keep their value across flushes
                Payload::Gauge { value } => Extracted::Single(*value),
                Payload::Meter { value } => {
                    let v = *value;
                    *value = 0.0;
                    Extracted::Single(v)
                }
                Payload::Counter { value, previous } => {
                    let delta = *value - *previous;
                    *previous = *value;
                    Extracted::Single(delta)
                }
                Payload::Histo(histo) => match histo.snapshot_reset() {
                    Some(snapshot) => Extracted::Summary(snapshot),
                    None => Extracted::Nothing,
                },
            };
            self.state
                .compare_and_swap(MetricState::Active, MetricState::Inactive);
            extracted
        };

        match extracted {
            Extracted::Nothing => {}
            Extracted::Single(value) => cb(self, self.name(), value),
            Extracted::Summary(snapshot) => self.emit_summary(&snapshot, percentiles, cb),
        }
    }

    fn emit_summary<F>(&self, snapshot: &HistoSnapshot, percentiles: &[Percentile], cb: &mut F)
    where
        F: FnMut(&Metric, &str, Value),
    {
        let mut key = String::with_capacity(self.name_len + 8);
        key.push_str(self.name());
        let base = key.len();

        let mut emit = |suffix: &str, value: Value, cb: &mut F| {
            key.truncate(base);
            key.push('.');
            key.push_str(suffix);
            cb(self, &key, value);
        };

        emit("count", snapshot.count, cb);
        emit("sum", snapshot.sum, cb);
        emit("mean", snapshot.mean, cb);
        emit("min", snapshot.min, cb);
        emit("max", snapshot.max, cb);
        emit("median", snapshot.median(), cb);
        for p in percentiles {
            emit(p.suffix(), snapshot.value_at(p.rank()), cb);
        }
    }
}

enum Extracted {
    Nothing,
    Single(Value),
    Summary(HistoSnapshot),
}
