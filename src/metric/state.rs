/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MetricState {
    /// the metric is ignored entirely
    Disabled = 0,
    /// aggregating, but not eligible for the next flush pass
    Inactive = 1,
    /// sampled during the current window, must be visited by the next flush
    Active = 2,
}

impl MetricState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => MetricState::Disabled,
            1 => MetricState::Inactive,
            _ => MetricState::Active,
        }
    }
}

/// Atomic metric state, independent from the payload lock.
///
/// Only `load`, `store` and `compare_and_swap` are exposed; every transition
/// is total and a failed swap means a benign race, not an error.
pub struct AtomicMetricState(AtomicU8);

impl AtomicMetricState {
    pub fn new(state: MetricState) -> Self {
        AtomicMetricState(AtomicU8::new(state as u8))
    }

    #[inline]
    pub fn load(&self) -> MetricState {
        MetricState::from_u8(self.0.load(Ordering::SeqCst))
    }

    #[inline]
    pub fn store(&self, state: MetricState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Set `new` only if the current state is `expected`. Returns whether the
    /// swap took place.
    #[inline]
    pub fn compare_and_swap(&self, expected: MetricState, new: MetricState) -> bool {
        self.0
            .compare_exchange(expected as u8, new as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_only_from_expected() {
        let state = AtomicMetricState::new(MetricState::Inactive);
        assert!(state.compare_and_swap(MetricState::Inactive, MetricState::Active));
        assert_eq!(state.load(), MetricState::Active);

        // a second activation attempt is a benign no-op
        assert!(!state.compare_and_swap(MetricState::Inactive, MetricState::Active));
        assert_eq!(state.load(), MetricState::Active);

        assert!(state.compare_and_swap(MetricState::Active, MetricState::Inactive));
        assert_eq!(state.load(), MetricState::Inactive);
    }

    #[test]
    fn disabled_is_sticky_against_activation() {
        let state = AtomicMetricState::new(MetricState::Disabled);
        assert!(!state.compare_and_swap(MetricState::Inactive, MetricState::Active));
        assert_eq!(state.load(), MetricState::Disabled);
    }
}
