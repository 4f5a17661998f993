/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use anyhow::anyhow;

use super::{Backend, BackendError};
use crate::config::BackendConfig;
use crate::metric::Metric;
use crate::types::Value;

/// Debug backend printing every derived pair to stdout.
pub struct ConsoleBackend {
    frequency: Duration,
}

impl ConsoleBackend {
    pub fn new(frequency: Duration) -> Self {
        ConsoleBackend { frequency }
    }

    pub fn parse(config: &BackendConfig) -> anyhow::Result<Self> {
        if let Some(k) = config.options.keys().next() {
            return Err(anyhow!("invalid key {k} in console backend config"));
        }
        Ok(ConsoleBackend::new(config.frequency))
    }
}

impl Backend for ConsoleBackend {
    fn name(&self) -> &str {
        "console"
    }

    fn sample_freq(&self) -> Duration {
        self.frequency
    }

    fn connect(&mut self) -> bool {
        true
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn sample(&mut self, metric: &Metric, key: &str, value: Value) {
        match metric.tag_set() {
            Some(tags) => {
                let mut line = String::with_capacity(key.len() + 32);
                for tag in tags.tags() {
                    line.push_str(&tag.key);
                    line.push('=');
                    line.push_str(&tag.value);
                    line.push(' ');
                }
                println!("{key} {value} {line}");
            }
            None => println!("{key} {value}"),
        }
    }

    fn flush(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}
