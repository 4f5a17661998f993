/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use log::{error, info, warn};
use thiserror::Error;

use crate::config::BackendConfig;
use crate::metric::{Metric, Percentile};
use crate::registry::MetricRegistry;
use crate::types::Value;

mod carbon;
pub use carbon::CarbonBackend;

mod console;
pub use console::ConsoleBackend;

mod broker;
pub use broker::{BrokerBackend, BrokerTransport, TcpLineTransport, TransportError};

// granularity of the shutdown poll while waiting for the next tick
const TICK_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum BackendError {
    /// logged and retried on the next tick
    #[error("transient I/O error: {0}")]
    Io(#[from] io::Error),
    /// the backend shuts down in an orderly fashion, others are unaffected
    #[error("fatal transport error: {0}")]
    Fatal(anyhow::Error),
}

/// A flush target bound to one registry shard.
///
/// The dispatch framework drives these; a backend never calls back into the
/// core.
pub trait Backend: Send {
    fn name(&self) -> &str;

    /// Flush tick interval.
    fn sample_freq(&self) -> Duration;

    fn connect(&mut self) -> bool;

    fn is_connected(&self) -> bool;

    /// Take one derived (key, value) pair extracted from `metric`.
    fn sample(&mut self, metric: &Metric, key: &str, value: Value);

    /// Transmit everything buffered during this tick.
    fn flush(&mut self) -> Result<(), BackendError>;

    /// Orderly shutdown: drain in-flight work with a bounded wait.
    fn shutdown(&mut self) {}
}

/// Construct a backend from its opaque configuration mapping.
pub fn build(config: &BackendConfig) -> anyhow::Result<Box<dyn Backend>> {
    match config.r#type.as_str() {
        "carbon" => Ok(Box::new(CarbonBackend::parse(config)?)),
        "console" => Ok(Box::new(ConsoleBackend::parse(config)?)),
        "broker" => Ok(Box::new(BrokerBackend::parse(config)?)),
        t => Err(anyhow!("unsupported backend type {t}")),
    }
}

/// Owner of the backend flush threads.
pub struct BackendDispatch {
    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl BackendDispatch {
    /// Spawn one flush thread per backend. Backend `i` owns registry shard
    /// `i`; the registry must have been created with one shard per backend.
    pub fn spawn_all(
        backends: Vec<Box<dyn Backend>>,
        registry: &Arc<MetricRegistry>,
        percentiles: Arc<Vec<Percentile>>,
        shutdown: Arc<AtomicBool>,
    ) -> anyhow::Result<Self> {
        let mut threads = Vec::with_capacity(backends.len());
        for (shard, backend) in backends.into_iter().enumerate() {
            let registry = registry.clone();
            let percentiles = percentiles.clone();
            let shutdown = shutdown.clone();
            let handle = std::thread::Builder::new()
                .name(format!("flush-{shard}-{}", backend.name()))
                .spawn(move || flush_loop(backend, shard, registry, percentiles, shutdown))
                .map_err(|e| anyhow!("failed to spawn flush thread for shard {shard}: {e}"))?;
            threads.push(handle);
        }
        Ok(BackendDispatch { shutdown, threads })
    }

    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.threads {
            let _ = handle.join();
        }
    }
}

fn flush_loop(
    mut backend: Box<dyn Backend>,
    shard: usize,
    registry: Arc<MetricRegistry>,
    percentiles: Arc<Vec<Percentile>>,
    shutdown: Arc<AtomicBool>,
) {
    let interval = backend.sample_freq();
    let mut next_tick = Instant::now() + interval;

    info!(
        "backend {} started, shard {shard}, interval {}s",
        backend.name(),
        interval.as_secs_f64()
    );

    loop {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                backend.shutdown();
                info!("backend {} stopped", backend.name());
                return;
            }
            let now = Instant::now();
            if now >= next_tick {
                break;
            }
            std::thread::sleep(TICK_POLL.min(next_tick - now));
        }
        next_tick += interval;

        if !backend.is_connected() && !backend.connect() {
            warn!("backend {} not connected, skipping tick", backend.name());
            continue;
        }

        let mut interrupted = false;
        registry.walk_shard(shard, &mut |metric| {
            if shutdown.load(Ordering::Relaxed) {
                interrupted = true;
                return false;
            }
            metric.sample(&percentiles, &mut |m, key, value| {
                backend.sample(m, key, value);
            });
            true
        });

        match backend.flush() {
            Ok(()) => {}
            Err(BackendError::Io(e)) => {
                warn!("backend {} flush failed, will retry: {e}", backend.name());
            }
            Err(BackendError::Fatal(e)) => {
                error!("backend {} fatal error: {e}", backend.name());
                backend.shutdown();
                return;
            }
        }

        if interrupted {
            backend.shutdown();
            info!("backend {} stopped", backend.name());
            return;
        }
    }
}
