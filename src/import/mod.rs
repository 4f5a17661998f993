/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, anyhow};
use log::{info, trace, warn};

use crate::config::StatsdConfig;
use crate::registry::MetricRegistry;
use crate::stat::InternalStats;

mod parser;
pub use parser::{ParsedSample, StatsdParseError, StatsdRecordVisitor};

// wake up periodically so the worker notices the shutdown flag
const RECV_TIMEOUT: Duration = Duration::from_millis(500);

const MAX_DATAGRAM: usize = 64 * 1024;

/// Spawn the fixed pool of statsd ingestion threads, all reading from one
/// bound UDP socket.
pub fn spawn(
    config: &StatsdConfig,
    registry: Arc<MetricRegistry>,
    stats: Option<Arc<InternalStats>>,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let socket = UdpSocket::bind(config.listen)
        .context(format!("failed to bind statsd socket on {}", config.listen))?;
    socket
        .set_read_timeout(Some(RECV_TIMEOUT))
        .context("failed to set socket read timeout")?;
    info!("statsd importer listening on {}", config.listen);

    let mut handles = Vec::with_capacity(config.workers);
    for id in 0..config.workers {
        let socket = socket
            .try_clone()
            .context(format!("failed to clone statsd socket for worker {id}"))?;
        let registry = registry.clone();
        let stats = stats.clone();
        let shutdown = shutdown.clone();
        let handle = std::thread::Builder::new()
            .name(format!("statsd-{id}"))
            .spawn(move || worker_loop(socket, registry, stats, shutdown))
            .map_err(|e| anyhow!("failed to spawn statsd worker {id}: {e}"))?;
        handles.push(handle);
    }
    Ok(handles)
}

fn worker_loop(
    socket: UdpSocket,
    registry: Arc<MetricRegistry>,
    stats: Option<Arc<InternalStats>>,
    shutdown: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    while !shutdown.load(Ordering::Relaxed) {
        let len = match socket.recv(&mut buf) {
            Ok(len) => len,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                warn!("statsd recv error: {e}");
                continue;
            }
        };

        let mut received = 0u64;
        let mut errors = 0u64;
        for r in StatsdRecordVisitor::new(&buf[..len]) {
            match r {
                Ok(sample) => {
                    let metric = registry.find_or_create(sample.key, sample.r#type);
                    metric.record(sample.value, sample.sample_rate, sample.mods);
                    received += 1;
                }
                Err(e) => {
                    // the rest of the datagram still parses
                    trace!("dropped malformed sample: {e}");
                    errors += 1;
                }
            }
        }

        if let Some(stats) = &stats {
            stats.add_received(received);
            stats.add_errors(errors);
        }
    }
}
