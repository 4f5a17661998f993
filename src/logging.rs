/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::anyhow;
use chrono::Local;
use flume::{Receiver, Sender};
use log::{Level, LevelFilter, Metadata, Record};

const CHANNEL_CAPACITY: usize = 4096;

struct LogValue {
    level: Level,
    target: String,
    message: String,
}

/// Async stderr logger: records go through a bounded channel to a detached
/// IO thread, and are dropped (and counted) rather than blocking the hot
/// path when the channel is full.
struct AsyncStdLogger {
    sender: Sender<LogValue>,
    level: LevelFilter,
    dropped: AtomicU64,
}

impl log::Log for AsyncStdLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let value = LogValue {
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        };
        if self.sender.try_send(value).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn flush(&self) {}
}

pub fn setup(verbose_level: u8) -> anyhow::Result<()> {
    let level = match verbose_level {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let (sender, receiver) = flume::bounded(CHANNEL_CAPACITY);
    std::thread::Builder::new()
        .name("log-io".to_string())
        .spawn(move || io_thread(receiver))
        .map_err(|e| anyhow!("failed to spawn log io thread: {e}"))?;

    log::set_boxed_logger(Box::new(AsyncStdLogger {
        sender,
        level,
        dropped: AtomicU64::new(0),
    }))
    .map_err(|e| anyhow!("failed to install logger: {e}"))?;
    log::set_max_level(level);
    Ok(())
}

fn io_thread(receiver: Receiver<LogValue>) {
    let mut stderr = io::stderr();
    let mut buf: Vec<u8> = Vec::with_capacity(1024);

    while let Ok(v) = receiver.recv() {
        buf.clear();
        let _ = write_record(&mut buf, &v);

        while let Ok(v) = receiver.try_recv() {
            let _ = write_record(&mut buf, &v);
        }

        let _ = stderr.write_all(&buf);
        let _ = stderr.flush();
    }
}

fn write_record<IO: Write>(io: &mut IO, v: &LogValue) -> io::Result<()> {
    let datetime = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f");
    writeln!(io, "{datetime} {} {}: {}", v.level, v.target, v.message)
}
