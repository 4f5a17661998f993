/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use log::{debug, warn};

use super::{Backend, BackendError};
use crate::config::{BackendConfig, value};
use crate::metric::Metric;
use crate::types::Value;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Graphite plaintext backend: `key value timestamp\n` over TCP.
///
/// Derived pairs are buffered during the walk and written in one batch at
/// flush time, stamped with the tick's wall clock.
pub struct CarbonBackend {
    address: String,
    frequency: Duration,
    stream: Option<TcpStream>,
    pending: Vec<(String, Value)>,
    bytes_sent: u64,
}

impl CarbonBackend {
    pub fn new(address: String, frequency: Duration) -> Self {
        CarbonBackend {
            address,
            frequency,
            stream: None,
            pending: Vec::new(),
            bytes_sent: 0,
        }
    }

    pub fn parse(config: &BackendConfig) -> anyhow::Result<Self> {
        let mut address = None;
        for (k, v) in &config.options {
            match k.as_str() {
                "address" => address = Some(value::as_string(v)?),
                _ => return Err(anyhow!("invalid key {k} in carbon backend config")),
            }
        }
        let address = address.ok_or_else(|| anyhow!("address is not set"))?;
        Ok(CarbonBackend::new(address, config.frequency))
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

impl Backend for CarbonBackend {
    fn name(&self) -> &str {
        "carbon"
    }

    fn sample_freq(&self) -> Duration {
        self.frequency
    }

    fn connect(&mut self) -> bool {
        use std::net::ToSocketAddrs;

        let addrs = match self.address.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!("carbon: failed to resolve {}: {e}", self.address);
                return false;
            }
        };
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    debug!("carbon: connected to {addr}");
                    self.stream = Some(stream);
                    return true;
                }
                Err(e) => warn!("carbon: failed to connect to {addr}: {e}"),
            }
        }
        false
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn sample(&mut self, _metric: &Metric, key: &str, value: Value) {
        self.pending.push((key.to_string(), value));
    }

    fn flush(&mut self) -> Result<(), BackendError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let timestamp = Utc::now().timestamp();
        let mut ts_buf = itoa::Buffer::new();
        let ts = ts_buf.format(timestamp);

        let mut buf = String::with_capacity(self.pending.len() * 48);
        let mut value_buf = ryu::Buffer::new();
        for (key, value) in self.pending.drain(..) {
            buf.push_str(&key);
            buf.push(' ');
            buf.push_str(value_buf.format(value));
            buf.push(' ');
            buf.push_str(ts);
            buf.push('\n');
        }

        let Some(stream) = &mut self.stream else {
            return Ok(());
        };
        match stream.write_all(buf.as_bytes()) {
            Ok(()) => {
                self.bytes_sent += buf.len() as u64;
                Ok(())
            }
            Err(e) => {
                // drop the connection, reconnect on the next tick
                self.stream = None;
                Err(BackendError::Io(e))
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(stream) = &mut self.stream {
            let _ = stream.flush();
        }
        self.stream = None;
    }
}
