/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io::{self, Write};
use std::net::TcpStream;
use std::time::Duration;

use ahash::AHashMap;
use anyhow::anyhow;
use chrono::Utc;
use log::{debug, info, warn};
use thiserror::Error;

use super::{Backend, BackendError};
use crate::config::{BackendConfig, value};
use crate::metric::Metric;
use crate::types::Value;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TransportError {
    /// recoverable, the caller may retry on a later tick
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
    /// the transport declared itself unusable, the backend must shut down
    #[error("fatal transport fault: {0}")]
    Fatal(String),
}

/// Message transport seam for the broker backend. Wire-level details of any
/// particular broker client live behind this trait.
pub trait BrokerTransport: Send {
    fn connect(&mut self) -> bool;

    fn is_connected(&self) -> bool;

    fn send(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Drain in-flight work with a bounded wait.
    fn drain(&mut self);
}

/// Per-tag-set scratch buffer: a partially built structured record plus a
/// dirty flag, reused across ticks.
#[derive(Default)]
struct Document {
    map: serde_json::Map<String, serde_json::Value>,
    dirty: bool,
}

/// Document-style backend batching all key/value pairs that share a tag set
/// into one structured record per flush tick.
pub struct BrokerBackend {
    topic: String,
    frequency: Duration,
    transport: Box<dyn BrokerTransport>,
    // keyed by tag-set intern index; None collects untagged metrics
    documents: AHashMap<Option<u32>, Document>,
    bytes_sent: u64,
}

impl BrokerBackend {
    pub fn new(topic: String, frequency: Duration, transport: Box<dyn BrokerTransport>) -> Self {
        BrokerBackend {
            topic,
            frequency,
            transport,
            documents: AHashMap::new(),
            bytes_sent: 0,
        }
    }

    pub fn parse(config: &BackendConfig) -> anyhow::Result<Self> {
        let mut endpoint = None;
        let mut topic = None;
        for (k, v) in &config.options {
            match k.as_str() {
                "endpoint" => endpoint = Some(value::as_string(v)?),
                "topic" => topic = Some(value::as_string(v)?),
                _ => return Err(anyhow!("invalid key {k} in broker backend config")),
            }
        }
        let endpoint = endpoint.ok_or_else(|| anyhow!("endpoint is not set"))?;
        let topic = topic.ok_or_else(|| anyhow!("topic is not set"))?;
        Ok(BrokerBackend::new(
            topic,
            config.frequency,
            Box::new(TcpLineTransport::new(endpoint)),
        ))
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

impl Backend for BrokerBackend {
    fn name(&self) -> &str {
        "broker"
    }

    fn sample_freq(&self) -> Duration {
        self.frequency
    }

    fn connect(&mut self) -> bool {
        self.transport.connect()
    }

    fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn sample(&mut self, metric: &Metric, key: &str, value: Value) {
        let index = metric.tag_set().map(|t| t.index());
        let doc = self.documents.entry(index).or_default();

        if !doc.dirty
            && let Some(tags) = metric.tag_set()
        {
            // first write for this document in this tick, seed the tag pairs
            for tag in tags.tags() {
                doc.map.insert(
                    tag.key.clone(),
                    serde_json::Value::String(tag.value.clone()),
                );
            }
        }

        let Some(number) = serde_json::Number::from_f64(value) else {
            warn!("broker: dropping non-finite value for key {key}");
            return;
        };
        doc.map
            .insert(key.to_string(), serde_json::Value::Number(number));
        doc.dirty = true;
    }

    fn flush(&mut self) -> Result<(), BackendError> {
        let timestamp = Utc::now().timestamp_millis();

        for doc in self.documents.values_mut() {
            if !doc.dirty {
                continue;
            }
            doc.map.insert("@timestamp".to_string(), timestamp.into());
            let payload = serde_json::to_vec(&doc.map).map_err(io::Error::other)?;
            doc.map.clear();
            doc.dirty = false;

            match self.transport.send(&self.topic, &payload) {
                Ok(()) => self.bytes_sent += payload.len() as u64,
                Err(TransportError::Io(e)) => {
                    // this record is lost, later documents may still go out
                    warn!("broker: failed to enqueue record: {e}");
                }
                Err(TransportError::Fatal(reason)) => {
                    return Err(BackendError::Fatal(anyhow!(reason)));
                }
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        info!("broker: flushing outstanding messages");
        self.transport.drain();
        self.documents.clear();
    }
}

/// Newline-delimited record stream over TCP, the stand-in wire for a real
/// broker client.
pub struct TcpLineTransport {
    endpoint: String,
    stream: Option<TcpStream>,
}

impl TcpLineTransport {
    pub fn new(endpoint: String) -> Self {
        TcpLineTransport {
            endpoint,
            stream: None,
        }
    }
}

impl BrokerTransport for TcpLineTransport {
    fn connect(&mut self) -> bool {
        use std::net::ToSocketAddrs;

        let addrs = match self.endpoint.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!("broker: failed to resolve {}: {e}", self.endpoint);
                return false;
            }
        };
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    debug!("broker: connected to {addr}");
                    self.stream = Some(stream);
                    return true;
                }
                Err(e) => warn!("broker: failed to connect to {addr}: {e}"),
            }
        }
        false
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn send(&mut self, _topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        let Some(stream) = &mut self.stream else {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "not connected",
            )));
        };
        let r = stream
            .write_all(payload)
            .and_then(|_| stream.write_all(b"\n"));
        if let Err(e) = r {
            self.stream = None;
            return Err(TransportError::Io(e));
        }
        Ok(())
    }

    fn drain(&mut self) {
        if let Some(stream) = &mut self.stream {
            let _ = stream.flush();
        }
        self.stream = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::TagCache;
    use crate::types::MetricType;

    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MockState {
        sent: Vec<(String, Vec<u8>)>,
        fail_fatal: bool,
        drained: bool,
    }

    #[derive(Clone, Default)]
    struct MockTransport {
        state: Arc<Mutex<MockState>>,
    }

    impl BrokerTransport for MockTransport {
        fn connect(&mut self) -> bool {
            true
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn send(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_fatal {
                return Err(TransportError::Fatal("broker gone".to_string()));
            }
            state.sent.push((topic.to_string(), payload.to_vec()));
            Ok(())
        }

        fn drain(&mut self) {
            self.state.lock().unwrap().drained = true;
        }
    }

    fn backend_with_mock() -> (BrokerBackend, MockTransport) {
        let mock = MockTransport::default();
        let backend = BrokerBackend::new(
            "metrics".to_string(),
            Duration::from_secs(1),
            Box::new(mock.clone()),
        );
        (backend, mock)
    }

    fn sent_documents(mock: &MockTransport) -> Vec<serde_json::Value> {
        let state = mock.state.lock().unwrap();
        state
            .sent
            .iter()
            .map(|(_, payload)| serde_json::from_slice(payload).unwrap())
            .collect()
    }

    #[test]
    fn documents_grouped_by_tag_set() {
        let cache = TagCache::new();
        let tags = cache.get_or_create("host=a,dc=e");
        let m1 = Metric::new("api.reqs,host=a,dc=e", 8, MetricType::Meter, Some(tags.clone()), false);
        let m2 = Metric::new("api.errs,host=a,dc=e", 8, MetricType::Meter, Some(tags), false);
        let m3 = Metric::new("uptime", 6, MetricType::Gauge, None, false);

        let (mut backend, mock) = backend_with_mock();
        backend.sample(&m1, "api.reqs", 10.0);
        backend.sample(&m2, "api.errs", 2.0);
        backend.sample(&m3, "uptime", 99.0);
        backend.flush().unwrap();

        let docs = sent_documents(&mock);
        assert_eq!(docs.len(), 2);

        let tagged = docs
            .iter()
            .find(|d| d.get("host").is_some())
            .expect("tagged document");
        assert_eq!(tagged["host"], "a");
        assert_eq!(tagged["dc"], "e");
        assert_eq!(tagged["api.reqs"], 10.0);
        assert_eq!(tagged["api.errs"], 2.0);
        assert!(tagged.get("@timestamp").is_some());

        let untagged = docs
            .iter()
            .find(|d| d.get("host").is_none())
            .expect("untagged document");
        assert_eq!(untagged["uptime"], 99.0);
        assert!(untagged.get("@timestamp").is_some());
    }

    #[test]
    fn clean_documents_are_not_retransmitted() {
        let m = Metric::new("uptime", 6, MetricType::Gauge, None, false);
        let (mut backend, mock) = backend_with_mock();

        backend.sample(&m, "uptime", 1.0);
        backend.flush().unwrap();
        backend.flush().unwrap();

        let docs = sent_documents(&mock);
        assert_eq!(docs.len(), 1);

        // the scratch buffer is reused and reseeded on the next write
        backend.sample(&m, "uptime", 2.0);
        backend.flush().unwrap();
        let docs = sent_documents(&mock);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["uptime"], 2.0);
    }

    #[test]
    fn fatal_transport_fault_surfaces() {
        let m = Metric::new("uptime", 6, MetricType::Gauge, None, false);
        let (mut backend, mock) = backend_with_mock();
        mock.state.lock().unwrap().fail_fatal = true;

        backend.sample(&m, "uptime", 1.0);
        match backend.flush() {
            Err(BackendError::Fatal(_)) => {}
            r => panic!("expected fatal error, got {r:?}"),
        }

        // orderly shutdown drains the transport
        backend.shutdown();
        assert!(mock.state.lock().unwrap().drained);
    }
}
