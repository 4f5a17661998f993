/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, anyhow};
use serde_json::Map;

use crate::metric::Percentile;

pub(crate) mod value;

const DEFAULT_LISTEN: &str = "127.0.0.1:8125";
const DEFAULT_WORKERS: usize = 4;

#[derive(Clone, Debug)]
pub struct StatsdConfig {
    pub listen: SocketAddr,
    pub workers: usize,
}

impl Default for StatsdConfig {
    fn default() -> Self {
        StatsdConfig {
            listen: DEFAULT_LISTEN.parse().unwrap(),
            workers: DEFAULT_WORKERS,
        }
    }
}

impl StatsdConfig {
    fn parse(map: &Map<String, serde_json::Value>) -> anyhow::Result<Self> {
        let mut config = StatsdConfig::default();
        for (k, v) in map {
            match k.as_str() {
                "listen" => {
                    let s = value::as_string(v)?;
                    config.listen = s
                        .parse()
                        .map_err(|e| anyhow!("invalid listen address {s}: {e}"))?;
                }
                "workers" => {
                    config.workers = value::as_usize(v)?;
                    if config.workers == 0 {
                        return Err(anyhow!("workers must be at least 1"));
                    }
                }
                _ => return Err(anyhow!("invalid key {k} in statsd config")),
            }
        }
        Ok(config)
    }
}

/// One backend entry: its type, flush interval, and an opaque option map the
/// core passes through to the backend constructor.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub r#type: String,
    pub frequency: Duration,
    pub options: Map<String, serde_json::Value>,
}

impl BackendConfig {
    fn parse(map: &Map<String, serde_json::Value>) -> anyhow::Result<Self> {
        let mut r#type = None;
        let mut frequency = None;
        let mut options = Map::new();
        for (k, v) in map {
            match k.as_str() {
                "type" => r#type = Some(value::as_string(v)?),
                "frequency" => {
                    let seconds = value::as_u64(v)?;
                    if seconds == 0 {
                        return Err(anyhow!("frequency must be at least 1 second"));
                    }
                    frequency = Some(Duration::from_secs(seconds));
                }
                _ => {
                    options.insert(k.clone(), v.clone());
                }
            }
        }
        Ok(BackendConfig {
            r#type: r#type.ok_or_else(|| anyhow!("type is not set in backend config"))?,
            frequency: frequency
                .ok_or_else(|| anyhow!("frequency is not set in backend config"))?,
            options,
        })
    }
}

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub statsd: StatsdConfig,
    pub backends: Vec<BackendConfig>,
    pub percentiles: Vec<Percentile>,
    pub blacklist: Vec<String>,
    /// prefix under which self-monitoring metrics are recorded, if any
    pub internal_stats: Option<String>,
}

impl DaemonConfig {
    fn parse(map: &Map<String, serde_json::Value>) -> anyhow::Result<Self> {
        let mut config = DaemonConfig {
            statsd: StatsdConfig::default(),
            backends: Vec::new(),
            percentiles: Percentile::default_set(),
            blacklist: Vec::new(),
            internal_stats: None,
        };

        for (k, v) in map {
            match k.as_str() {
                "statsd" => {
                    let map = value::as_map(v)?;
                    config.statsd = StatsdConfig::parse(map).context("invalid statsd config")?;
                }
                "backends" => {
                    for (i, entry) in value::as_array(v)?.iter().enumerate() {
                        let map = value::as_map(entry)?;
                        let backend = BackendConfig::parse(map)
                            .context(format!("invalid backend config #{i}"))?;
                        config.backends.push(backend);
                    }
                }
                "percentiles" => {
                    let mut percentiles = Vec::new();
                    for entry in value::as_array(v)? {
                        percentiles.push(Percentile::new(value::as_f64(entry)?)?);
                    }
                    config.percentiles = percentiles;
                }
                "blacklist" => {
                    for entry in value::as_array(v)? {
                        config.blacklist.push(value::as_string(entry)?);
                    }
                }
                "internal_stats" => config.internal_stats = Some(value::as_string(v)?),
                _ => return Err(anyhow!("invalid key {k} in main config")),
            }
        }

        config.check()?;
        Ok(config)
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.backends.is_empty() {
            return Err(anyhow!("no backends configured"));
        }
        Ok(())
    }
}

pub fn load(path: &Path) -> anyhow::Result<DaemonConfig> {
    let data = std::fs::read_to_string(path)
        .context(format!("failed to read config file {}", path.display()))?;
    load_str(&data)
}

pub fn load_str(data: &str) -> anyhow::Result<DaemonConfig> {
    let doc: serde_json::Value =
        serde_json::from_str(data).context("failed to parse config as json")?;
    let map = doc
        .as_object()
        .ok_or_else(|| anyhow!("json config root should be a map"))?;
    DaemonConfig::parse(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config() {
        let config = load_str(
            r#"{
                "statsd": {"listen": "0.0.0.0:9125", "workers": 2},
                "backends": [
                    {"type": "carbon", "frequency": 10, "address": "graphite:2003"},
                    {"type": "broker", "frequency": 30,
                     "endpoint": "broker:4150", "topic": "metrics"}
                ],
                "percentiles": [0.5, 0.99],
                "blacklist": ["noisy.metric"],
                "internal_stats": "tallyd"
            }"#,
        )
        .unwrap();

        assert_eq!(config.statsd.listen.port(), 9125);
        assert_eq!(config.statsd.workers, 2);
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].r#type, "carbon");
        assert_eq!(config.backends[0].frequency, Duration::from_secs(10));
        assert_eq!(
            config.backends[0].options.get("address").unwrap(),
            "graphite:2003"
        );
        assert_eq!(config.percentiles.len(), 2);
        assert_eq!(config.percentiles[1].suffix(), "p99");
        assert_eq!(config.blacklist, vec!["noisy.metric".to_string()]);
        assert_eq!(config.internal_stats.as_deref(), Some("tallyd"));
    }

    #[test]
    fn defaults_apply() {
        let config = load_str(
            r#"{"backends": [{"type": "console", "frequency": 5}]}"#,
        )
        .unwrap();
        assert_eq!(config.statsd.listen.port(), 8125);
        assert_eq!(config.statsd.workers, DEFAULT_WORKERS);
        assert_eq!(config.percentiles, Percentile::default_set());
        assert!(config.internal_stats.is_none());
    }

    #[test]
    fn rejects_bad_configs() {
        assert!(load_str("[]").is_err());
        assert!(load_str("{}").is_err()); // no backends
        assert!(load_str(r#"{"backends": [{"type": "carbon"}]}"#).is_err()); // no frequency
        assert!(load_str(r#"{"bogus": 1, "backends": [{"type": "console", "frequency": 5}]}"#).is_err());
        assert!(
            load_str(r#"{"statsd": {"workers": 0}, "backends": [{"type": "console", "frequency": 5}]}"#)
                .is_err()
        );
    }
}
