/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use log::{debug, info};

use tallyd::backend::BackendDispatch;
use tallyd::registry::MetricRegistry;
use tallyd::stat::InternalStats;

fn main() -> anyhow::Result<()> {
    let Some(proc_args) =
        tallyd::opts::parse_clap().context("failed to parse command line options")?
    else {
        return Ok(());
    };

    tallyd::logging::setup(proc_args.verbose_level).context("failed to set up logging")?;

    let config = tallyd::config::load(&proc_args.config_file).context(format!(
        "failed to load config from {}",
        proc_args.config_file.display()
    ))?;
    debug!("loaded config from {}", proc_args.config_file.display());

    if proc_args.test_config {
        info!("the format of the config file is ok");
        return Ok(());
    }

    // one registry shard per backend, each flushed by exactly one thread
    let registry = Arc::new(MetricRegistry::with_blacklist(
        config.backends.len(),
        config.blacklist.clone(),
    ));

    let mut backends = Vec::with_capacity(config.backends.len());
    for backend_config in &config.backends {
        let backend = tallyd::backend::build(backend_config).context(format!(
            "failed to build {} backend",
            backend_config.r#type
        ))?;
        backends.push(backend);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let percentiles = Arc::new(config.percentiles.clone());
    let dispatch = BackendDispatch::spawn_all(backends, &registry, percentiles, shutdown.clone())
        .context("failed to spawn backend flush threads")?;

    let stats = config
        .internal_stats
        .as_deref()
        .map(|prefix| Arc::new(InternalStats::new(&registry, prefix)));

    let importers = tallyd::import::spawn(&config.statsd, registry.clone(), stats, shutdown.clone())
        .context("failed to start statsd importer")?;

    info!("{} {} started", tallyd::build::PKG_NAME, tallyd::build::VERSION);

    wait_shutdown_signal().context("failed to wait for shutdown signal")?;
    info!("shutdown signal received");

    shutdown.store(true, Ordering::Relaxed);
    for handle in importers {
        let _ = handle.join();
    }
    dispatch.stop();

    info!("clean shutdown");
    Ok(())
}

fn wait_shutdown_signal() -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    rt.block_on(tokio::signal::ctrl_c())
        .context("failed to listen for ctrl-c")?;
    Ok(())
}
