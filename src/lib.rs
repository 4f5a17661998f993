/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

pub mod backend;
pub mod build;
pub mod config;
pub mod import;
pub mod logging;
pub mod metric;
pub mod opts;
pub mod registry;
pub mod stat;
pub mod tags;
pub mod types;
