/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use anyhow::anyhow;
use serde_json::{Map, Value};

pub(crate) fn as_string(v: &Value) -> anyhow::Result<String> {
    v.as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("json value should be a string"))
}

pub(crate) fn as_u64(v: &Value) -> anyhow::Result<u64> {
    v.as_u64()
        .ok_or_else(|| anyhow!("json value should be an unsigned integer"))
}

pub(crate) fn as_usize(v: &Value) -> anyhow::Result<usize> {
    Ok(as_u64(v)? as usize)
}

pub(crate) fn as_f64(v: &Value) -> anyhow::Result<f64> {
    v.as_f64()
        .ok_or_else(|| anyhow!("json value should be a number"))
}

pub(crate) fn as_array(v: &Value) -> anyhow::Result<&Vec<Value>> {
    v.as_array()
        .ok_or_else(|| anyhow!("json value should be an array"))
}

pub(crate) fn as_map(v: &Value) -> anyhow::Result<&Map<String, Value>> {
    v.as_object()
        .ok_or_else(|| anyhow!("json value should be a map"))
}
