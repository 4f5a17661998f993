/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Arg, ArgAction, Command, ValueHint, value_parser};

const ARGS_VERSION: &str = "version";
const ARGS_VERBOSE: &str = "verbose";
const ARGS_TEST_CONFIG: &str = "test-config";
const ARGS_CONFIG_FILE: &str = "config-file";

const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug)]
pub struct ProcArgs {
    pub config_file: PathBuf,
    pub test_config: bool,
    pub verbose_level: u8,
}

fn build_cli_args() -> Command {
    Command::new(crate::build::PKG_NAME)
        .disable_version_flag(true)
        .arg(
            Arg::new(ARGS_VERSION)
                .help("Show version")
                .action(ArgAction::SetTrue)
                .short('V')
                .long(ARGS_VERSION),
        )
        .arg(
            Arg::new(ARGS_VERBOSE)
                .help("Show more log messages")
                .action(ArgAction::Count)
                .short('v')
                .long(ARGS_VERBOSE),
        )
        .arg(
            Arg::new(ARGS_TEST_CONFIG)
                .help("Test the format of config file and exit")
                .action(ArgAction::SetTrue)
                .short('t')
                .long(ARGS_TEST_CONFIG),
        )
        .arg(
            Arg::new(ARGS_CONFIG_FILE)
                .help("Config file path")
                .num_args(1)
                .value_name("CONFIG FILE")
                .value_hint(ValueHint::FilePath)
                .value_parser(value_parser!(PathBuf))
                .default_value(DEFAULT_CONFIG_FILE)
                .short('c')
                .long("config"),
        )
}

/// Parse command line options. Returns `None` when the process should exit
/// cleanly without running (version or help output).
pub fn parse_clap() -> anyhow::Result<Option<ProcArgs>> {
    let matches = match build_cli_args().try_get_matches() {
        Ok(matches) => matches,
        Err(e)
            if matches!(
                e.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) =>
        {
            let _ = e.print();
            return Ok(None);
        }
        Err(e) => return Err(anyhow!("{e}")),
    };

    if matches.get_flag(ARGS_VERSION) {
        crate::build::print_version();
        return Ok(None);
    }

    let config_file = matches
        .get_one::<PathBuf>(ARGS_CONFIG_FILE)
        .cloned()
        .ok_or_else(|| anyhow!("no config file set"))?;

    Ok(Some(ProcArgs {
        config_file,
        test_config: matches.get_flag(ARGS_TEST_CONFIG),
        verbose_level: matches.get_count(ARGS_VERBOSE),
    }))
}
