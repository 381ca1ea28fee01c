/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::metadata::LevelFilter;

use super::tracing::init_file_tracing;
use super::tracing::init_stderr_tracing;

/// Syrup runs cooperative threads one at a time, in an order that is a deterministic
/// function of the configuration. Running the same program twice with the same flags
/// yields bitwise identical interleavings, so a data race that shows up once shows up
/// every time.
///
/// See the "run" subcommand to run one of the bundled racy programs, and "search" to
/// look for a schedule under which it misbehaves.
///
/// Below are options common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct GlobalOpts {
    /// The verbosity level of log output.
    #[clap(short, long, value_name = "LEVEL", env = "SYRUP_LOG")]
    pub log: Option<LevelFilter>,

    /// Log to a file instead of the terminal.
    #[clap(long, value_name = "FILE", env = "SYRUP_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl GlobalOpts {
    /// Initializes tracing. The returned guard, if any, must live until logging is done.
    pub fn init_tracing(&self) -> anyhow::Result<Option<impl Drop + use<>>> {
        if let Some(path) = &self.log_file {
            let file_writer = File::create(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Ok(Some(init_file_tracing(self.log, file_writer)))
        } else {
            init_stderr_tracing(self.log);
            Ok(None)
        }
    }
}
