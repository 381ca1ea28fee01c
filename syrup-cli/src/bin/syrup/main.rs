/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

// Treat all Clippy warnings as errors.
#![deny(clippy::all)]
#![allow(clippy::uninlined_format_args)]

mod global_opts;
mod programs;
mod run;
mod search;
mod tracing;

use clap::Parser;
use colored::*;

use self::global_opts::GlobalOpts;
use self::run::RunOpts;
use self::search::SearchOpts;

#[derive(Debug, Parser)]
#[clap(name = "syrup", version)]
struct Args {
    #[clap(flatten)]
    global: GlobalOpts,

    #[clap(subcommand)]
    command: Subcommand,
}

#[derive(Debug, Parser)]
enum Subcommand {
    /// Run a bundled program under the deterministic scheduler.
    #[clap(name = "run")]
    Run(Box<RunOpts>),

    /// Try many random schedules of a bundled program, looking for a lost update.
    #[clap(name = "search")]
    Search(Box<SearchOpts>),
}

impl Subcommand {
    fn main(&self, global: &GlobalOpts) -> anyhow::Result<()> {
        match self {
            Subcommand::Run(x) => x.main(global),
            Subcommand::Search(x) => x.main(global),
        }
    }
}

fn main() {
    let Args { global, command } = Args::parse();

    let result = global
        .init_tracing()
        .and_then(|_guard| command.main(&global));
    if let Err(err) = result {
        display_error(err);
        std::process::exit(1);
    }
}

fn display_error(error: anyhow::Error) {
    let mut chain = error.chain();

    if let Some(error) = chain.next() {
        eprintln!("{}: {}", "Error".red().bold(), error);
    }

    for cause in chain {
        eprintln!("     {} {}", ">".dimmed().bold(), cause);
    }
}
