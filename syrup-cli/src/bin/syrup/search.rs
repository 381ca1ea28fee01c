/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use clap::Parser;
use colored::Colorize;
use syrup::explore;
use syrup::explore::Search;
use syrup_model::config::Config;

use super::global_opts::GlobalOpts;
use super::programs::Program;

/// Command-line options for the "search" subcommand.
#[derive(Debug, Parser, Clone)]
pub struct SearchOpts {
    /// Program to search: `counter` or `racy-counter`.
    #[clap(value_name = "PROGRAM")]
    program: Program,

    /// Number of threads incrementing the counter.
    #[clap(long, short = 'n', default_value_t = 4, value_name = "uint")]
    threads: usize,

    /// How many seeds to try, counting up from --sched-seed.
    #[clap(long, default_value_t = 100, value_name = "uint64")]
    attempts: u64,

    /// Scheduler configuration. The heuristic is always random during a search.
    #[clap(flatten)]
    config: Config,
}

impl SearchOpts {
    pub fn main(&self, _global: &GlobalOpts) -> anyhow::Result<()> {
        let expected = self.threads as u64;
        eprintln!(
            ":: Searching {} seeds from {} for a run of {} that does not count to {}",
            self.attempts, self.config.sched_seed, self.program, expected
        );
        let outcome = explore::search(
            &self.config,
            self.attempts,
            |rt| self.program.run(rt, self.threads),
            |value| *value == expected,
        )?;

        match outcome {
            Search::Found(cex) => {
                eprintln!(
                    ":: {} attempt {} (seed {}) counted to {}",
                    "Race found:".red().bold(),
                    cex.attempt,
                    cex.seed,
                    cex.value
                );
                eprintln!(":: Thread switches: {}", cex.schedule.thread_switches());
                println!("{}", cex.schedule);
                if let Some(path) = &self.config.record_schedule_to {
                    cex.schedule
                        .write_to_disk(path)
                        .map_err(anyhow::Error::msg)?;
                    eprintln!(
                        ":: Schedule written to {}, replay it with --replay-schedule-from",
                        path.display()
                    );
                }
            }
            Search::NotFound { attempts } => {
                eprintln!(
                    ":: {} every one of {} runs counted to {}",
                    "No race found:".green().bold(),
                    attempts,
                    expected
                );
            }
        }
        Ok(())
    }
}
