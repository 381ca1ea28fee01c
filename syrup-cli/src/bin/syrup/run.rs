/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use syrup::Recorder;
use syrup::Runtime;
use syrup::types::Schedule;
use syrup::types::Trace;
use syrup_model::config::Config;

use super::global_opts::GlobalOpts;
use super::programs::Program;

/// Command-line options for the "run" subcommand.
#[derive(Debug, Parser, Clone)]
pub struct RunOpts {
    /// Program to run: `counter` or `racy-counter`.
    #[clap(value_name = "PROGRAM")]
    program: Program,

    /// Number of threads incrementing the counter.
    #[clap(long, short = 'n', default_value_t = 4, value_name = "uint")]
    threads: usize,

    /// Write the access trace to this file, as JSON.
    #[clap(long, value_name = "filepath")]
    trace_to: Option<PathBuf>,

    /// Print every trace event to stderr.
    #[clap(long)]
    print_trace: bool,

    /// After running, immediately run a SECOND time and compare the two executions. Exits
    /// with an error unless the results, schedules, and traces all match.
    #[clap(long)]
    verify: bool,

    /// Scheduler configuration
    #[clap(flatten)]
    config: Config,
}

/// What one run produced.
struct RunOutcome {
    value: u64,
    trace: Trace,
    schedule: Schedule,
    desyncs: u64,
}

impl RunOpts {
    fn run_once(&self) -> anyhow::Result<RunOutcome> {
        let rt = Runtime::from_config(self.config.clone())
            .map_err(anyhow::Error::msg)
            .context("Invalid scheduler configuration")?;
        let recorder = Recorder::new();
        rt.add_observer(recorder.clone());
        let value = self
            .program
            .run(&rt, self.threads)
            .with_context(|| format!("Running {} with {} threads", self.program, self.threads))?;
        rt.run_until_idle()?;
        Ok(RunOutcome {
            value,
            trace: recorder.trace(),
            schedule: rt.schedule(),
            desyncs: rt.desyncs(),
        })
    }

    pub fn main(&self, _global: &GlobalOpts) -> anyhow::Result<()> {
        let outcome = self.run_once()?;
        println!("Counter value is {}", outcome.value);

        if self.print_trace {
            for event in &outcome.trace.events {
                eprintln!("{}", event);
            }
        }
        if outcome.desyncs > 0 {
            eprintln!(
                ":: {} {} replayed decisions named threads that were not runnable",
                "Warning:".yellow().bold(),
                outcome.desyncs
            );
        }
        eprintln!(
            ":: {} {} turns, thread switches: {}",
            "Finished.".green().bold(),
            outcome.schedule.len(),
            outcome.schedule.thread_switches()
        );

        if let Some(path) = &self.config.record_schedule_to {
            outcome
                .schedule
                .write_to_disk(path)
                .map_err(anyhow::Error::msg)?;
            eprintln!(":: Schedule written to {}", path.display());
        }
        if let Some(path) = &self.trace_to {
            fs::write(path, outcome.trace.to_json())
                .with_context(|| format!("Failed to write trace to {}", path.display()))?;
            eprintln!(":: Trace written to {}", path.display());
        }

        if self.verify {
            eprintln!(":: {}", "Verifying: running a second time...".yellow().bold());
            let second = self.run_once()?;
            compare_two_runs(&outcome, &second)?;
            eprintln!(":: {}", "Verified: both runs were identical.".green().bold());
        }
        Ok(())
    }
}

fn compare_two_runs(first: &RunOutcome, second: &RunOutcome) -> anyhow::Result<()> {
    if first.value != second.value {
        anyhow::bail!(
            "Runs disagree on the counter: {} vs {}",
            first.value,
            second.value
        );
    }
    if first.schedule != second.schedule {
        anyhow::bail!(
            "Runs disagree on the schedule:\n  {}\n  {}",
            first.schedule.thread_switches(),
            second.schedule.thread_switches()
        );
    }
    if first.trace.to_json() != second.trace.to_json() {
        anyhow::bail!("Runs had the same schedule but different traces");
    }
    Ok(())
}
