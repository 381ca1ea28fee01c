/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Runtime configuration.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use serde::Deserialize;
use serde::Serialize;

/// Default per-thread budget for the continuation frame, in bytes.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Default limit on threads that have been created but have not yet terminated.
pub const DEFAULT_MAX_THREADS: usize = 64;

/// Configuration options for the deterministic runtime.
#[derive(Debug, Serialize, Deserialize, Clone, Parser, PartialEq)]
pub struct Config {
    /// Upper bound, in bytes, on the continuation frame of each managed thread. Creating a
    /// thread whose entry point needs more than this fails.
    #[clap(long, value_name = "bytes", default_value_t = DEFAULT_STACK_SIZE)]
    pub stack_size: usize,

    /// Maximum number of managed threads alive (created and not yet terminated) at once.
    #[clap(long, value_name = "uint", default_value_t = DEFAULT_MAX_THREADS)]
    pub max_threads: usize,

    /// How to pick the next thread among the runnable ones.
    #[clap(long, default_value = "fifo", value_name = "str")]
    pub sched_heuristic: SchedHeuristic,

    /// Use this number to seed the PRNG behind the randomized scheduling heuristic.
    #[clap(
        long,
        env = "SYRUP_SCHED_SEED",
        default_value = "0",
        value_name = "uint64"
    )]
    pub sched_seed: u64,

    /// File to read a recorded schedule from. Its decisions override the heuristic until
    /// they run out, after which scheduling continues in FIFO order.
    #[clap(long, value_name = "filepath")]
    pub replay_schedule_from: Option<PathBuf>,

    /// File to write the schedule of this run to, for later replay.
    #[clap(long, value_name = "filepath")]
    pub record_schedule_to: Option<PathBuf>,

    /// When replaying a schedule, bail out on the first decision that names a thread which
    /// is not runnable, rather than skipping it.
    #[clap(long)]
    pub die_on_desync: bool,

    /// Stop with an error once this many scheduler turns have been taken.
    #[clap(long, value_name = "uint64")]
    pub stop_after_turn: Option<u64>,
}

/// The heuristic used when no replayed schedule dictates the next decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SchedHeuristic {
    /// Run threads in the order they became ready.
    #[default]
    Fifo,
    /// Pick uniformly among ready threads, from a PRNG seeded with `sched_seed`.
    Random,
}

// Lame to not derive this, but clap's ValueEnum would pull the casing out of our hands.
impl FromStr for SchedHeuristic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fifo" | "none" | "roundrobin" => Ok(SchedHeuristic::Fifo),
            "random" => Ok(SchedHeuristic::Random),
            _ => Err(format!("Expected Fifo|Random, could not parse: {:?}", s)),
        }
    }
}

impl fmt::Display for SchedHeuristic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SchedHeuristic::Fifo => write!(f, "fifo"),
            SchedHeuristic::Random => write!(f, "random"),
        }
    }
}

impl Config {
    /// Sanity check the flags.
    pub fn validate(&self) -> Result<(), String> {
        if self.stack_size == 0 {
            return Err("--stack-size must be greater than zero".to_string());
        }
        if self.max_threads == 0 {
            return Err("--max-threads must be greater than zero".to_string());
        }
        if self.stop_after_turn == Some(0) {
            return Err("--stop-after-turn must be greater than zero".to_string());
        }
        Ok(())
    }

    /// A copy of this config that schedules randomly from the given seed.
    pub fn with_random_seed(&self, seed: u64) -> Self {
        Config {
            sched_heuristic: SchedHeuristic::Random,
            sched_seed: seed,
            ..self.clone()
        }
    }
}

/// N.B. we don't want to specify two different notions of "default", so we use the
/// `Parser` instance above.
impl Default for Config {
    fn default() -> Self {
        let args: [OsString; 1] = [OsString::from("CMD")]; // Silly/unused.
        Config::parse_from(args.iter())
    }
}
