/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Searching the space of interleavings for one that breaks a program.
//!
//! Each attempt runs the program in a fresh [Runtime] under the randomized heuristic, with
//! consecutive seeds starting at `config.sched_seed`. The first outcome failing the check
//! is returned together with the schedule that produced it, which replays it exactly.

use syrup_model::config::Config;
use tracing::debug;
use tracing::info;

use crate::detlog;
use crate::error::Result;
use crate::lifecycle::Runtime;
use crate::types::Schedule;

/// A run whose outcome failed the check.
#[derive(Debug, Clone, PartialEq)]
pub struct Counterexample<T> {
    /// The seed the failing run was scheduled with.
    pub seed: u64,
    /// Zero-based index of the attempt that failed.
    pub attempt: u64,
    /// The decisions of the failing run.
    pub schedule: Schedule,
    /// What the program returned.
    pub value: T,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Search<T> {
    Found(Counterexample<T>),
    NotFound { attempts: u64 },
}

impl<T> Search<T> {
    pub fn found(&self) -> Option<&Counterexample<T>> {
        match self {
            Search::Found(cex) => Some(cex),
            Search::NotFound { .. } => None,
        }
    }
}

/// Run `program` up to `attempts` times, returning the first run for which `check` is false.
///
/// `program` receives a fresh runtime for each attempt and typically creates and joins
/// threads on it. Any threads it leaves behind are run to completion before `check` sees
/// the outcome. Errors from the runtime end the search.
pub fn search<T, P, C>(
    config: &Config,
    attempts: u64,
    mut program: P,
    mut check: C,
) -> Result<Search<T>>
where
    P: FnMut(&Runtime) -> Result<T>,
    C: FnMut(&T) -> bool,
{
    for attempt in 0..attempts {
        let seed = config.sched_seed.wrapping_add(attempt);
        let rt = Runtime::new(config.with_random_seed(seed));
        let value = program(&rt)?;
        rt.run_until_idle()?;
        if check(&value) {
            debug!("[explore] attempt {} (seed {}) passed", attempt, seed);
            continue;
        }
        let schedule = rt.schedule();
        detlog!(rt.turn();
            "[explore] attempt {} (seed {}) failed, thread switches: {}",
            attempt,
            seed,
            schedule.thread_switches()
        );
        return Ok(Search::Found(Counterexample {
            seed,
            attempt,
            schedule,
            value,
        }));
    }
    info!("[explore] no failing schedule in {} attempts", attempts);
    Ok(Search::NotFound { attempts })
}
