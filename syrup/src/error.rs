/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Errors surfaced by the lifecycle and scheduling operations.
//!
//! Every error is returned to the immediate caller. Nothing is retried or swallowed, and a
//! failed operation leaves no partial side effects behind.

use std::fmt;

use thiserror::Error;

use crate::types::Tid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A thread could not be allocated within the configured limits.
    #[error("out of resources: {0}")]
    OutOfResources(Exhausted),

    /// The id was never allocated by this runtime, or has been released.
    #[error("unknown thread {0}")]
    UnknownId(Tid),

    /// The operation is illegal for the thread's current state.
    #[error("cannot {op} thread {tid}: {reason}")]
    InvalidState {
        tid: Tid,
        op: &'static str,
        reason: String,
    },

    /// Parking `waiter` on `target` would close a cycle of joins.
    #[error("thread {waiter} joining thread {target} would deadlock, cycle: {}", render_cycle(.cycle))]
    DeadlockDetected {
        waiter: Tid,
        target: Tid,
        /// The threads on the cycle, starting and ending with `waiter`.
        cycle: Vec<Tid>,
    },

    /// The configured bound on scheduler turns was reached with work still runnable.
    #[error("scheduler stopped after {0} turns with runnable threads remaining")]
    StepLimitExceeded(u64),

    /// A replayed schedule named a thread that was not runnable at that decision.
    #[error("schedule desync at decision #{index}: thread {requested} is not runnable")]
    ScheduleDesync { index: u64, requested: Tid },
}

/// Which limit an allocation ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhausted {
    Threads { limit: usize },
    Stack { needed: usize, budget: usize },
}

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exhausted::Threads { limit } => {
                write!(f, "{} live threads is the configured maximum", limit)
            }
            Exhausted::Stack { needed, budget } => write!(
                f,
                "entry point needs a {} byte frame but the stack budget is {} bytes",
                needed, budget
            ),
        }
    }
}

fn render_cycle(cycle: &[Tid]) -> String {
    cycle
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
