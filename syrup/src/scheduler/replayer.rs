/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::BTreeMap;

use syrup_model::collections::ReplayCursor;
use tracing::debug;
use tracing::warn;

use super::runqueue::RunQueue;
use crate::error::Error;
use crate::error::Result;
use crate::types::Schedule;
use crate::types::Tid;

/// Drives scheduling decisions from a previously chosen schedule.
#[derive(Debug)]
pub struct Replayer {
    /// A cursor that holds our place in the schedule being replayed.
    cursor: ReplayCursor<Tid>,
    /// The number of decisions we've popped from the schedule.
    pub decisions_popped: u64,
    /// Requested threads that were not runnable when their decision came up, per thread.
    pub desync_counts: BTreeMap<Tid, u64>,
    /// A cached copy of the same (immutable) field in Config.
    die_on_desync: bool,
    exhausted_reported: bool,
}

impl Replayer {
    pub fn new(schedule: Schedule, die_on_desync: bool) -> Self {
        debug!("[replayer] replaying {} decisions", schedule.len());
        Replayer {
            cursor: schedule.into_cursor(),
            decisions_popped: 0,
            desync_counts: BTreeMap::new(),
            die_on_desync,
            exhausted_reported: false,
        }
    }

    /// Pick the next thread to run among those in `run_queue`, or `None` once the schedule
    /// is used up and the caller should fall back to its own policy.
    ///
    /// Decisions naming a thread that is not runnable are skipped, unless `die_on_desync`
    /// is set, in which case they are an error.
    pub fn next_decision(&mut self, run_queue: &RunQueue) -> Result<Option<Tid>> {
        while let Some(requested) = self.cursor.next() {
            let index = self.decisions_popped;
            self.decisions_popped += 1;
            if run_queue.contains_tid(requested) {
                return Ok(Some(requested));
            }
            *self.desync_counts.entry(requested).or_default() += 1;
            if self.die_on_desync {
                return Err(Error::ScheduleDesync { index, requested });
            }
            warn!(
                "[replayer] decision #{} names thread {} which is not runnable, skipping",
                index, requested
            );
        }
        if !self.exhausted_reported {
            self.exhausted_reported = true;
            debug!(
                "[replayer] schedule exhausted after {} decisions, falling back to FIFO",
                self.decisions_popped
            );
        }
        Ok(None)
    }

    /// Total desyncs across all threads.
    pub fn desyncs(&self) -> u64 {
        self.desync_counts.values().sum()
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor.is_exhausted()
    }
}
