/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! A record of scheduling decisions, which can be recorded from a run and fed back in to
//! force the same interleaving again.

use std::fs::File;
use std::io::Write;
use std::iter::FromIterator;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::collections::ReplayCursor;
use crate::tid::Tid;

/// The sequence of threads picked by the scheduler, one entry per turn.
#[derive(PartialEq, Default, Debug, Eq, Clone, Hash, Serialize, Deserialize)]
pub struct Schedule {
    decisions: Vec<Tid>,
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let str = serde_json::to_string(&self).map_err(|_| std::fmt::Error)?;
        write!(f, "{}", str)
    }
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one decision.
    pub fn push(&mut self, tid: Tid) {
        self.decisions.push(tid);
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn decisions(&self) -> &[Tid] {
        &self.decisions
    }

    /// Consume the schedule into a cursor for replaying.
    pub fn into_cursor(self) -> ReplayCursor<Tid> {
        self.decisions.into_iter().collect()
    }

    /// Compact rendering as a list of thread switches, e.g. `1x3 2 1x2`: each run of
    /// consecutive turns given to the same thread is shown once with its length.
    pub fn thread_switches(&self) -> String {
        let mut out = Vec::new();
        let mut it = self.decisions.iter().peekable();
        while let Some(tid) = it.next() {
            let mut count = 1;
            while it.peek() == Some(&tid) {
                it.next();
                count += 1;
            }
            if count == 1 {
                out.push(tid.to_string());
            } else {
                out.push(format!("{}x{}", tid, count));
            }
        }
        out.join(" ")
    }

    /// Perform internal sanity checks and return an error if the schedule is not well formed.
    pub fn validate(&self) -> Result<(), String> {
        match self.decisions.iter().position(Tid::is_host) {
            Some(ix) => Err(format!(
                "decision #{} names the host context, which is never scheduled",
                ix
            )),
            None => Ok(()),
        }
    }

    /// Save to disk.
    pub fn write_to_disk(&self, path: &Path) -> Result<(), String> {
        let mut str: String = self.to_string();
        str.push('\n');
        match File::create(path) {
            Ok(mut file) => match file.write_all(str.as_bytes()) {
                Ok(_) => Ok(()),
                Err(err) => Err(format!(
                    "Failed to write schedule to file {:?}, error: {}",
                    path, err
                )),
            },
            Err(err) => Err(format!(
                "Failed to create file for schedule {:?}, error: {}",
                path, err
            )),
        }
    }

    /// Load from disk, validating the contents.
    pub fn read_from_disk(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|err| format!("Failed to open schedule file {:?}, error: {}", path, err))?;
        let schedule: Schedule = serde_json::from_reader(file)
            .map_err(|err| format!("Failed to parse schedule file {:?}, error: {}", path, err))?;
        schedule.validate()?;
        Ok(schedule)
    }
}

impl FromIterator<Tid> for Schedule {
    fn from_iter<I: IntoIterator<Item = Tid>>(iter: I) -> Self {
        Self {
            decisions: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Tid>> for Schedule {
    fn from(decisions: Vec<Tid>) -> Self {
        Self { decisions }
    }
}
