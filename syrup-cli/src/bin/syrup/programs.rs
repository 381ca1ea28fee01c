/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The bundled programs: threads incrementing one shared counter.

use std::fmt;
use std::str::FromStr;

use syrup::Runtime;
use syrup::ThreadContext;

/// Which increment each thread performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    /// `counter += 1` with no yield point inside.
    Counter,
    /// Read the counter, yield, then write back the incremented value.
    RacyCounter,
}

impl FromStr for Program {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(Program::Counter),
            "racy-counter" | "racy" => Ok(Program::RacyCounter),
            _ => Err(format!(
                "Expected counter|racy-counter, could not parse: {:?}",
                s
            )),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Program::Counter => write!(f, "counter"),
            Program::RacyCounter => write!(f, "racy-counter"),
        }
    }
}

impl Program {
    /// Create `threads` threads that each increment a shared counter once, join them all in
    /// creation order, and return the final count.
    pub fn run(self, rt: &Runtime, threads: usize) -> syrup::Result<u64> {
        let counter = rt.shared("counter", 0u64);
        let mut handles = Vec::with_capacity(threads);
        for _ in 0..threads {
            let counter = counter.clone();
            let handle = match self {
                Program::Counter => rt.create_fn(move |()| counter.update(|c| c + 1), ())?,
                Program::RacyCounter => rt.create(
                    move |ctx: ThreadContext, ()| async move {
                        let seen = counter.read();
                        ctx.yield_now().await;
                        counter.write(seen + 1);
                        seen + 1
                    },
                    (),
                )?,
            };
            handles.push(handle);
        }
        for handle in &handles {
            rt.join(handle)?;
        }
        Ok(counter.peek())
    }
}
