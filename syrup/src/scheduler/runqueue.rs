/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The queue of runnable threads.
//!
//! Threads are kept in round-robin order. Round-robin turns monotonically increase across
//! the entire queue; a thread is assigned a turn when it is pushed to the back.
//!
//! The queue itself does not pick anything. Selection policy lives in the scheduler, which
//! either takes the head of the queue, an arbitrary index, or a specific thread.

use std::collections::BTreeMap;
use std::fmt;

use crate::types::Tid;

/// The round robin turn of a thread. Lowest runs first.
type RoundRobinTurn = u64;

#[derive(Debug, Clone, Default)]
pub struct RunQueue {
    queue: BTreeMap<RoundRobinTurn, Tid>,

    // 0 is unused, the first push gets turn 1.
    last_turn: RoundRobinTurn,
}

/// A multi-line print of the runqueue.
impl fmt::Display for RunQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Run queue, size={}, last_turn={}:",
            &self.queue.len(),
            &self.last_turn,
        )?;
        for (turn, tid) in self.queue.iter() {
            writeln!(f, "    {} => {}", turn, tid)?;
        }
        Ok(())
    }
}

impl RunQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_safety_check(&self, tid: Tid) {
        if cfg!(debug_assertions) && self.contains_tid(tid) {
            panic!(
                "Invariant violation! Tried to add {} to runqueue, but it's already present:\n {}",
                tid, self
            );
        }
    }

    /// Push a thread to the back of the queue.
    pub fn push_back(&mut self, tid: Tid) {
        self.push_safety_check(tid);
        self.last_turn += 1;
        let old = self.queue.insert(self.last_turn, tid);
        assert!(old.is_none()); // last_turn should be monotonic
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Queued threads, head first.
    pub fn tids(&self) -> impl Iterator<Item = &Tid> {
        self.queue.values()
    }

    pub fn contains_tid(&self, tid: Tid) -> bool {
        self.tids().any(|t| t == &tid)
    }

    /// The thread at position `index`, counting from the head.
    pub fn nth(&self, index: usize) -> Option<Tid> {
        self.queue.values().nth(index).copied()
    }

    /// Remove and return the head of the queue.
    pub fn pop_front(&mut self) -> Option<Tid> {
        self.queue.pop_first().map(|(_turn, tid)| tid)
    }

    /// Remove `tid` from the queue, returning true if removal occurred.
    // This is O(N), but queues here hold a handful of threads.
    pub fn remove_tid(&mut self, tid: Tid) -> bool {
        let key = self
            .queue
            .iter()
            .find(|(_k, v)| **v == tid)
            .map(|(k, _v)| *k);
        match key {
            Some(k) => self.queue.remove(&k).is_some(),
            None => false,
        }
    }
}
