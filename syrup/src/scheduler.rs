/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Deterministic scheduling algorithm.
//!
//! Scheduling is cooperative. A thread keeps the processor until it yields, parks on a
//! join, or returns. The only choice the scheduler ever makes is which ready thread runs
//! next, and that choice is made by exactly one of:
//!
//! 1. a replayed [Schedule], while it has decisions left;
//! 2. the configured [SchedHeuristic]: FIFO by ready time, or a seeded PRNG.
//!
//! Once a replayed schedule runs out, scheduling continues in FIFO order. Every decision,
//! however it was made, is appended to the recorded schedule so the run can be replayed.

mod replayer;
pub mod runqueue;

use std::collections::BTreeMap;

use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use syrup_model::config::Config;
use syrup_model::config::SchedHeuristic;
use tracing::debug;
use tracing::trace;

pub use self::replayer::Replayer;
use self::runqueue::RunQueue;
use crate::detlog;
use crate::detlog_debug;
use crate::error::Error;
use crate::error::Result;
use crate::tcb::TcbStore;
use crate::tcb::ThreadState;
use crate::types::Schedule;
use crate::types::Tid;

/// The state for the deterministic scheduler.
#[derive(Debug)]
pub struct Scheduler {
    /// Monotonically count upwards, one per scheduling decision. This is the logical step
    /// counter that trace events are tagged with.
    pub turn: u64,

    /// Threads that are READY, in the order they became ready.
    ///
    /// INVARIANT: Thread IDs in `waiters` are absent from `run_queue`.
    run_queue: RunQueue,

    /// The thread currently executing, or `None` while the host has control.
    running: Option<Tid>,

    /// The thread the running thread asked to wait for during its current turn. Applied
    /// when the turn ends in a suspension, discarded if it ends in termination.
    park_request: Option<Tid>,

    /// Threads parked on a join, keyed by the thread they wait for.
    ///
    /// (N.B.  This is a BTreeMap because we iterate over it, and BTreeMap gives us a
    /// predictable order, unlike HashMap.)
    waiters: BTreeMap<Tid, Vec<Tid>>,

    /// Which heuristic decides when no replayed schedule does.
    sched_heuristic: SchedHeuristic,
    prng: Pcg64Mcg,

    /// Present while an externally supplied schedule is being followed.
    replayer: Option<Replayer>,

    /// Every decision taken so far.
    history: Schedule,

    /// A cached copy of the same (immutable) field in Config.
    stop_after_turn: Option<u64>,
}

impl Scheduler {
    pub fn new(config: &Config, replay: Option<Schedule>) -> Self {
        detlog!(0;
            "SCHEDRAND: heuristic {}, seeding scheduler with seed {}",
            config.sched_heuristic,
            config.sched_seed
        );
        Scheduler {
            turn: 0,
            run_queue: RunQueue::new(),
            running: None,
            park_request: None,
            waiters: BTreeMap::new(),
            sched_heuristic: config.sched_heuristic,
            prng: Pcg64Mcg::seed_from_u64(config.sched_seed),
            replayer: replay.map(|s| Replayer::new(s, config.die_on_desync)),
            history: Schedule::new(),
            stop_after_turn: config.stop_after_turn,
        }
    }

    /// The thread holding the processor, if any.
    pub fn running(&self) -> Option<Tid> {
        self.running
    }

    /// Number of threads waiting in the run queue.
    pub fn ready_count(&self) -> usize {
        self.run_queue.len()
    }

    /// True when nothing is running and nothing is ready.
    pub fn is_idle(&self) -> bool {
        self.running.is_none() && self.run_queue.is_empty()
    }

    /// Threads currently parked on `target`.
    pub fn waiters_on(&self, target: Tid) -> &[Tid] {
        self.waiters.get(&target).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The decisions taken so far.
    pub fn history(&self) -> &Schedule {
        &self.history
    }

    /// The replayer, if a schedule was supplied.
    pub fn replayer(&self) -> Option<&Replayer> {
        self.replayer.as_ref()
    }

    /// Move a `Created` thread, or a `Blocked` thread whose target has terminated, into the
    /// run queue.
    pub fn enqueue(&mut self, store: &mut TcbStore, tid: Tid) -> Result<()> {
        let eligible = match store.get(tid)?.state() {
            ThreadState::Created => true,
            ThreadState::Blocked(target) => store.get(target).map_or(true, |t| t.is_terminated()),
            _ => false,
        };
        let tcb = store.get_mut(tid)?;
        if !eligible {
            return Err(Error::InvalidState {
                tid,
                op: "enqueue",
                reason: format!("thread is {}", tcb.state()),
            });
        }
        tcb.set_state(ThreadState::Ready);
        self.run_queue.push_back(tid);
        trace!("[sched] enqueued {}, {} ready", tid, self.run_queue.len());
        Ok(())
    }

    /// Ask for `waiter`, which must be the running thread, to be parked until `target`
    /// terminates. The waiter keeps the processor until its turn ends; see
    /// [Scheduler::suspended]. A later request in the same turn replaces an earlier one.
    ///
    /// Fails with `DeadlockDetected` if `target` is, transitively, parked on `waiter`; in
    /// that case nothing changes.
    pub fn block_on(&mut self, store: &TcbStore, waiter: Tid, target: Tid) -> Result<()> {
        if self.running != Some(waiter) {
            return Err(Error::InvalidState {
                tid: waiter,
                op: "block",
                reason: format!("thread is {}", store.get(waiter)?.state()),
            });
        }
        if store.get(target)?.is_terminated() {
            return Err(Error::InvalidState {
                tid: target,
                op: "wait on",
                reason: "thread already terminated".to_string(),
            });
        }
        let mut cycle = vec![waiter, target];
        let mut cursor = target;
        loop {
            if cursor == waiter {
                return Err(Error::DeadlockDetected {
                    waiter,
                    target,
                    cycle,
                });
            }
            match store.get(cursor)?.state() {
                ThreadState::Blocked(next) => {
                    cycle.push(next);
                    cursor = next;
                }
                _ => break,
            }
        }
        trace!("[sched] thread {} asks to wait for {}", waiter, target);
        self.park_request = Some(target);
        Ok(())
    }

    /// Withdraw a request made by `waiter` to wait for `target`, if it is still pending.
    pub fn cancel_block(&mut self, waiter: Tid, target: Tid) {
        if self.running == Some(waiter) && self.park_request == Some(target) {
            trace!("[sched] thread {} no longer waits for {}", waiter, target);
            self.park_request = None;
        }
    }

    /// The running thread suspended. It is parked if it asked to wait during this turn,
    /// and goes to the back of the line otherwise. Returns the thread it now waits for.
    pub fn suspended(&mut self, store: &mut TcbStore, tid: Tid) -> Result<Option<Tid>> {
        match self.park_request.take() {
            Some(target) => {
                self.release_processor(tid);
                store
                    .get_mut(tid)?
                    .set_state(ThreadState::Blocked(target));
                self.waiters.entry(target).or_default().push(tid);
                debug!("[sched] thread {} parked on {}", tid, target);
                Ok(Some(target))
            }
            None => {
                self.yielded(store, tid)?;
                Ok(None)
            }
        }
    }

    /// Pick the next thread to run, mark it `Running` and take it out of the run queue.
    /// Returns `None` when no thread is ready.
    pub fn select_next(&mut self, store: &mut TcbStore) -> Result<Option<Tid>> {
        assert!(
            self.running.is_none(),
            "Invariant violation! Selecting a thread while {:?} is still running",
            self.running
        );
        if self.run_queue.is_empty() {
            return Ok(None);
        }
        if let Some(limit) = self.stop_after_turn {
            if self.turn >= limit {
                return Err(Error::StepLimitExceeded(self.turn));
            }
        }

        let turn = self.turn + 1;
        let replayed = match self.replayer.as_mut() {
            Some(replayer) => replayer.next_decision(&self.run_queue)?,
            None => None,
        };
        let tid = match replayed {
            Some(tid) => {
                let removed = self.run_queue.remove_tid(tid);
                debug_assert!(removed);
                tid
            }
            None if self.replayer.is_some() => self.pop_fifo(),
            None => match self.sched_heuristic {
                SchedHeuristic::Fifo => self.pop_fifo(),
                SchedHeuristic::Random => {
                    let len = self.run_queue.len();
                    let index = self.prng.gen_range(0..len);
                    detlog_debug!(turn; "SCHEDRAND: [0,{}) => {}", len, index);
                    let tid = self
                        .run_queue
                        .nth(index)
                        .expect("random index is within the run queue");
                    self.run_queue.remove_tid(tid);
                    tid
                }
            },
        };

        self.turn = turn;
        self.running = Some(tid);
        self.history.push(tid);
        store.get_mut(tid)?.set_state(ThreadState::Running);
        detlog!(turn; "scheduling thread {}", tid);
        Ok(Some(tid))
    }

    fn pop_fifo(&mut self) -> Tid {
        self.run_queue
            .pop_front()
            .expect("run queue checked non-empty")
    }

    /// The running thread gave up the processor without blocking; it goes to the back of
    /// the line.
    pub fn yielded(&mut self, store: &mut TcbStore, tid: Tid) -> Result<()> {
        self.release_processor(tid);
        store.get_mut(tid)?.set_state(ThreadState::Ready);
        self.run_queue.push_back(tid);
        Ok(())
    }

    /// The running thread's entry point returned; wake whoever waits for it.
    pub fn terminated(&mut self, store: &mut TcbStore, tid: Tid) -> Result<Vec<Tid>> {
        self.release_processor(tid);
        let woken = self.waiters.remove(&tid).unwrap_or_default();
        for waiter in &woken {
            self.enqueue(store, *waiter)?;
        }
        if !woken.is_empty() {
            debug!("[sched] thread {} terminated, woke {:?}", tid, woken);
        }
        Ok(woken)
    }

    fn release_processor(&mut self, tid: Tid) {
        assert_eq!(
            self.running,
            Some(tid),
            "Invariant violation! Thread {} released a processor it did not hold",
            tid
        );
        self.running = None;
        self.park_request = None;
    }
}
