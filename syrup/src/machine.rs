/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The state shared between the host-facing [Runtime](crate::Runtime) and the contexts
//! handed to managed threads, and the loop that gives threads their turns.
//!
//! A turn is: pick a thread, take its continuation out of its TCB, poll it with no borrow
//! of the machine held (the thread calls back into the machine for every create, join and
//! shared access), then file the outcome. A continuation that completes has terminated; one
//! that suspends is parked if it asked to wait on a join during the turn, and has yielded
//! otherwise. The running thread keeps the processor for the whole poll either way.

use std::cell::RefCell;
use std::rc::Rc;
use std::task::Context;
use std::task::Poll;

use futures::task::noop_waker_ref;
use syrup_model::config::Config;
use tracing::trace;

use crate::error::Error;
use crate::error::Result;
use crate::hooks::Hooks;
use crate::lifecycle::ThreadContext;
use crate::scheduler::Scheduler;
use crate::tcb::BoxedResult;
use crate::tcb::Entry;
use crate::tcb::Generation;
use crate::tcb::TcbStore;
use crate::tcb::Turn;
use crate::types::Schedule;
use crate::types::Tid;
use crate::types::TraceEvent;
use crate::types::TraceOp;

pub(crate) type SharedMachine = Rc<RefCell<Machine>>;

#[derive(Debug)]
pub(crate) struct Machine {
    pub(crate) config: Config,
    pub(crate) store: TcbStore,
    pub(crate) sched: Scheduler,
    pub(crate) hooks: Hooks,
}

impl Machine {
    pub(crate) fn new(config: Config, replay: Option<Schedule>) -> Self {
        Machine {
            store: TcbStore::new(config.max_threads, config.stack_size),
            sched: Scheduler::new(&config, replay),
            hooks: Hooks::default(),
            config,
        }
    }

    /// Whoever holds the processor: a managed thread, or the host.
    pub(crate) fn current(&self) -> Tid {
        self.sched.running().unwrap_or(Tid::HOST)
    }

    pub(crate) fn emit(&mut self, tid: Tid, op: TraceOp) {
        let event = TraceEvent::new(self.sched.turn, tid, op);
        self.hooks.emit(event);
    }

    /// Allocate a thread and make it ready. Creation never runs the thread.
    pub(crate) fn spawn(&mut self, entry: Entry, frame_size: usize) -> Result<Tid> {
        let tid = self.store.allocate(entry, frame_size)?;
        self.emit(tid, TraceOp::Created);
        self.sched.enqueue(&mut self.store, tid)?;
        Ok(tid)
    }

    /// Have the running thread `waiter` parked on `target` when its turn ends.
    pub(crate) fn block_on(&mut self, waiter: Tid, target: Tid) -> Result<()> {
        self.sched.block_on(&self.store, waiter, target)
    }

    /// Fail with `UnknownId` for handles minted by another runtime.
    pub(crate) fn check_generation(&self, tid: Tid, generation: &Generation) -> Result<()> {
        if self.store.owns(generation) {
            Ok(())
        } else {
            Err(Error::UnknownId(tid))
        }
    }

    /// Only the host may drive the scheduler; a managed thread doing so would re-enter it.
    pub(crate) fn ensure_host(&self, op: &'static str) -> Result<()> {
        match self.sched.running() {
            None => Ok(()),
            Some(tid) => Err(Error::InvalidState {
                tid,
                op,
                reason: "called from inside a managed thread, use its ThreadContext instead"
                    .to_string(),
            }),
        }
    }

    pub(crate) fn is_terminated(&self, tid: Tid) -> Result<bool> {
        Ok(self.store.get(tid)?.is_terminated())
    }

    pub(crate) fn take_result(&mut self, tid: Tid) -> Result<BoxedResult> {
        self.store.get_mut(tid)?.take_result()
    }
}

/// Give one thread one turn. Returns `false` if no thread was ready.
pub(crate) fn run_turn(machine: &SharedMachine) -> Result<bool> {
    let (tid, turn) = {
        let mut guard = machine.borrow_mut();
        let m = &mut *guard;
        let Some(tid) = m.sched.select_next(&mut m.store)? else {
            return Ok(false);
        };
        m.emit(tid, TraceOp::Scheduled);
        (tid, m.store.get_mut(tid)?.begin_turn())
    };

    let mut frame = match turn {
        Turn::Start(entry) => entry(ThreadContext::new(tid, Rc::downgrade(machine))),
        Turn::Resume(frame) => frame,
    };
    trace!("[machine] polling thread {}", tid);
    let poll = frame.as_mut().poll(&mut Context::from_waker(noop_waker_ref()));

    match poll {
        Poll::Ready(result) => {
            // Dropped before re-borrowing: destructors of the thread's locals may touch
            // shared variables.
            drop(frame);
            let mut guard = machine.borrow_mut();
            let m = &mut *guard;
            m.store.terminate(tid, result)?;
            m.emit(tid, TraceOp::Terminated);
            m.sched.terminated(&mut m.store, tid)?;
        }
        Poll::Pending => {
            let mut guard = machine.borrow_mut();
            let m = &mut *guard;
            m.store.get_mut(tid)?.suspend(frame);
            match m.sched.suspended(&mut m.store, tid)? {
                Some(target) => m.emit(tid, TraceOp::Blocked(target)),
                None => m.emit(tid, TraceOp::Yielded),
            }
        }
    }
    Ok(true)
}

/// Give turns until no thread is ready or running.
pub(crate) fn run_until_idle(machine: &SharedMachine) -> Result<()> {
    machine.borrow().ensure_host("run the scheduler from")?;
    while run_turn(machine)? {}
    Ok(())
}

/// Give turns until `tid` has terminated.
pub(crate) fn run_until_terminated(machine: &SharedMachine, tid: Tid) -> Result<()> {
    machine.borrow().ensure_host("join")?;
    while !machine.borrow().is_terminated(tid)? {
        if !run_turn(machine)? {
            let state = machine.borrow().store.get(tid)?.state();
            return Err(Error::InvalidState {
                tid,
                op: "join",
                reason: format!("thread is {} and no thread is runnable", state),
            });
        }
    }
    Ok(())
}
