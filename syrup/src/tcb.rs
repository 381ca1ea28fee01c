/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Thread control blocks and the store that owns them.
//!
//! A thread control block (TCB) holds everything the scheduler knows about one managed
//! thread: its id, its state, the not-yet-started entry point, the suspended continuation
//! once it has started, and finally its result. The store hands out ids and enforces the
//! resource limits; it has no opinion about scheduling.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::rc::Weak;

use tracing::debug;

use crate::error::Error;
use crate::error::Exhausted;
use crate::error::Result;
use crate::lifecycle::ThreadContext;
use crate::types::Tid;

/// The type-erased value an entry point returns.
pub type BoxedResult = Box<dyn Any>;

/// The pinned continuation of an entry point that has started running.
pub type Frame = Pin<Box<dyn Future<Output = BoxedResult>>>;

/// An entry point with its argument already bound. Invoked exactly once, on the thread's
/// first turn.
pub type Entry = Box<dyn FnOnce(ThreadContext) -> Frame>;

/// Lifecycle state of a managed thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Allocated, not yet handed to the scheduler.
    Created,
    /// Waiting in the run queue.
    Ready,
    /// Currently executing. At most one thread is in this state.
    Running,
    /// Parked until the given thread terminates.
    Blocked(Tid),
    /// The entry point returned. Entered exactly once.
    Terminated,
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadState::Created => write!(f, "created"),
            ThreadState::Ready => write!(f, "ready"),
            ThreadState::Running => write!(f, "running"),
            ThreadState::Blocked(on) => write!(f, "blocked on {}", on),
            ThreadState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Memory exclusively owned by one thread for as long as it lives: the budget it was
/// granted, and the suspended continuation once the entry point has started.
///
/// Dropping the stack drops the continuation along with every value it holds.
pub struct Stack {
    budget: usize,
    used: usize,
    frame: Option<Frame>,
}

impl Stack {
    /// Reserve a stack for a continuation of `needed` bytes against `budget`.
    fn reserve(needed: usize, budget: usize) -> Result<Stack> {
        if needed > budget {
            return Err(Error::OutOfResources(Exhausted::Stack { needed, budget }));
        }
        Ok(Stack {
            budget,
            used: needed,
            frame: None,
        })
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn used(&self) -> usize {
        self.used
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("budget", &self.budget)
            .field("used", &self.used)
            .field("suspended", &self.frame.is_some())
            .finish()
    }
}

#[derive(Default)]
enum ResultSlot {
    #[default]
    Empty,
    Full(BoxedResult),
    Taken,
}

/// What the scheduler has to do to give a thread its turn.
pub(crate) enum Turn {
    /// First turn: invoke the entry point.
    Start(Entry),
    /// Any later turn: resume the suspended continuation.
    Resume(Frame),
}

/// Thread control block.
pub struct Tcb {
    tid: Tid,
    state: ThreadState,
    entry: Option<Entry>,
    stack: Option<Stack>,
    result: ResultSlot,
}

impl fmt::Debug for Tcb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tcb")
            .field("tid", &self.tid)
            .field("state", &self.state)
            .field("started", &self.entry.is_none())
            .field("stack", &self.stack)
            .finish()
    }
}

impl Tcb {
    pub fn tid(&self) -> Tid {
        self.tid
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ThreadState::Terminated
    }

    /// The stack, or `None` once the thread has terminated and its memory was reclaimed.
    pub fn stack(&self) -> Option<&Stack> {
        self.stack.as_ref()
    }

    /// True if a joiner already took the result.
    pub fn result_taken(&self) -> bool {
        matches!(self.result, ResultSlot::Taken)
    }

    pub(crate) fn set_state(&mut self, state: ThreadState) {
        debug!("[tcb] thread {}: {} -> {}", self.tid, self.state, state);
        self.state = state;
    }

    /// Hand out whatever the scheduler needs to run this thread's next turn.
    pub(crate) fn begin_turn(&mut self) -> Turn {
        if let Some(entry) = self.entry.take() {
            return Turn::Start(entry);
        }
        let frame = self
            .stack
            .as_mut()
            .and_then(|s| s.frame.take())
            .unwrap_or_else(|| {
                panic!(
                    "Invariant violation! Thread {} scheduled with neither an entry point nor a suspended frame",
                    self.tid
                )
            });
        Turn::Resume(frame)
    }

    /// Put back a continuation that suspended.
    pub(crate) fn suspend(&mut self, frame: Frame) {
        let stack = self
            .stack
            .as_mut()
            .expect("a suspending thread still owns its stack");
        debug_assert!(stack.frame.is_none());
        stack.frame = Some(frame);
    }

    /// Record the result. The stack is released here.
    fn terminate(&mut self, result: BoxedResult) -> Result<()> {
        if self.is_terminated() {
            return Err(Error::InvalidState {
                tid: self.tid,
                op: "terminate",
                reason: "thread already terminated".to_string(),
            });
        }
        self.set_state(ThreadState::Terminated);
        self.stack = None;
        self.result = ResultSlot::Full(result);
        Ok(())
    }

    /// Take the result out, exactly once.
    pub(crate) fn take_result(&mut self) -> Result<BoxedResult> {
        match std::mem::take(&mut self.result) {
            ResultSlot::Full(result) => {
                self.result = ResultSlot::Taken;
                Ok(result)
            }
            ResultSlot::Taken => {
                self.result = ResultSlot::Taken;
                Err(Error::InvalidState {
                    tid: self.tid,
                    op: "join",
                    reason: "result already consumed by an earlier join".to_string(),
                })
            }
            ResultSlot::Empty => Err(Error::InvalidState {
                tid: self.tid,
                op: "take the result of",
                reason: format!("thread is {}", self.state),
            }),
        }
    }
}

/// Identity of the store that allocated a thread, so ids from another runtime are never
/// mistaken for our own.
///
/// Holding the weak half keeps the token's allocation alive, so the address cannot be
/// handed to a newer store while any handle still refers to the old one.
#[derive(Debug, Clone)]
pub struct Generation(Weak<()>);

impl Generation {
    fn is_of(&self, token: &Rc<()>) -> bool {
        Weak::ptr_eq(&self.0, &Rc::downgrade(token))
    }
}

/// Owner of every thread control block in one runtime.
#[derive(Debug)]
pub struct TcbStore {
    next_tid: Tid,
    threads: BTreeMap<Tid, Tcb>,
    /// Threads allocated and not yet terminated.
    live: usize,
    max_threads: usize,
    stack_size: usize,
    token: Rc<()>,
}

impl TcbStore {
    pub fn new(max_threads: usize, stack_size: usize) -> Self {
        TcbStore {
            next_tid: Tid::FIRST,
            threads: BTreeMap::new(),
            live: 0,
            max_threads,
            stack_size,
            token: Rc::new(()),
        }
    }

    /// Allocate a thread control block for `entry`, whose continuation needs `frame_size`
    /// bytes. Fails without side effects when a limit would be exceeded.
    pub fn allocate(&mut self, entry: Entry, frame_size: usize) -> Result<Tid> {
        if self.live >= self.max_threads {
            return Err(Error::OutOfResources(Exhausted::Threads {
                limit: self.max_threads,
            }));
        }
        let stack = Stack::reserve(frame_size, self.stack_size)?;
        let tid = self.next_tid;
        self.next_tid = tid.next();
        self.live += 1;
        let old = self.threads.insert(
            tid,
            Tcb {
                tid,
                state: ThreadState::Created,
                entry: Some(entry),
                stack: Some(stack),
                result: ResultSlot::Empty,
            },
        );
        assert!(old.is_none()); // next_tid is monotonic
        debug!(
            "[tcb] allocated thread {} ({} of {} byte stack, {} live)",
            tid, frame_size, self.stack_size, self.live
        );
        Ok(tid)
    }

    pub fn get(&self, tid: Tid) -> Result<&Tcb> {
        self.threads.get(&tid).ok_or(Error::UnknownId(tid))
    }

    pub(crate) fn get_mut(&mut self, tid: Tid) -> Result<&mut Tcb> {
        self.threads.get_mut(&tid).ok_or(Error::UnknownId(tid))
    }

    /// Mark a thread terminated with its result, releasing its stack.
    pub(crate) fn terminate(&mut self, tid: Tid, result: BoxedResult) -> Result<()> {
        self.get_mut(tid)?.terminate(result)?;
        self.live -= 1;
        Ok(())
    }

    /// Drop a terminated thread's record. Its id stays retired.
    pub fn release(&mut self, tid: Tid) -> Result<()> {
        let tcb = self.get(tid)?;
        if !tcb.is_terminated() {
            return Err(Error::InvalidState {
                tid,
                op: "release",
                reason: format!("thread is {}", tcb.state()),
            });
        }
        self.threads.remove(&tid);
        debug!("[tcb] released thread {}", tid);
        Ok(())
    }

    /// Threads created and not yet terminated.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Records currently held, terminated or not.
    pub fn allocated_count(&self) -> usize {
        self.threads.len()
    }

    pub fn tids(&self) -> impl Iterator<Item = &Tid> {
        self.threads.keys()
    }

    pub fn generation(&self) -> Generation {
        Generation(Rc::downgrade(&self.token))
    }

    pub fn owns(&self, generation: &Generation) -> bool {
        generation.is_of(&self.token)
    }
}
