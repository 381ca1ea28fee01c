/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The create/join surface.
//!
//! [Runtime] is what the host program holds: it creates threads, joins them (running the
//! scheduler until the target terminates), and owns all scheduler state. [ThreadContext]
//! is what each managed thread receives as the first argument of its entry point: it
//! offers the same create/join pair from inside a thread, plus the explicit yield point.
//!
//! ```
//! use syrup::Runtime;
//!
//! let rt = Runtime::default();
//! let counter = rt.shared("counter", 0u32);
//! let handles: Vec<_> = (0..4)
//!     .map(|_| {
//!         let counter = counter.clone();
//!         rt.create(
//!             move |ctx, ()| async move {
//!                 let seen = counter.read();
//!                 ctx.yield_now().await;
//!                 counter.write(seen + 1);
//!             },
//!             (),
//!         )
//!         .unwrap()
//!     })
//!     .collect();
//! for h in &handles {
//!     rt.join(h).unwrap();
//! }
//! // Every thread read 0 before any of them wrote.
//! assert_eq!(counter.peek(), 1);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;
use std::rc::Weak;
use std::task::Context;
use std::task::Poll;

use syrup_model::config::Config;

use crate::error::Result;
use crate::hooks::Observer;
use crate::machine;
use crate::machine::Machine;
use crate::machine::SharedMachine;
use crate::shared::SharedVar;
use crate::tcb::BoxedResult;
use crate::tcb::Entry;
use crate::tcb::Generation;
use crate::tcb::ThreadState;
use crate::types::Schedule;
use crate::types::Tid;

/// A typed reference to a managed thread, used to join it.
///
/// Only `create` mints these, so the result type always matches the entry point.
pub struct JoinHandle<R> {
    tid: Tid,
    generation: Generation,
    _result: PhantomData<fn() -> R>,
}

impl<R> JoinHandle<R> {
    pub fn tid(&self) -> Tid {
        self.tid
    }
}

impl<R> Clone for JoinHandle<R> {
    fn clone(&self) -> Self {
        JoinHandle {
            tid: self.tid,
            generation: self.generation.clone(),
            _result: PhantomData,
        }
    }
}

impl<R> fmt::Debug for JoinHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JoinHandle").field(&self.tid).finish()
    }
}

/// Bind the argument to the entry point, erase the types, and report the size of the
/// continuation the entry point will need.
fn bind_entry<F, Fut, A, R>(entry: F, arg: A) -> (Entry, usize)
where
    F: FnOnce(ThreadContext, A) -> Fut + 'static,
    Fut: Future<Output = R> + 'static,
    A: 'static,
    R: 'static,
{
    let frame_size = std::mem::size_of::<Fut>();
    let entry: Entry = Box::new(move |ctx| {
        Box::pin(async move { Box::new(entry(ctx, arg).await) as BoxedResult })
    });
    (entry, frame_size)
}

fn create_in<F, Fut, A, R>(machine: &SharedMachine, entry: F, arg: A) -> Result<JoinHandle<R>>
where
    F: FnOnce(ThreadContext, A) -> Fut + 'static,
    Fut: Future<Output = R> + 'static,
    A: 'static,
    R: 'static,
{
    let (entry, frame_size) = bind_entry(entry, arg);
    let mut m = machine.borrow_mut();
    let tid = m.spawn(entry, frame_size)?;
    Ok(JoinHandle {
        tid,
        generation: m.store.generation(),
        _result: PhantomData,
    })
}

fn downcast<R: 'static>(result: BoxedResult) -> R {
    *result
        .downcast::<R>()
        .expect("JoinHandle<R> is only minted for entry points returning R")
}

/// A deterministic runtime for cooperative threads.
///
/// All state lives in this value: dropping the runtime drops every thread, finished or
/// not, along with whatever their continuations hold.
pub struct Runtime {
    machine: SharedMachine,
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new(Config::default())
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("machine", &self.machine.borrow())
            .finish()
    }
}

impl Runtime {
    /// A runtime scheduling by `config.sched_heuristic`. Any `replay_schedule_from` path is
    /// ignored here; see [Runtime::from_config].
    pub fn new(config: Config) -> Self {
        Runtime {
            machine: Rc::new(RefCell::new(Machine::new(config, None))),
        }
    }

    /// A runtime whose decisions follow `schedule` until it runs out, then FIFO.
    pub fn with_schedule(config: Config, schedule: Schedule) -> Self {
        Runtime {
            machine: Rc::new(RefCell::new(Machine::new(config, Some(schedule)))),
        }
    }

    /// Validate `config` and build a runtime from it, loading the schedule to replay if
    /// one is configured.
    pub fn from_config(config: Config) -> std::result::Result<Self, String> {
        config.validate()?;
        match &config.replay_schedule_from {
            Some(path) => {
                let schedule = Schedule::read_from_disk(path)?;
                Ok(Runtime::with_schedule(config, schedule))
            }
            None => Ok(Runtime::new(config)),
        }
    }

    pub fn config(&self) -> Config {
        self.machine.borrow().config.clone()
    }

    /// Create a thread running `entry(ctx, arg)`. Returns at once: the thread is ready but
    /// has not started.
    pub fn create<F, Fut, A, R>(&self, entry: F, arg: A) -> Result<JoinHandle<R>>
    where
        F: FnOnce(ThreadContext, A) -> Fut + 'static,
        Fut: Future<Output = R> + 'static,
        A: 'static,
        R: 'static,
    {
        create_in(&self.machine, entry, arg)
    }

    /// Create a thread running a plain function, which has no yield points.
    pub fn create_fn<F, A, R>(&self, f: F, arg: A) -> Result<JoinHandle<R>>
    where
        F: FnOnce(A) -> R + 'static,
        A: 'static,
        R: 'static,
    {
        self.create(move |_ctx, arg| async move { f(arg) }, arg)
    }

    /// Run the scheduler until `handle`'s thread has terminated and return its result.
    ///
    /// A result can be taken once; joining the same thread again fails with
    /// `InvalidState`. Must be called by the host, not from inside a managed thread.
    pub fn join<R: 'static>(&self, handle: &JoinHandle<R>) -> Result<R> {
        self.machine
            .borrow()
            .check_generation(handle.tid, &handle.generation)?;
        machine::run_until_terminated(&self.machine, handle.tid)?;
        let result = self.machine.borrow_mut().take_result(handle.tid)?;
        Ok(downcast(result))
    }

    /// Give turns until no thread is ready or running.
    pub fn run_until_idle(&self) -> Result<()> {
        machine::run_until_idle(&self.machine)
    }

    /// Drop the record of a terminated thread. Its id is never handed out again.
    pub fn release(&self, tid: Tid) -> Result<()> {
        self.machine.borrow_mut().store.release(tid)
    }

    pub fn state(&self, tid: Tid) -> Result<ThreadState> {
        Ok(self.machine.borrow().store.get(tid)?.state())
    }

    /// Make a variable whose reads and writes are reported to observers.
    pub fn shared<T>(&self, name: &str, init: T) -> SharedVar<T> {
        let var = self.machine.borrow_mut().hooks.register_var(name);
        SharedVar::new(var, init, Rc::downgrade(&self.machine))
    }

    pub fn add_observer(&self, observer: impl Observer + 'static) {
        self.machine
            .borrow_mut()
            .hooks
            .add_observer(Box::new(observer));
    }

    /// The decisions taken so far. Feeding this to [Runtime::with_schedule] reproduces
    /// the run.
    pub fn schedule(&self) -> Schedule {
        self.machine.borrow().sched.history().clone()
    }

    /// Scheduler turns taken so far.
    pub fn turn(&self) -> u64 {
        self.machine.borrow().sched.turn
    }

    /// Threads created and not yet terminated.
    pub fn live_threads(&self) -> usize {
        self.machine.borrow().store.live_count()
    }

    /// Thread records held, including terminated ones not yet released.
    pub fn allocated_threads(&self) -> usize {
        self.machine.borrow().store.allocated_count()
    }

    pub fn is_idle(&self) -> bool {
        self.machine.borrow().sched.is_idle()
    }

    /// How many replayed decisions named a thread that was not runnable.
    pub fn desyncs(&self) -> u64 {
        self.machine
            .borrow()
            .sched
            .replayer()
            .map_or(0, |r| r.desyncs())
    }
}

/// A managed thread's view of the runtime.
#[derive(Clone)]
pub struct ThreadContext {
    tid: Tid,
    machine: Weak<RefCell<Machine>>,
}

impl fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadContext")
            .field("tid", &self.tid)
            .finish()
    }
}

impl ThreadContext {
    pub(crate) fn new(tid: Tid, machine: Weak<RefCell<Machine>>) -> Self {
        ThreadContext { tid, machine }
    }

    fn machine(&self) -> SharedMachine {
        // Continuations are owned, and only ever polled, by a live machine.
        self.machine
            .upgrade()
            .expect("thread context used after its runtime was dropped")
    }

    /// The id of the thread this context belongs to.
    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// Give up the processor. The thread goes to the back of the run queue.
    pub fn yield_now(&self) -> YieldNow {
        YieldNow { yielded: false }
    }

    /// Wait for another thread to terminate and take its result.
    ///
    /// Fails at once with `DeadlockDetected` if the target is, transitively, waiting on
    /// this thread.
    pub fn join<R: 'static>(&self, handle: &JoinHandle<R>) -> Join<R> {
        Join {
            ctx: self.clone(),
            handle: handle.clone(),
            waiting: false,
        }
    }

    /// Create a thread from inside a thread. See [Runtime::create].
    pub fn create<F, Fut, A, R>(&self, entry: F, arg: A) -> Result<JoinHandle<R>>
    where
        F: FnOnce(ThreadContext, A) -> Fut + 'static,
        Fut: Future<Output = R> + 'static,
        A: 'static,
        R: 'static,
    {
        create_in(&self.machine(), entry, arg)
    }

    /// Create a thread running a plain function from inside a thread. See
    /// [Runtime::create_fn].
    pub fn create_fn<F, A, R>(&self, f: F, arg: A) -> Result<JoinHandle<R>>
    where
        F: FnOnce(A) -> R + 'static,
        A: 'static,
        R: 'static,
    {
        self.create(move |_ctx, arg| async move { f(arg) }, arg)
    }

    /// Make a shared variable from inside a thread. See [Runtime::shared].
    pub fn shared<T>(&self, name: &str, init: T) -> SharedVar<T> {
        let var = self.machine().borrow_mut().hooks.register_var(name);
        SharedVar::new(var, init, self.machine.clone())
    }
}

/// Future returned by [ThreadContext::yield_now].
#[derive(Debug)]
#[must_use = "yield points do nothing unless awaited"]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            Poll::Pending
        }
    }
}

/// Future returned by [ThreadContext::join].
///
/// Polling it while the target is still running asks for the thread to be parked once its
/// turn ends. Dropping it before it completes withdraws that request, so a join that is
/// polled and then abandoned leaves the thread running as if it had never been polled.
#[must_use = "joins do nothing unless awaited"]
pub struct Join<R> {
    ctx: ThreadContext,
    handle: JoinHandle<R>,
    waiting: bool,
}

impl<R: 'static> Future for Join<R> {
    type Output = Result<R>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<R>> {
        let this = self.get_mut();
        let target = this.handle.tid;
        let machine = this.ctx.machine();
        let mut m = machine.borrow_mut();
        m.check_generation(target, &this.handle.generation)?;
        if m.is_terminated(target)? {
            this.waiting = false;
            return Poll::Ready(m.take_result(target).map(downcast));
        }
        // The scheduler only resumes a parked thread once its target has terminated.
        m.block_on(this.ctx.tid, target)?;
        this.waiting = true;
        Poll::Pending
    }
}

impl<R> Drop for Join<R> {
    fn drop(&mut self) {
        if !self.waiting {
            return;
        }
        // Nothing to withdraw once the runtime itself is being torn down.
        let Some(machine) = self.ctx.machine.upgrade() else {
            return;
        };
        if let Ok(mut m) = machine.try_borrow_mut() {
            m.sched.cancel_block(self.ctx.tid, self.handle.tid);
        }
    }
}
