/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Instrumentation hooks for external race analysis.
//!
//! Every lifecycle transition and every access to a shared variable is turned into a
//! [TraceEvent] and handed to each registered [Observer], in registration order.
//! Observers run while the runtime is mid-operation and must not call back into it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::trace;

use crate::types::Trace;
use crate::types::TraceEvent;
use crate::types::VarId;

/// Receives the interleaving as it happens.
pub trait Observer {
    /// Called once per event.
    fn on_event(&mut self, event: &TraceEvent);

    /// Called once per shared variable, when it is created or, for variables created before
    /// the observer was registered, at registration.
    fn on_var(&mut self, _var: VarId, _name: &str) {}
}

/// An observer that keeps the whole trace in memory.
///
/// Cloning gives another handle onto the same trace, so a test can keep one handle and
/// give the other to the runtime.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    trace: Rc<RefCell<Trace>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of everything recorded so far.
    pub fn trace(&self) -> Trace {
        self.trace.borrow().clone()
    }

    /// The number of events recorded so far.
    pub fn len(&self) -> usize {
        self.trace.borrow().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Observer for Recorder {
    fn on_event(&mut self, event: &TraceEvent) {
        self.trace.borrow_mut().events.push(event.clone());
    }

    fn on_var(&mut self, var: VarId, name: &str) {
        self.trace.borrow_mut().vars.insert(var, name.to_string());
    }
}

/// The runtime's registry of observers and shared variable names.
#[derive(Default)]
pub(crate) struct Hooks {
    observers: Vec<Box<dyn Observer>>,
    vars: BTreeMap<VarId, String>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("observers", &self.observers.len())
            .field("vars", &self.vars)
            .finish()
    }
}

impl Hooks {
    pub(crate) fn add_observer(&mut self, mut observer: Box<dyn Observer>) {
        for (var, name) in &self.vars {
            observer.on_var(*var, name);
        }
        self.observers.push(observer);
    }

    /// Assign the next variable id and announce it.
    pub(crate) fn register_var(&mut self, name: &str) -> VarId {
        let var = VarId::from_raw(self.vars.len() as u32);
        self.vars.insert(var, name.to_string());
        for observer in &mut self.observers {
            observer.on_var(var, name);
        }
        var
    }

    pub(crate) fn emit(&mut self, event: TraceEvent) {
        trace!("[hooks] {}", event);
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }
}
