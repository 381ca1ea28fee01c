/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Shared variables whose accesses are visible to observers.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::rc::Weak;

use crate::machine::Machine;
use crate::types::TraceOp;
use crate::types::VarId;

/// A value shared between managed threads (and the host).
///
/// Every `read` and `write` is reported as a [TraceEvent](crate::types::TraceEvent) tagged
/// with the accessing thread and the current step. Accesses never yield, so a
/// read-modify-write only races if the thread yields between the read and the write.
pub struct SharedVar<T> {
    id: VarId,
    cell: Rc<RefCell<T>>,
    machine: Weak<RefCell<Machine>>,
}

impl<T> Clone for SharedVar<T> {
    fn clone(&self) -> Self {
        SharedVar {
            id: self.id,
            cell: self.cell.clone(),
            machine: self.machine.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedVar")
            .field("id", &self.id)
            .field("value", &self.cell.borrow())
            .finish()
    }
}

impl<T> SharedVar<T> {
    pub(crate) fn new(id: VarId, init: T, machine: Weak<RefCell<Machine>>) -> Self {
        SharedVar {
            id,
            cell: Rc::new(RefCell::new(init)),
            machine,
        }
    }

    pub fn id(&self) -> VarId {
        self.id
    }

    fn record(&self, op: TraceOp) {
        // Once the runtime is gone there is nobody left to tell.
        if let Some(machine) = self.machine.upgrade() {
            let mut m = machine.borrow_mut();
            let tid = m.current();
            m.emit(tid, op);
        }
    }

    /// Store a new value.
    pub fn write(&self, value: T) {
        self.record(TraceOp::Write(self.id));
        *self.cell.borrow_mut() = value;
    }

    /// Read the value and store `f` of it, as one read followed by one write. Returns the
    /// stored value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> T
    where
        T: Clone,
    {
        let new = f(&self.read());
        self.write(new.clone());
        new
    }
}

impl<T: Clone> SharedVar<T> {
    /// Load the current value.
    pub fn read(&self) -> T {
        self.record(TraceOp::Read(self.id));
        self.cell.borrow().clone()
    }

    /// Load the current value without reporting an access.
    pub fn peek(&self) -> T {
        self.cell.borrow().clone()
    }
}
