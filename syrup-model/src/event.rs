/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::tid::Tid;

// Trace events
//--------------------------------------------------------------------------------

/// The logical step counter: the number of scheduling turns taken so far.
pub type Step = u64;

/// Identity of a variable the client designated as shared.
#[derive(
    PartialEq,
    Debug,
    Eq,
    Clone,
    Copy,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
pub struct VarId(u32);

impl VarId {
    /// Create a VarId from a raw integer.
    pub const fn from_raw(id: u32) -> VarId {
        VarId(id)
    }

    /// Convert to a raw integer.
    pub fn as_raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// One observable thing that happened during a run: either a lifecycle transition of a
/// managed thread, or an access to a shared variable.
#[derive(PartialEq, Debug, Eq, Clone, Hash, Serialize, Deserialize)]
pub struct TraceEvent {
    /// The scheduler turn during which the event happened.
    pub step: Step,
    /// The thread the event is about. Accesses from outside any managed thread carry
    /// [Tid::HOST].
    pub tid: Tid,
    /// What happened.
    pub op: TraceOp,
}

impl TraceEvent {
    pub fn new(step: Step, tid: Tid, op: TraceOp) -> Self {
        TraceEvent { step, tid, op }
    }

    /// True for `Read` and `Write` events.
    pub fn is_access(&self) -> bool {
        matches!(self.op, TraceOp::Read(_) | TraceOp::Write(_))
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[step {}] tid {} {}", self.step, self.tid, self.op)
    }
}

/// The kinds of [TraceEvent].
#[derive(PartialEq, Debug, Eq, Copy, Clone, Hash, Serialize, Deserialize)]
pub enum TraceOp {
    /// A thread control block was allocated.
    Created,
    /// The thread was picked by the scheduler and is now running.
    Scheduled,
    /// The thread gave up the processor but remains runnable.
    Yielded,
    /// The thread is parked until the given thread terminates.
    Blocked(Tid),
    /// The entry point returned.
    Terminated,
    /// A shared variable was read.
    Read(VarId),
    /// A shared variable was written.
    Write(VarId),
}

impl fmt::Display for TraceOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TraceOp::Created => write!(f, "created"),
            TraceOp::Scheduled => write!(f, "scheduled"),
            TraceOp::Yielded => write!(f, "yielded"),
            TraceOp::Blocked(on) => write!(f, "blocked on {}", on),
            TraceOp::Terminated => write!(f, "terminated"),
            TraceOp::Read(var) => write!(f, "read {}", var),
            TraceOp::Write(var) => write!(f, "write {}", var),
        }
    }
}

/// A complete interleaving record: the events in the order they happened, plus the names
/// the client gave its shared variables.
#[derive(PartialEq, Default, Debug, Eq, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub vars: BTreeMap<VarId, String>,
    pub events: Vec<TraceEvent>,
}

impl Trace {
    /// Only the shared-variable accesses, in order.
    pub fn accesses(&self) -> impl Iterator<Item = &TraceEvent> {
        self.events.iter().filter(|e| e.is_access())
    }

    /// Only the events concerning one thread, in order.
    pub fn for_thread(&self, tid: Tid) -> impl Iterator<Item = &TraceEvent> {
        self.events.iter().filter(move |e| e.tid == tid)
    }

    /// Canonical JSON rendering. Two runs under the same schedule render identically.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("trace is always serializable")
    }
}
