/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Syrup runs cooperative threads deterministically, so that the interleavings behind a data
//! race can be reproduced, recorded, replayed, and searched.
//!
//! Threads are created with [Runtime::create] and joined with [Runtime::join]. Only one
//! thread runs at a time and it keeps the processor until it yields
//! ([ThreadContext::yield_now]), blocks on a join, or terminates. The order among ready
//! threads is FIFO by default; it can instead be randomized from a seed or dictated by a
//! recorded [Schedule](types::Schedule).

#![deny(clippy::all)]
#![allow(clippy::uninlined_format_args)]

pub mod detlog;
pub mod error;
pub mod explore;
pub mod hooks;
pub mod lifecycle;
mod machine;
pub mod scheduler;
pub mod shared;
pub mod tcb;
pub mod types;

pub use error::Error;
pub use error::Exhausted;
pub use error::Result;
pub use hooks::Observer;
pub use hooks::Recorder;
pub use lifecycle::JoinHandle;
pub use lifecycle::Runtime;
pub use lifecycle::ThreadContext;
pub use shared::SharedVar;
pub use syrup_model::config::Config;
pub use syrup_model::config::SchedHeuristic;
pub use tcb::ThreadState;
