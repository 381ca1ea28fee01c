/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! DETLOG entries: log lines that must come out the same on every run with the same
//! configuration and schedule.
//!
//! Every entry names the scheduler turn it belongs to, once as a structured `turn` field and
//! once as a `[turn N]` prefix of the message, so that the DETLOG lines of two runs can be
//! compared line by line and a mismatch points straight at the turn where they diverged.
//!
//! ```ignore
//! detlog!(turn; "scheduling thread {}", tid);       // INFO
//! detlog_debug!(turn; "SCHEDRAND: => {}", index);   // DEBUG
//! ```

/// Write a deterministic entry for scheduler turn `$turn` at INFO level.
#[macro_export]
macro_rules! detlog {
    (@$level:ident $turn:expr; $($arg:tt)+) => {{
        let turn: u64 = $turn;
        tracing::event!(
            tracing::Level::$level,
            turn,
            "DETLOG [turn {}] {}",
            turn,
            format_args!($($arg)+)
        );
    }};
    ($turn:expr; $($arg:tt)+) => {
        $crate::detlog!(@INFO $turn; $($arg)+)
    };
}

/// Like [detlog], but at DEBUG level, for entries too chatty to keep on by default.
#[macro_export]
macro_rules! detlog_debug {
    ($turn:expr; $($arg:tt)+) => {
        $crate::detlog!(@DEBUG $turn; $($arg)+)
    };
}
