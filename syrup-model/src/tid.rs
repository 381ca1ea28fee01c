/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

// Deterministic thread ids:
//--------------------------------------------------------------------------------

/// Identity of a managed thread.
///
/// Ids are handed out in creation order starting from 1 and are never reused within a
/// runtime. The value 0 is reserved for the host context, i.e. whoever drives the
/// runtime from outside of any managed thread.
#[derive(
    PartialEq, // Silly protection from rustfmt disagreements.
    Debug,
    Eq,
    Clone,
    Copy,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Default,
)]
#[serde(transparent)]
pub struct Tid(u64);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Tid {
    /// The host context. Never allocated to a managed thread.
    pub const HOST: Tid = Tid(0);

    /// The first id handed out to a managed thread.
    pub const FIRST: Tid = Tid(1);

    /// Create a Tid from a raw integer.
    pub const fn from_raw(tid: u64) -> Tid {
        Tid(tid)
    }

    /// Convert to a raw integer.
    pub fn as_raw(&self) -> u64 {
        self.0
    }

    /// True for the reserved host id.
    pub fn is_host(&self) -> bool {
        *self == Tid::HOST
    }

    /// The id that follows this one.
    pub fn next(&self) -> Tid {
        Tid(self.0 + 1)
    }
}

impl FromStr for Tid {
    type Err = <u64 as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_raw(s.parse::<u64>()?))
    }
}
