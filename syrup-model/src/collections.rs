/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Small collections shared between the scheduler and the tools around it.

use std::collections::VecDeque;
use std::iter::FromIterator;

/// A queue of upcoming decisions, consumed front to back while replaying a schedule.
///
/// It is an [Iterator] that also knows when it has run dry, which the replayer reports
/// once before handing decisions back to the scheduler's own policy.
#[derive(Debug, Clone, Default)]
pub struct ReplayCursor<T> {
    inner_data: VecDeque<T>,
}

impl<T> ReplayCursor<T> {
    /// True once every item has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.inner_data.is_empty()
    }
}

impl<T> Iterator for ReplayCursor<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner_data.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.inner_data.len(), Some(self.inner_data.len()))
    }
}

impl<T> FromIterator<T> for ReplayCursor<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            inner_data: iter.into_iter().collect(),
        }
    }
}
