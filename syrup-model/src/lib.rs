/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Widely-shared type definitions.
//!
//! Nothing in here schedules anything. These are the identities, records and options that
//! the engine, the command line tool and any external analysis tooling all agree on, and
//! they all serialize so they can cross process boundaries as JSON.

pub mod collections;
pub mod config;
pub mod event;
pub mod schedule;
pub mod tid;
