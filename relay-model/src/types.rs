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

// Operation/resource handles:
//--------------------------------------------------------------------------------

/// Caller-supplied handle for one registered operation (a thread of execution
/// in the program under test). Stable for the operation's lifetime.
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
pub struct OpId(u64);

impl OpId {
    /// The reserved id of the main operation, created implicitly on attach.
    pub const MAIN: OpId = OpId(0);

    /// Create an OpId from a raw integer.
    pub const fn from_raw(id: u64) -> OpId {
        OpId(id)
    }

    /// Convert to a raw integer.
    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for OpId {
    fn from(id: u64) -> Self {
        OpId(id)
    }
}

impl FromStr for OpId {
    type Err = <u64 as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_raw(s.parse::<u64>()?))
    }
}

/// Caller-supplied handle for a waitable resource (a stand-in for a
/// synchronization object in the program under test).
#[derive(
    PartialEq, Debug, Eq, Clone, Copy, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Create a ResourceId from a raw integer.
    pub const fn from_raw(id: u64) -> ResourceId {
        ResourceId(id)
    }

    /// Convert to a raw integer.
    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for ResourceId {
    fn from(id: u64) -> Self {
        ResourceId(id)
    }
}

impl FromStr for ResourceId {
    type Err = <u64 as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_raw(s.parse::<u64>()?))
    }
}

/// How a set-valued join or resource wait resolves: on the first member, or
/// only once every member has been satisfied.
#[derive(PartialEq, Debug, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum WaitMode {
    /// Unblock on the first completion/signal of any member.
    Any,
    /// Unblock only when every member has completed/been signalled.
    All,
}
