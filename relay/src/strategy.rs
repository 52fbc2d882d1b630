/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Exploration strategies.
//!
//! A strategy answers three questions for the kernel: which enabled operation
//! runs next, and what the next controlled boolean/integer choice is. The
//! known strategies form a closed set, so dispatch is an enum rather than a
//! trait object.
//!
//! Strategies are only ever consulted by the token holder, under a lock, so
//! they need no internal synchronization.

pub mod pct;
pub mod random;

use relay_model::Config;
use relay_model::OpId;
use relay_model::StrategyKind;

use crate::scheduler::enabled_set::EnabledSet;
pub use pct::PctStrategy;
pub use random::RandomStrategy;

/// The exploration strategy driving one scheduler instance.
#[derive(Debug)]
pub enum Strategy {
    /// Probabilistic concurrency testing.
    Pct(PctStrategy),
    /// Uniform random choice.
    Random(RandomStrategy),
}

impl Strategy {
    /// Build the configured strategy, or `None` if exploration is disabled.
    pub fn from_config(cfg: &Config) -> Option<Strategy> {
        match cfg.strategy {
            StrategyKind::None => None,
            StrategyKind::Random => Some(Strategy::Random(RandomStrategy::new(cfg.seed))),
            StrategyKind::Pct => Some(Strategy::Pct(PctStrategy::new(cfg.seed, cfg.strategy_bound))),
        }
    }

    /// Pick the operation to run next from the enabled view. `current` is the
    /// operation holding the token. Must only be called with at least one
    /// enabled operation.
    pub fn next_operation(&mut self, enabled: &EnabledSet, current: OpId) -> OpId {
        match self {
            Strategy::Pct(s) => s.next_operation(enabled, current),
            Strategy::Random(s) => s.next_operation(enabled, current),
        }
    }

    /// The next controlled boolean choice.
    pub fn next_boolean(&mut self) -> bool {
        match self {
            Strategy::Pct(s) => s.next_boolean(),
            Strategy::Random(s) => s.next_boolean(),
        }
    }

    /// The next controlled integer choice in `[0, max_value)`.
    pub fn next_integer(&mut self, max_value: u64) -> u64 {
        match self {
            Strategy::Pct(s) => s.next_integer(max_value),
            Strategy::Random(s) => s.next_integer(max_value),
        }
    }

    /// The seed driving the current iteration, for reproduction.
    pub fn random_seed(&self) -> u64 {
        match self {
            Strategy::Pct(s) => s.random_seed(),
            Strategy::Random(s) => s.random_seed(),
        }
    }

    /// Reset per-iteration state. Called once per new iteration at attach,
    /// from the second iteration onwards.
    pub fn prepare_next_iteration(&mut self, iteration: u64) {
        match self {
            Strategy::Pct(s) => s.prepare_next_iteration(iteration),
            Strategy::Random(s) => s.prepare_next_iteration(iteration),
        }
    }
}
