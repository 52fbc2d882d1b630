/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Scheduler configuration.

use std::fmt;
use std::str::FromStr;

use clap::Parser;
use serde::Deserialize;
use serde::Serialize;

/// Configuration options for a relay scheduler instance.
#[derive(Debug, Serialize, Deserialize, Clone, Parser)]
pub struct Config {
    /// Which exploration strategy drives scheduling decisions. `none`
    /// disables the scheduler entirely: every entry point reports
    /// `SchedulerDisabled`.
    #[clap(long, default_value = "random", value_name = "str")]
    pub strategy: StrategyKind,

    /// Bound parameter of the strategy. For `pct` this is the maximum number
    /// of priority-change events per iteration.
    #[clap(long, default_value = "3", value_name = "uint")]
    pub strategy_bound: u64,

    /// Use this number to seed the PRNG that supplies scheduling and data
    /// nondeterminism. A fixed seed reproduces the exact schedule.
    #[clap(long, env = "RELAY_SEED", default_value = "0", value_name = "uint64")]
    pub seed: u64,
}

impl Config {
    /// Sanity check the flags.
    pub fn validate(&self) {
        if self.strategy != StrategyKind::Pct && self.strategy_bound != 3 {
            tracing::warn!("--strategy-bound only has an effect with --strategy=pct");
        }
    }
}

/// N.B. we don't want to specify two different notions of "default", so we go
/// through the clap parser.
impl Default for Config {
    fn default() -> Self {
        let v: Vec<String> = vec![];
        Config::parse_from(v.iter())
    }
}

/// The exploration strategy to use when scheduling operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StrategyKind {
    /// Don't control scheduling at all; the scheduler is disabled.
    None,
    /// Uniformly pick any enabled operation at every decision point.
    Random,
    /// Probabilistic concurrency testing: priority scheduling with randomized
    /// priority-change points.
    Pct,
}

impl Default for StrategyKind {
    fn default() -> Self {
        StrategyKind::Random
    }
}

// Lame to not derive this, but even `derive_more` won't do enums.
impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(StrategyKind::None),
            "random" => Ok(StrategyKind::Random),
            "pct" => Ok(StrategyKind::Pct),
            _ => Err(format!("Expected None|Random|Pct, could not parse: {:?}", s)),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            StrategyKind::None => "none",
            StrategyKind::Random => "random",
            StrategyKind::Pct => "pct",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_come_from_the_parser() {
        let cfg = Config::default();
        assert_eq!(cfg.strategy, StrategyKind::Random);
        assert_eq!(cfg.strategy_bound, 3);
        assert_eq!(cfg.seed, 0);
    }

    #[test]
    fn parses_flags() {
        let cfg = Config::parse_from(["relay", "--strategy", "pct", "--strategy-bound", "10", "--seed", "42"]);
        assert_eq!(cfg.strategy, StrategyKind::Pct);
        assert_eq!(cfg.strategy_bound, 10);
        assert_eq!(cfg.seed, 42);
    }

    #[test]
    fn strategy_kind_is_case_insensitive() {
        assert_eq!("PCT".parse::<StrategyKind>().unwrap(), StrategyKind::Pct);
        assert_eq!("None".parse::<StrategyKind>().unwrap(), StrategyKind::None);
        assert!("dfs".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn config_serializes() {
        let cfg = Config::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.strategy, cfg.strategy);
        assert_eq!(back.seed, cfg.seed);
    }
}
