/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Probabilistic concurrency testing (PCT).
//!
//! Every operation gets a random priority; the highest-priority enabled
//! operation always runs. At a bounded number of randomly chosen step
//! indices (the *change points*) the current highest-priority operation is
//! demoted to the tail. A bug that needs `d` specific ordering constraints is
//! found with probability at least `1/(n * k^(d-1))` for `n` total steps and
//! `k` operations, which is what makes the strategy effective with a small
//! change-point budget.

use rand::seq::SliceRandom;
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use std::collections::BTreeSet;
use std::collections::HashSet;

use relay_model::OpId;

use crate::scheduler::enabled_set::EnabledSet;
use crate::schedlog_debug;

/// PCT strategy state for one scheduler instance.
#[derive(Debug)]
pub struct PctStrategy {
    /// The pseudo-random generator.
    rng: Pcg64Mcg,

    /// The seed used by the current iteration.
    iteration_seed: u64,

    /// Max number of priority switches during one iteration.
    max_priority_switches: u64,

    /// Operation ids from highest priority (front) to lowest (back).
    priority_list: Vec<OpId>,

    /// Operations that already have a priority.
    known_ops: HashSet<OpId>,

    /// Step indices at which the highest-priority operation is demoted.
    change_points: BTreeSet<u64>,

    /// Number of scheduling decisions during the current iteration.
    scheduled_steps: u64,

    /// Running maximum of `scheduled_steps` across all iterations; bounds the
    /// pool from which change points are drawn.
    schedule_length: u64,
}

impl PctStrategy {
    /// A fresh strategy with the given seed and change-point budget.
    pub fn new(seed: u64, max_priority_switches: u64) -> Self {
        Self {
            rng: Pcg64Mcg::seed_from_u64(seed),
            iteration_seed: seed,
            max_priority_switches,
            priority_list: Vec::new(),
            known_ops: HashSet::new(),
            change_points: BTreeSet::new(),
            scheduled_steps: 0,
            schedule_length: 0,
        }
    }

    /// Pick the next operation: assign priorities to any newly-seen ids,
    /// demote the top if this step is a change point, and return the
    /// highest-priority enabled id.
    pub fn next_operation(&mut self, enabled: &EnabledSet, current: OpId) -> OpId {
        self.set_new_operation_priorities(enabled, current);
        self.try_deprioritize_top(enabled);
        self.scheduled_steps += 1;
        self.highest_priority_enabled(enabled)
    }

    /// The next controlled boolean choice.
    pub fn next_boolean(&mut self) -> bool {
        self.scheduled_steps += 1;
        self.rng.gen::<u64>() & 1 == 1
    }

    /// The next controlled integer choice in `[0, max_value)`.
    pub fn next_integer(&mut self, max_value: u64) -> u64 {
        assert!(max_value > 0, "next_integer requires a nonzero bound");
        self.scheduled_steps += 1;
        self.rng.gen::<u64>() % max_value
    }

    /// The seed used in the current iteration.
    pub fn random_seed(&self) -> u64 {
        self.iteration_seed
    }

    /// Record the schedule length, reset per-iteration state, and draw a new
    /// set of change points. The first iteration has no knowledge of the
    /// execution, so the kernel only calls this from the second iteration
    /// onwards (which also means iteration one runs with no change points).
    pub fn prepare_next_iteration(&mut self, iteration: u64) {
        if self.schedule_length < self.scheduled_steps {
            self.schedule_length = self.scheduled_steps;
        }
        self.scheduled_steps = 0;
        self.priority_list.clear();
        self.known_ops.clear();
        self.change_points.clear();
        self.shuffle_change_points();
        schedlog_debug!(
            "pct: iteration {} starts with schedule_length {} and {} change points",
            iteration,
            self.schedule_length,
            self.change_points.len()
        );
    }

    /// Give a priority to every enabled operation that doesn't have one yet.
    /// New operations land at a uniform slot in `[1, len]`, so they never
    /// displace the current head immediately.
    fn set_new_operation_priorities(&mut self, enabled: &EnabledSet, current: OpId) {
        if self.priority_list.is_empty() {
            self.priority_list.push(current);
            self.known_ops.insert(current);
            schedlog_debug!("pct: operation {} takes priority slot 0", current);
        }

        for id in enabled.iter_enabled() {
            if self.known_ops.insert(id) {
                // Slot len is a plain append.
                let slot = self.rng.gen_range(1..=self.priority_list.len());
                self.priority_list.insert(slot, id);
                schedlog_debug!("pct: operation {} takes priority slot {}", id, slot);
            }
        }
    }

    /// Demote the highest-priority enabled operation to the tail, if this
    /// step is a change point and a choice actually exists.
    fn try_deprioritize_top(&mut self, enabled: &EnabledSet) -> bool {
        if enabled.enabled_count() <= 1 {
            // Nothing to do, there is only one enabled operation available.
            return false;
        }
        if !self.change_points.contains(&self.scheduled_steps) {
            return false;
        }

        let top = self.highest_priority_enabled(enabled);
        self.priority_list.retain(|id| *id != top);
        self.priority_list.push(top);
        schedlog_debug!(
            "pct: operation {} is deprioritized at step {}",
            top,
            self.scheduled_steps
        );
        true
    }

    /// Scan the priority list front-to-back for the first enabled id.
    fn highest_priority_enabled(&self, enabled: &EnabledSet) -> OpId {
        for id in &self.priority_list {
            if enabled.is_enabled(*id) {
                return *id;
            }
        }
        panic!("no enabled operation has a priority; the kernel must not consult the strategy with an empty enabled set");
    }

    /// Fisher–Yates over `[1, schedule_length)`; the first
    /// `max_priority_switches` elements become the change points.
    fn shuffle_change_points(&mut self) {
        if self.schedule_length > 1 {
            let mut range: Vec<u64> = (1..self.schedule_length).collect();
            range.shuffle(&mut self.rng);
            for point in range
                .into_iter()
                .take(self.max_priority_switches as usize)
            {
                self.change_points.insert(point);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(raw: u64) -> OpId {
        OpId::from_raw(raw)
    }

    fn set_of(ids: &[u64]) -> EnabledSet {
        let mut set = EnabledSet::new();
        for id in ids {
            set.insert(op(*id));
        }
        set
    }

    #[test]
    fn new_operations_never_preempt_the_current_head() {
        let mut pct = PctStrategy::new(11, 0);
        let enabled = set_of(&[0, 1, 2, 3]);
        // 0 is the current operation, so it seeds slot 0; everyone else lands
        // at slot >= 1 and the head wins the first decision.
        assert_eq!(pct.next_operation(&enabled, op(0)), op(0));
    }

    #[test]
    fn falls_through_to_the_first_enabled_priority() {
        let mut pct = PctStrategy::new(11, 0);
        let mut enabled = set_of(&[0, 1, 2]);
        assert_eq!(pct.next_operation(&enabled, op(0)), op(0));
        enabled.disable(op(0));
        let next = pct.next_operation(&enabled, op(0));
        assert_ne!(next, op(0));
        assert!(enabled.is_enabled(next));
    }

    #[test]
    fn decisions_are_deterministic_for_a_fixed_seed() {
        let run = |seed: u64| -> Vec<OpId> {
            let mut pct = PctStrategy::new(seed, 2);
            let mut trace = Vec::new();
            for round in 0..3 {
                let mut enabled = set_of(&[0, 1, 2, 3]);
                if round == 1 {
                    enabled.disable(op(0));
                }
                for _ in 0..5 {
                    trace.push(pct.next_operation(&enabled, op(0)));
                }
                pct.prepare_next_iteration(round + 2);
            }
            trace
        };
        assert_eq!(run(42), run(42));
        assert_ne!(run(42), run(43));
    }

    #[test]
    fn change_points_respect_the_bound_and_the_length() {
        let mut pct = PctStrategy::new(7, 3);
        let enabled = set_of(&[0, 1]);
        for _ in 0..20 {
            pct.next_operation(&enabled, op(0));
        }
        pct.prepare_next_iteration(2);
        assert_eq!(pct.schedule_length, 20);
        assert!(pct.change_points.len() <= 3);
        assert!(!pct.change_points.is_empty());
        for point in &pct.change_points {
            assert!((1..20).contains(point));
        }
    }

    #[test]
    fn first_iteration_has_no_change_points() {
        let pct = PctStrategy::new(7, 3);
        assert!(pct.change_points.is_empty());
    }

    #[test]
    fn schedule_length_is_monotone() {
        let mut pct = PctStrategy::new(7, 1);
        let enabled = set_of(&[0, 1]);
        for _ in 0..10 {
            pct.next_operation(&enabled, op(0));
        }
        pct.prepare_next_iteration(2);
        assert_eq!(pct.schedule_length, 10);
        for _ in 0..4 {
            pct.next_operation(&enabled, op(0));
        }
        pct.prepare_next_iteration(3);
        // A shorter iteration does not shrink the watermark.
        assert_eq!(pct.schedule_length, 10);
    }

    #[test]
    fn a_change_point_demotes_the_head_exactly_once() {
        let mut pct = PctStrategy::new(5, 1);
        let enabled = set_of(&[0, 1]);
        for _ in 0..10 {
            assert_eq!(pct.next_operation(&enabled, op(0)), op(0));
        }
        pct.prepare_next_iteration(2);
        let cp = *pct.change_points.iter().next().expect("one change point");

        let decisions: Vec<OpId> = (0..10).map(|_| pct.next_operation(&enabled, op(0))).collect();
        for (step, decision) in decisions.iter().enumerate() {
            // The change point compares against the pre-increment counter, so
            // the demotion lands on decision number `cp`.
            let expected = if (step as u64) < cp { op(0) } else { op(1) };
            assert_eq!(*decision, expected, "decision {}", step);
        }
    }

    #[test]
    fn no_demotion_with_a_single_enabled_operation() {
        let mut pct = PctStrategy::new(5, 1);
        let both = set_of(&[0, 1]);
        for _ in 0..10 {
            pct.next_operation(&both, op(0));
        }
        pct.prepare_next_iteration(2);
        // Only one enabled operation: change points are skipped entirely.
        let mut lone = set_of(&[0, 1]);
        lone.disable(op(1));
        for _ in 0..10 {
            assert_eq!(pct.next_operation(&lone, op(0)), op(0));
        }
    }

    #[test]
    fn choices_consume_scheduling_steps() {
        let mut pct = PctStrategy::new(3, 0);
        let _ = pct.next_boolean();
        let _ = pct.next_integer(10);
        assert_eq!(pct.scheduled_steps, 2);
        let v = pct.next_integer(10);
        assert!(v < 10);
    }

    #[test]
    fn random_seed_reports_the_iteration_seed() {
        let pct = PctStrategy::new(99, 0);
        assert_eq!(pct.random_seed(), 99);
    }
}
