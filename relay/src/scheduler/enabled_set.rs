/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The ordered set of schedulable operations.
//!
//! Members are traversed in insertion order, which must be deterministic for
//! a given sequence of mutations so that strategies depending on it remain
//! reproducible. Disabling keeps a member in place (its slot is retained for
//! deadlock detection and its position is preserved for when it is
//! re-enabled); removal erases it entirely.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;

use relay_model::OpId;

/// The insertion turn of a member. Turns increase monotonically across the
/// life of the set, so they double as unique, order-preserving keys.
type Turn = u64;

#[derive(Debug, Copy, Clone)]
struct Member {
    id: OpId,
    enabled: bool,
}

/// Insertion-ordered set of operation ids with an enabled/disabled flag per
/// member, O(1) membership, and deterministic indexed traversal of the
/// enabled view.
#[derive(Debug, Default)]
pub struct EnabledSet {
    /// We use a "flattened" map keyed by a global monotone turn (rather than
    /// a Vec) so that removal from the middle does not shift positions and
    /// each member keeps a stable global key for its whole membership.
    members: BTreeMap<Turn, Member>,

    /// Reverse index for O(1) membership tests.
    index: HashMap<OpId, Turn>,

    last_turn: Turn,
}

impl EnabledSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` as an enabled member at the back of the traversal order.
    ///
    /// Inserting an id that is already a member is an invariant violation.
    pub fn insert(&mut self, id: OpId) {
        assert!(
            !self.index.contains_key(&id),
            "tried to add {} to the enabled set, but it's already present:\n{}",
            id,
            self
        );
        self.last_turn += 1;
        let turn = self.last_turn;
        self.members.insert(turn, Member { id, enabled: true });
        self.index.insert(id, turn);
    }

    /// Flip a member back to enabled, in place. Order is preserved.
    pub fn enable(&mut self, id: OpId) {
        self.member_mut(id).enabled = true;
    }

    /// Flip a member to disabled, in place. The member still counts towards
    /// the total size, which is how blocked-but-alive operations are told
    /// apart from a finished schedule.
    pub fn disable(&mut self, id: OpId) {
        self.member_mut(id).enabled = false;
    }

    /// Erase a member entirely.
    pub fn remove(&mut self, id: OpId) {
        let turn = self
            .index
            .remove(&id)
            .unwrap_or_else(|| panic!("tried to remove {} from the enabled set, but it's absent", id));
        self.members.remove(&turn);
    }

    /// True iff `id` is a member (enabled or disabled).
    pub fn contains(&self, id: OpId) -> bool {
        self.index.contains_key(&id)
    }

    /// True iff `id` is a member and currently enabled.
    pub fn is_enabled(&self, id: OpId) -> bool {
        self.index
            .get(&id)
            .map(|turn| self.members[turn].enabled)
            .unwrap_or(false)
    }

    /// The number of enabled members.
    pub fn enabled_count(&self) -> usize {
        self.members.values().filter(|m| m.enabled).count()
    }

    /// The number of members, enabled or not.
    pub fn total_count(&self) -> usize {
        self.members.len()
    }

    /// Traverse the enabled members in insertion order.
    pub fn iter_enabled(&self) -> impl Iterator<Item = OpId> + '_ {
        self.members.values().filter(|m| m.enabled).map(|m| m.id)
    }

    /// The `idx`-th enabled member in insertion order, if any.
    pub fn nth_enabled(&self, idx: usize) -> Option<OpId> {
        self.iter_enabled().nth(idx)
    }

    /// Drop every member. Used on detach.
    pub fn clear(&mut self) {
        self.members.clear();
        self.index.clear();
    }

    fn member_mut(&mut self, id: OpId) -> &mut Member {
        let turn = self
            .index
            .get(&id)
            .unwrap_or_else(|| panic!("operation {} is not in the enabled set", id));
        self.members.get_mut(turn).expect("index points at a live member")
    }
}

/// A multi-line print of the set.
impl fmt::Display for EnabledSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Enabled set, enabled={}, total={}:",
            self.enabled_count(),
            self.total_count(),
        )?;
        for (turn, m) in self.members.iter() {
            writeln!(f, "    (t: {}, op: {}, enabled: {})", turn, m.id, m.enabled)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(raw: u64) -> OpId {
        OpId::from_raw(raw)
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut set = EnabledSet::new();
        set.insert(op(3));
        set.insert(op(1));
        set.insert(op(2));
        let order: Vec<OpId> = set.iter_enabled().collect();
        assert_eq!(order, vec![op(3), op(1), op(2)]);
        assert_eq!(set.nth_enabled(1), Some(op(1)));
    }

    #[test]
    fn disable_retains_membership_and_position() {
        let mut set = EnabledSet::new();
        set.insert(op(1));
        set.insert(op(2));
        set.insert(op(3));
        set.disable(op(2));
        assert_eq!(set.enabled_count(), 2);
        assert_eq!(set.total_count(), 3);
        assert!(set.contains(op(2)));
        assert!(!set.is_enabled(op(2)));

        set.enable(op(2));
        let order: Vec<OpId> = set.iter_enabled().collect();
        assert_eq!(order, vec![op(1), op(2), op(3)]);
    }

    #[test]
    fn remove_erases_entirely() {
        let mut set = EnabledSet::new();
        set.insert(op(1));
        set.insert(op(2));
        set.remove(op(1));
        assert!(!set.contains(op(1)));
        assert_eq!(set.total_count(), 1);
        // The id can rejoin, at the back.
        set.insert(op(1));
        let order: Vec<OpId> = set.iter_enabled().collect();
        assert_eq!(order, vec![op(2), op(1)]);
    }

    #[test]
    #[should_panic]
    fn double_insert_is_an_invariant_violation() {
        let mut set = EnabledSet::new();
        set.insert(op(1));
        set.insert(op(1));
    }

    #[test]
    fn counts_distinguish_blocked_from_finished() {
        let mut set = EnabledSet::new();
        set.insert(op(1));
        set.disable(op(1));
        // Blocked-but-alive: no enabled members, but a nonzero total.
        assert_eq!(set.enabled_count(), 0);
        assert_eq!(set.total_count(), 1);
        set.remove(op(1));
        assert_eq!(set.total_count(), 0);
    }
}
