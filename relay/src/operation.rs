/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Per-operation state.
//!
//! An [`Operation`] is one registered thread of the program under test. The
//! kernel's operation map is the single owner of these records; operations
//! refer to each other by [`OpId`] only, never by reference. Every field is
//! mutated exclusively under the kernel lock.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Condvar;

use relay_model::OpId;
use relay_model::ResourceId;
use relay_model::WaitMode;

/// Lifecycle of an operation.
#[derive(PartialEq, Debug, Eq, Clone, Copy, Hash)]
pub enum OperationStatus {
    /// Created but not yet started.
    Created,
    /// Runnable; a member of the enabled set.
    Enabled,
    /// Waiting on a join target or a resource; not runnable.
    Blocked,
    /// Ran to completion (or was cancelled by detach).
    Completed,
}

/// The outstanding members of a set-valued wait, plus how it resolves.
#[derive(Debug, Clone)]
struct WaitSet<T> {
    pending: BTreeSet<T>,
    mode: WaitMode,
}

impl<T: Ord + Copy> WaitSet<T> {
    fn new(items: impl IntoIterator<Item = T>, mode: WaitMode) -> Self {
        Self {
            pending: items.into_iter().collect(),
            mode,
        }
    }

    /// Record that `item` was satisfied. Returns true iff the whole wait is
    /// now satisfied: immediately for `Any`, on the last member for `All`.
    fn satisfy(&mut self, item: &T) -> bool {
        if !self.pending.remove(item) {
            return false;
        }
        match self.mode {
            WaitMode::Any => true,
            WaitMode::All => self.pending.is_empty(),
        }
    }
}

/// One registered thread of execution in the program under test.
#[derive(Debug)]
pub struct Operation {
    /// The caller-supplied handle. Immutable.
    pub id: OpId,

    /// Where in its lifecycle this operation is.
    pub status: OperationStatus,

    /// True iff this operation currently holds the token. At most one
    /// operation in the kernel has this set.
    pub is_scheduled: bool,

    /// The operation's private wakeup channel. The owning OS thread parks on
    /// this condvar (paired with the kernel lock) whenever the operation does
    /// not hold the token.
    pub wakeup: Arc<Condvar>,

    /// Operations that have requested to join this one. Grows monotonically
    /// until this operation completes, then is drained.
    joiners: BTreeSet<OpId>,

    /// The join this operation is blocked on, if any.
    join_wait: Option<WaitSet<OpId>>,

    /// The resource wait this operation is blocked on, if any.
    resource_wait: Option<WaitSet<ResourceId>>,
}

impl Operation {
    /// A fresh operation in the `Created` state.
    pub fn new(id: OpId) -> Self {
        Self {
            id,
            status: OperationStatus::Created,
            is_scheduled: false,
            wakeup: Arc::new(Condvar::new()),
            joiners: BTreeSet::new(),
            join_wait: None,
            resource_wait: None,
        }
    }

    /// Reset a completed operation so its id can be used again.
    pub fn revive(&mut self) {
        debug_assert_eq!(self.status, OperationStatus::Completed);
        self.status = OperationStatus::Created;
        self.is_scheduled = false;
    }

    /// Record that `joiner` is waiting for this operation to complete.
    pub fn add_joiner(&mut self, joiner: OpId) {
        self.joiners.insert(joiner);
    }

    /// Drain the joiner set on completion.
    pub fn take_joiners(&mut self) -> BTreeSet<OpId> {
        std::mem::take(&mut self.joiners)
    }

    /// Block this operation on the completion of `targets`.
    pub fn join_on(&mut self, targets: impl IntoIterator<Item = OpId>, mode: WaitMode) {
        debug_assert!(self.join_wait.is_none());
        self.join_wait = Some(WaitSet::new(targets, mode));
    }

    /// One of this operation's join targets completed. Returns true iff the
    /// operation is now unblocked.
    pub fn on_join_complete(&mut self, completed: OpId) -> bool {
        let done = match &mut self.join_wait {
            None => return false,
            Some(wait) => wait.satisfy(&completed),
        };
        if done {
            self.join_wait = None;
        }
        done
    }

    /// Block this operation on signals for `resources`.
    pub fn wait_resources_on(
        &mut self,
        resources: impl IntoIterator<Item = ResourceId>,
        mode: WaitMode,
    ) {
        debug_assert!(self.resource_wait.is_none());
        self.resource_wait = Some(WaitSet::new(resources, mode));
    }

    /// One of this operation's awaited resources was signalled. Returns true
    /// iff the operation is now unblocked.
    pub fn on_resource_signal(&mut self, resource: ResourceId) -> bool {
        let done = match &mut self.resource_wait {
            None => return false,
            Some(wait) => wait.satisfy(&resource),
        };
        if done {
            self.resource_wait = None;
        }
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(raw: u64) -> OpId {
        OpId::from_raw(raw)
    }

    fn res(raw: u64) -> ResourceId {
        ResourceId::from_raw(raw)
    }

    #[test]
    fn join_any_unblocks_on_first_completion() {
        let mut o = Operation::new(op(9));
        o.join_on([op(1), op(2), op(3)], WaitMode::Any);
        assert!(o.on_join_complete(op(2)));
        // The wait is gone; later completions are ignored.
        assert!(!o.on_join_complete(op(1)));
    }

    #[test]
    fn join_all_unblocks_on_last_completion() {
        let mut o = Operation::new(op(9));
        o.join_on([op(1), op(2)], WaitMode::All);
        assert!(!o.on_join_complete(op(1)));
        assert!(o.on_join_complete(op(2)));
    }

    #[test]
    fn unrelated_completion_does_not_unblock() {
        let mut o = Operation::new(op(9));
        o.join_on([op(1)], WaitMode::Any);
        assert!(!o.on_join_complete(op(5)));
        assert!(o.on_join_complete(op(1)));
    }

    #[test]
    fn completion_without_a_wait_is_ignored() {
        let mut o = Operation::new(op(9));
        assert!(!o.on_join_complete(op(1)));
        assert!(!o.on_resource_signal(res(1)));
    }

    #[test]
    fn resource_wait_modes() {
        let mut o = Operation::new(op(9));
        o.wait_resources_on([res(1), res(2)], WaitMode::All);
        assert!(!o.on_resource_signal(res(2)));
        // Repeating the same signal does not double count.
        assert!(!o.on_resource_signal(res(2)));
        assert!(o.on_resource_signal(res(1)));

        o.wait_resources_on([res(1), res(2)], WaitMode::Any);
        assert!(o.on_resource_signal(res(1)));
    }

    #[test]
    fn joiners_accumulate_then_drain() {
        let mut o = Operation::new(op(9));
        o.add_joiner(op(1));
        o.add_joiner(op(2));
        o.add_joiner(op(1));
        let drained = o.take_joiners();
        assert_eq!(drained.into_iter().collect::<Vec<_>>(), vec![op(1), op(2)]);
        assert!(o.take_joiners().is_empty());
    }

    #[test]
    fn revive_resets_lifecycle() {
        let mut o = Operation::new(op(9));
        o.status = OperationStatus::Completed;
        o.is_scheduled = true;
        o.revive();
        assert_eq!(o.status, OperationStatus::Created);
        assert!(!o.is_scheduled);
    }
}
