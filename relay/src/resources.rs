/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The resource table: waitable handles standing in for the synchronization
//! objects of the program under test.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use relay_model::OpId;
use relay_model::ResourceId;
use relay_model::SchedulerError;

/// A waitable condition, e.g. a semaphore slot or an event.
#[derive(Debug, Default)]
pub struct Resource {
    /// Operations currently blocked waiting on this resource.
    blocked: BTreeSet<OpId>,
}

impl Resource {
    /// Record `waiter` as blocked on this resource.
    pub fn add_waiter(&mut self, waiter: OpId) {
        self.blocked.insert(waiter);
    }

    /// Remove one waiter; returns true iff it was present.
    pub fn remove_waiter(&mut self, waiter: OpId) -> bool {
        self.blocked.remove(&waiter)
    }

    /// Take every blocked waiter, leaving the resource empty.
    pub fn drain_waiters(&mut self) -> BTreeSet<OpId> {
        std::mem::take(&mut self.blocked)
    }

    /// The number of operations blocked on this resource.
    pub fn waiter_count(&self) -> usize {
        self.blocked.len()
    }
}

/// Map from resource id to the operations blocked on it.
///
/// NB: BTreeMap over HashMap for deterministic iteration and printing.
#[derive(Debug, Default)]
pub struct ResourceTable {
    map: BTreeMap<ResourceId, Resource>,
}

impl ResourceTable {
    /// Register a new resource.
    pub fn create(&mut self, id: ResourceId) -> Result<(), SchedulerError> {
        if self.map.contains_key(&id) {
            return Err(SchedulerError::DuplicateResource);
        }
        self.map.insert(id, Resource::default());
        Ok(())
    }

    /// Destroy a resource, discarding any blocked-waiter bookkeeping.
    pub fn delete(&mut self, id: ResourceId) -> Result<(), SchedulerError> {
        match self.map.remove(&id) {
            None => Err(SchedulerError::NotExistingResource),
            Some(_) => Ok(()),
        }
    }

    /// Look up a resource for mutation.
    pub fn get_mut(&mut self, id: ResourceId) -> Result<&mut Resource, SchedulerError> {
        self.map
            .get_mut(&id)
            .ok_or(SchedulerError::NotExistingResource)
    }

    /// True iff the resource exists.
    pub fn contains(&self, id: ResourceId) -> bool {
        self.map.contains_key(&id)
    }

    /// The number of registered resources.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True iff no resources are registered.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop every resource. Used on detach.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(raw: u64) -> ResourceId {
        ResourceId::from_raw(raw)
    }

    #[test]
    fn create_delete_round_trip() {
        let mut table = ResourceTable::default();
        table.create(rid(1)).unwrap();
        assert_eq!(
            table.create(rid(1)),
            Err(SchedulerError::DuplicateResource)
        );
        table.delete(rid(1)).unwrap();
        assert!(table.is_empty());
        // Deleting restored the table: the id can be created again.
        table.create(rid(1)).unwrap();
    }

    #[test]
    fn missing_resource_is_an_error() {
        let mut table = ResourceTable::default();
        assert_eq!(table.delete(rid(7)), Err(SchedulerError::NotExistingResource));
        assert!(table.get_mut(rid(7)).is_err());
    }

    #[test]
    fn waiters_drain() {
        let mut table = ResourceTable::default();
        table.create(rid(1)).unwrap();
        let r = table.get_mut(rid(1)).unwrap();
        r.add_waiter(OpId::from_raw(3));
        r.add_waiter(OpId::from_raw(4));
        assert_eq!(r.waiter_count(), 2);
        let drained = r.drain_waiters();
        assert_eq!(drained.len(), 2);
        assert_eq!(table.get_mut(rid(1)).unwrap().waiter_count(), 0);
    }

    #[test]
    fn targeted_removal() {
        let mut table = ResourceTable::default();
        table.create(rid(1)).unwrap();
        let r = table.get_mut(rid(1)).unwrap();
        r.add_waiter(OpId::from_raw(3));
        assert!(r.remove_waiter(OpId::from_raw(3)));
        assert!(!r.remove_waiter(OpId::from_raw(3)));
    }
}
