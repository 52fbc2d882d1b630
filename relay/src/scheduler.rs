/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The serializing scheduler kernel.
//!
//! One mutex guards all kernel state. Every entry point takes it on entry and
//! releases it before returning; the only suspension points are condvar waits
//! (the per-operation wakeup channels and the pending-start gate), which
//! release the lock while parked and re-acquire it on wake. Exactly one
//! operation holds the token at any time; handing it over means marking the
//! next operation scheduled, signalling its wakeup channel, and parking the
//! previous one until the token comes back around.
//!
//! The kernel is an instance, not a singleton: a harness may run several
//! kernels side by side. The token-holder convention makes the kernel lock
//! non-reentrant — an operation must never call back into the kernel from
//! within an entry point.

pub mod enabled_set;

use std::collections::BTreeMap;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;

use relay_model::Config;
use relay_model::ErrorCode;
use relay_model::OpId;
use relay_model::ResourceId;
use relay_model::SchedulerError;
use relay_model::WaitMode;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::operation::Operation;
use crate::operation::OperationStatus;
use crate::resources::ResourceTable;
use crate::schedlog;
use crate::schedlog_debug;
use crate::scheduler::enabled_set::EnabledSet;
use crate::strategy::Strategy;

/// The result of a kernel entry point. The end of the schedule is an
/// outcome, not an error: `schedule_next` reports it as `Ok`.
pub type KernelResult<T = ()> = Result<T, SchedulerError>;

const POISONED: &str = "kernel lock poisoned";

type State<'a> = MutexGuard<'a, KernelState>;

/// Everything the kernel lock protects.
#[derive(Debug)]
struct KernelState {
    /// Map id -> operation; the single owner of all operation records.
    operations: BTreeMap<OpId, Operation>,

    /// The operations the strategy is allowed to pick from, plus disabled
    /// (blocked) members retained for deadlock detection.
    enabled: EnabledSet,

    /// Map id -> blocked waiter set.
    resources: ResourceTable,

    /// The operation currently holding the token.
    scheduled_id: OpId,

    /// Created-but-not-yet-started operations. `schedule_next` refuses to
    /// pick a winner while this is nonzero.
    pending_start_count: u64,

    /// True between attach and detach.
    is_attached: bool,

    /// Count of attaches over the kernel's lifetime.
    iteration: u64,

    /// The last failure recorded by an entry point.
    last_error: ErrorCode,

    /// The token holders of the current iteration, in order. Reset at
    /// attach; the record of what a seed reproduces.
    schedule_trace: Vec<OpId>,
}

/// A controlled-concurrency scheduler instance.
#[derive(Debug)]
pub struct Scheduler {
    state: Mutex<KernelState>,

    /// Signalled when `pending_start_count` drops to zero.
    pending_started: Condvar,

    /// The exploration strategy, behind its own lock so that the data-choice
    /// entry points (`next_boolean`, `next_integer`) never touch the kernel
    /// lock. `None` means exploration is disabled by configuration.
    strategy: Option<Mutex<Strategy>>,
}

fn record_err(st: &mut KernelState, err: SchedulerError) -> KernelResult {
    st.last_error = err.into();
    trace!("[kernel] entry point failed: {}", err);
    Err(err)
}

impl Scheduler {
    /// Create a new scheduler based on the configuration.
    pub fn new(cfg: &Config) -> Self {
        cfg.validate();
        let strategy = Strategy::from_config(cfg);
        if strategy.is_none() {
            info!("[kernel] exploration disabled by configuration");
        }
        Scheduler {
            state: Mutex::new(KernelState {
                operations: BTreeMap::new(),
                enabled: EnabledSet::new(),
                resources: ResourceTable::default(),
                scheduled_id: OpId::MAIN,
                pending_start_count: 0,
                is_attached: false,
                iteration: 0,
                last_error: ErrorCode::Success,
                schedule_trace: Vec::new(),
            }),
            pending_started: Condvar::new(),
            strategy: strategy.map(Mutex::new),
        }
    }

    /// Begin a testing iteration. Creates and starts the main operation,
    /// which becomes the token holder.
    pub fn attach(&self) -> KernelResult {
        let mut st = self.begin()?;
        if st.is_attached {
            return record_err(&mut st, SchedulerError::ClientAttached);
        }
        st.is_attached = true;
        st.iteration += 1;
        st.last_error = ErrorCode::Success;
        st.schedule_trace.clear();
        let iteration = st.iteration;
        info!("[kernel] attach: iteration {}", iteration);

        if iteration > 1 {
            // The first iteration has no knowledge of the execution, so the
            // strategy only resets from the second iteration onwards.
            self.lock_strategy().prepare_next_iteration(iteration);
        }

        self.create_operation_inner(&mut st, OpId::MAIN)
            .expect("a fresh iteration accepts the main operation");
        st.schedule_trace.push(OpId::MAIN);
        schedlog!("iteration {}: token starts at operation {}", iteration, OpId::MAIN);
        self.start_operation_inner(st, OpId::MAIN)
    }

    /// End a testing iteration. Completes the main operation and cancels
    /// every other live operation; their parked entry points unwind with
    /// `ClientNotAttached`.
    pub fn detach(&self) -> KernelResult {
        let mut st = self.begin()?;
        if !st.is_attached {
            return record_err(&mut st, SchedulerError::ClientNotAttached);
        }
        st.is_attached = false;
        info!("[kernel] detach: iteration {} over, releasing all operations", st.iteration);

        if let Some(main) = st.operations.get_mut(&OpId::MAIN) {
            main.status = OperationStatus::Completed;
        }
        if st.enabled.contains(OpId::MAIN) {
            st.enabled.disable(OpId::MAIN);
        }

        let ids: Vec<OpId> = st.operations.keys().copied().collect();
        for id in ids {
            let wakeup = {
                let op = st.operations.get_mut(&id).expect("listed id is present");
                if op.status == OperationStatus::Completed {
                    continue;
                }
                debug!("[kernel] detach cancels operation {}", id);
                op.is_scheduled = true;
                op.status = OperationStatus::Completed;
                op.wakeup.clone()
            };
            // Created-but-never-started operations have no enabled-set slot.
            if st.enabled.contains(id) {
                st.enabled.disable(id);
            }
            wakeup.notify_all();
        }

        st.operations.clear();
        st.enabled.clear();
        st.resources.clear();
        st.pending_start_count = 0;
        Ok(())
    }

    /// Announce a new operation. The caller must start it (on the
    /// operation's own thread) before the next scheduling decision.
    pub fn create_operation(&self, id: OpId) -> KernelResult {
        let mut st = self.begin_attached()?;
        trace!("[kernel] create_operation {}", id);
        if id == OpId::MAIN {
            return record_err(&mut st, SchedulerError::MainOperationExplicitlyCreated);
        }
        match self.create_operation_inner(&mut st, id) {
            Ok(()) => Ok(()),
            Err(err) => record_err(&mut st, err),
        }
    }

    /// Start executing the operation with the specified id. Returns to the
    /// caller only once the strategy has granted this operation the token.
    pub fn start_operation(&self, id: OpId) -> KernelResult {
        let mut st = self.begin_attached()?;
        trace!("[kernel] start_operation {}", id);
        if id == OpId::MAIN {
            return record_err(&mut st, SchedulerError::MainOperationExplicitlyStarted);
        }
        self.start_operation_inner(st, id)
    }

    /// Complete the operation with the specified id, wake any joiners whose
    /// wait is satisfied, and pass the token onwards.
    pub fn complete_operation(&self, id: OpId) -> KernelResult {
        let mut st = self.begin_attached()?;
        trace!("[kernel] complete_operation {}", id);
        if id == OpId::MAIN {
            return record_err(&mut st, SchedulerError::MainOperationExplicitlyCompleted);
        }
        match st.operations.get(&id).map(|op| op.status) {
            None => return record_err(&mut st, SchedulerError::NotExistingOperation),
            Some(OperationStatus::Completed) => {
                return record_err(&mut st, SchedulerError::OperationAlreadyCompleted);
            }
            Some(OperationStatus::Created) => {
                return record_err(&mut st, SchedulerError::OperationNotStarted);
            }
            Some(OperationStatus::Enabled) | Some(OperationStatus::Blocked) => {}
        }

        let joiners = {
            let op = st.operations.get_mut(&id).expect("status was just read");
            op.status = OperationStatus::Completed;
            op.take_joiners()
        };
        st.enabled.remove(id);

        for joiner in joiners {
            let unblocked = st
                .operations
                .get_mut(&joiner)
                .map(|j| j.on_join_complete(id))
                .unwrap_or(false);
            if unblocked {
                st.operations.get_mut(&joiner).expect("joiner is registered").status =
                    OperationStatus::Enabled;
                st.enabled.enable(joiner);
                debug!("[kernel] operation {} unblocked by completion of {}", joiner, id);
            }
        }

        self.schedule_next_inner(st)
    }

    /// Block the caller until `target` completes. Returns immediately (token
    /// kept) if it already has.
    pub fn join_operation(&self, target: OpId) -> KernelResult {
        self.join_operations(&[target], WaitMode::All)
    }

    /// Block the caller until any/all of `targets` complete. Already-completed
    /// targets are filtered out first; if nothing remains the caller keeps
    /// the token.
    pub fn join_operations(&self, targets: &[OpId], mode: WaitMode) -> KernelResult {
        let mut st = self.begin_attached()?;
        trace!("[kernel] join {} operations ({:?})", targets.len(), mode);
        for target in targets {
            if !st.operations.contains_key(target) {
                return record_err(&mut st, SchedulerError::NotExistingOperation);
            }
        }

        let caller = st.scheduled_id;
        let residual: Vec<OpId> = targets
            .iter()
            .copied()
            .filter(|t| {
                st.operations.get(t).expect("existence was just checked").status
                    != OperationStatus::Completed
            })
            .collect();
        if residual.is_empty() {
            debug!("[kernel] join targets already completed; {} keeps the token", caller);
            return Ok(());
        }

        for target in &residual {
            st.operations
                .get_mut(target)
                .expect("existence was just checked")
                .add_joiner(caller);
        }
        {
            let caller_op = st
                .operations
                .get_mut(&caller)
                .expect("the token holder is registered");
            caller_op.join_on(residual.iter().copied(), mode);
            caller_op.status = OperationStatus::Blocked;
        }
        st.enabled.disable(caller);

        self.schedule_next_inner(st)
    }

    /// Create a waitable resource.
    pub fn create_resource(&self, id: ResourceId) -> KernelResult {
        let mut st = self.begin_attached()?;
        trace!("[kernel] create_resource {}", id);
        match st.resources.create(id) {
            Ok(()) => Ok(()),
            Err(err) => record_err(&mut st, err),
        }
    }

    /// Destroy a resource.
    pub fn delete_resource(&self, id: ResourceId) -> KernelResult {
        let mut st = self.begin_attached()?;
        trace!("[kernel] delete_resource {}", id);
        match st.resources.delete(id) {
            Ok(()) => Ok(()),
            Err(err) => record_err(&mut st, err),
        }
    }

    /// Block the caller until the resource is signalled.
    pub fn wait_resource(&self, id: ResourceId) -> KernelResult {
        self.wait_resources(&[id], WaitMode::All)
    }

    /// Block the caller until any/all of `ids` are signalled. Existence is
    /// checked before any state changes, so an error leaves the caller
    /// enabled and scheduled.
    pub fn wait_resources(&self, ids: &[ResourceId], mode: WaitMode) -> KernelResult {
        let mut st = self.begin_attached()?;
        trace!("[kernel] wait for {} resources ({:?})", ids.len(), mode);
        for id in ids {
            if !st.resources.contains(*id) {
                return record_err(&mut st, SchedulerError::NotExistingResource);
            }
        }

        let caller = st.scheduled_id;
        for id in ids {
            st.resources
                .get_mut(*id)
                .expect("existence was just checked")
                .add_waiter(caller);
        }
        {
            let caller_op = st
                .operations
                .get_mut(&caller)
                .expect("the token holder is registered");
            caller_op.wait_resources_on(ids.iter().copied(), mode);
            caller_op.status = OperationStatus::Blocked;
        }
        st.enabled.disable(caller);

        self.schedule_next_inner(st)
    }

    /// Wake every operation blocked on the resource whose wait predicate is
    /// now satisfied, and clear the resource's blocked set. Signalling does
    /// not pass the token; the caller stays scheduled.
    pub fn signal_resource(&self, id: ResourceId) -> KernelResult {
        let mut st = self.begin_attached()?;
        trace!("[kernel] signal_resource {}", id);
        let waiters = match st.resources.get_mut(id) {
            Err(err) => return record_err(&mut st, err),
            Ok(resource) => resource.drain_waiters(),
        };
        for waiter in waiters {
            deliver_signal(&mut st, id, waiter);
        }
        Ok(())
    }

    /// Wake at most the one named operation blocked on the resource.
    pub fn signal_resource_for(&self, id: ResourceId, waiter: OpId) -> KernelResult {
        let mut st = self.begin_attached()?;
        trace!("[kernel] signal_resource {} for operation {}", id, waiter);
        let was_blocked = match st.resources.get_mut(id) {
            Err(err) => return record_err(&mut st, err),
            Ok(resource) => resource.remove_waiter(waiter),
        };
        if was_blocked {
            deliver_signal(&mut st, id, waiter);
        }
        Ok(())
    }

    /// Yield: let the strategy pick the next operation to run, which may be
    /// the caller itself.
    pub fn schedule_next(&self) -> KernelResult {
        let st = self.begin_attached()?;
        self.schedule_next_inner(st)
    }

    /// Controlled nondeterministic boolean choice. Token-holder only; does
    /// not take the kernel lock.
    pub fn next_boolean(&self) -> KernelResult<bool> {
        match &self.strategy {
            None => Err(SchedulerError::SchedulerDisabled),
            Some(strategy) => Ok(strategy.lock().expect(POISONED).next_boolean()),
        }
    }

    /// Controlled nondeterministic integer choice in `[0, max_value)`.
    /// Token-holder only; does not take the kernel lock.
    pub fn next_integer(&self, max_value: u64) -> KernelResult<u64> {
        match &self.strategy {
            None => Err(SchedulerError::SchedulerDisabled),
            Some(strategy) => Ok(strategy.lock().expect(POISONED).next_integer(max_value)),
        }
    }

    /// The seed driving the current iteration, for reproduction.
    pub fn random_seed(&self) -> KernelResult<u64> {
        match &self.strategy {
            None => Err(SchedulerError::SchedulerDisabled),
            Some(strategy) => Ok(strategy.lock().expect(POISONED).random_seed()),
        }
    }

    /// The id of the operation currently holding the token.
    pub fn scheduled_operation_id(&self) -> OpId {
        self.lock_state().scheduled_id
    }

    /// The last error code recorded by an entry point.
    pub fn last_error(&self) -> ErrorCode {
        self.lock_state().last_error
    }

    /// How many iterations have attached so far.
    pub fn iteration(&self) -> u64 {
        self.lock_state().iteration
    }

    /// True between attach and detach.
    pub fn is_attached(&self) -> bool {
        self.lock_state().is_attached
    }

    /// The token holders of the current iteration so far, in order. For a
    /// fixed configuration and client this sequence is identical across runs.
    pub fn schedule_trace(&self) -> Vec<OpId> {
        self.lock_state().schedule_trace.clone()
    }

    /// Where the given operation is in its lifecycle, if it is registered.
    pub fn operation_status(&self, id: OpId) -> Option<OperationStatus> {
        self.lock_state().operations.get(&id).map(|op| op.status)
    }

    fn lock_state(&self) -> State<'_> {
        self.state.lock().expect(POISONED)
    }

    fn lock_strategy(&self) -> MutexGuard<'_, Strategy> {
        self.strategy
            .as_ref()
            .expect("exploration was checked to be enabled")
            .lock()
            .expect(POISONED)
    }

    /// Take the kernel lock, failing if exploration is disabled.
    fn begin(&self) -> Result<State<'_>, SchedulerError> {
        let mut st = self.lock_state();
        if self.strategy.is_none() {
            let _ = record_err(&mut st, SchedulerError::SchedulerDisabled);
            return Err(SchedulerError::SchedulerDisabled);
        }
        Ok(st)
    }

    /// Take the kernel lock, failing if exploration is disabled or no
    /// iteration is attached.
    fn begin_attached(&self) -> Result<State<'_>, SchedulerError> {
        let mut st = self.begin()?;
        if !st.is_attached {
            let _ = record_err(&mut st, SchedulerError::ClientNotAttached);
            return Err(SchedulerError::ClientNotAttached);
        }
        Ok(st)
    }

    fn create_operation_inner(&self, st: &mut KernelState, id: OpId) -> Result<(), SchedulerError> {
        match st.operations.get_mut(&id) {
            Some(existing) => {
                if existing.status != OperationStatus::Completed {
                    return Err(SchedulerError::DuplicateOperation);
                }
                // A completed id may be used again.
                existing.revive();
            }
            None => {
                st.operations.insert(id, Operation::new(id));
                if st.operations.len() == 1 {
                    // The very first operation gets the token outright.
                    st.scheduled_id = id;
                    st.operations.get_mut(&id).expect("just inserted").is_scheduled = true;
                }
            }
        }
        st.pending_start_count += 1;
        debug!("[kernel] created operation {}; {} pending start", id, st.pending_start_count);
        Ok(())
    }

    fn start_operation_inner(&self, mut st: State<'_>, id: OpId) -> KernelResult {
        match st.operations.get(&id).map(|op| op.status) {
            None => return record_err(&mut st, SchedulerError::NotExistingOperation),
            Some(OperationStatus::Completed) => {
                return record_err(&mut st, SchedulerError::OperationAlreadyCompleted);
            }
            Some(OperationStatus::Enabled) | Some(OperationStatus::Blocked) => {
                return record_err(&mut st, SchedulerError::OperationAlreadyStarted);
            }
            Some(OperationStatus::Created) => {}
        }

        st.pending_start_count -= 1;
        debug!("[kernel] start_operation {}: {} operations pending", id, st.pending_start_count);
        if st.pending_start_count == 0 {
            // Release anyone gated on pending starts in schedule_next.
            self.pending_started.notify_all();
        }

        let wakeup = {
            let op = st.operations.get_mut(&id).expect("status was just read");
            op.status = OperationStatus::Enabled;
            op.wakeup.clone()
        };
        st.enabled.insert(id);
        // No-op on a fresh operation; relevant when a revived id restarts.
        wakeup.notify_all();

        self.park_while_unscheduled(st, id, &wakeup)
    }

    /// The heart: gate on pending starts, detect the end of the schedule or
    /// a deadlock, consult the strategy, and hand the token over.
    fn schedule_next_inner(&self, mut st: State<'_>) -> KernelResult {
        // Wait for any recently created operations to start. Scheduling
        // before they enter the enabled set would hide them from the
        // strategy.
        while st.pending_start_count > 0 {
            trace!("[kernel] waiting on {} pending operations", st.pending_start_count);
            st = self.pending_started.wait(st).expect(POISONED);
        }

        if st.enabled.enabled_count() == 0 {
            if st.enabled.total_count() > 0 {
                info!("[kernel] deadlock detected:\n{}", st.enabled);
                return record_err(&mut st, SchedulerError::DeadlockDetected);
            }
            debug!("[kernel] schedule exhausted; no operation left to run");
            return Ok(());
        }

        let current = st.scheduled_id;
        let next = self.lock_strategy().next_operation(&st.enabled, current);
        debug_assert!(st.enabled.is_enabled(next), "strategy picked a non-enabled operation");
        st.scheduled_id = next;
        st.schedule_trace.push(next);
        schedlog_debug!("token {} -> {}", current, next);

        if next == current {
            return Ok(());
        }

        // Resume the next operation.
        let next_wakeup = {
            let op = st
                .operations
                .get_mut(&next)
                .expect("strategy picked a registered operation");
            op.is_scheduled = true;
            op.wakeup.clone()
        };
        next_wakeup.notify_all();

        // Pause the previous one, unless it has completed.
        let prev_wakeup = {
            let op = st
                .operations
                .get_mut(&current)
                .expect("the previous token holder is registered");
            if op.status == OperationStatus::Completed {
                None
            } else {
                op.is_scheduled = false;
                Some(op.wakeup.clone())
            }
        };
        match prev_wakeup {
            None => Ok(()),
            Some(wakeup) => self.park_while_unscheduled(st, current, &wakeup),
        }
    }

    /// Park the calling thread until its operation holds the token again.
    /// Unwinds with `ClientNotAttached` if the iteration is cancelled while
    /// parked.
    fn park_while_unscheduled(&self, mut st: State<'_>, id: OpId, wakeup: &Condvar) -> KernelResult {
        loop {
            let scheduled = st
                .operations
                .get(&id)
                .map(|op| op.is_scheduled)
                .unwrap_or(true);
            if scheduled {
                return Ok(());
            }
            trace!("[kernel] parking operation {}", id);
            st = wakeup.wait(st).expect(POISONED);
            trace!("[kernel] operation {} resumed", id);
            if !st.is_attached {
                return record_err(&mut st, SchedulerError::ClientNotAttached);
            }
        }
    }
}

fn deliver_signal(st: &mut KernelState, id: ResourceId, waiter: OpId) {
    let unblocked = st
        .operations
        .get_mut(&waiter)
        .map(|op| op.on_resource_signal(id))
        .unwrap_or(false);
    if unblocked {
        st.operations
            .get_mut(&waiter)
            .expect("waiter is registered")
            .status = OperationStatus::Enabled;
        st.enabled.enable(waiter);
        debug!("[kernel] operation {} unblocked by resource {}", waiter, id);
    }
}
