/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The client stub: the embedded kernel surface, one request per call.

use std::io;
use std::net::TcpStream;
use std::net::ToSocketAddrs;
use std::sync::Mutex;

use relay::KernelResult;
use relay_model::wire::Reply;
use relay_model::wire::Request;
use relay_model::ErrorCode;
use relay_model::OpId;
use relay_model::ResourceId;
use relay_model::SchedulerError;
use relay_model::WaitMode;
use tracing::warn;

use crate::codec::FramedStream;
use crate::Transport;

/// A scheduler client talking to a remote kernel instance.
///
/// Calls that park (start, join, wait, yield) park the whole connection, so
/// each thread of the program under test needs a stub with its own
/// connection, all sharing one scheduler instance id.
#[derive(Debug)]
pub struct RemoteScheduler<T> {
    scheduler_id: String,
    transport: Mutex<T>,
}

impl RemoteScheduler<FramedStream<TcpStream>> {
    /// Connect to a scheduler host over TCP.
    pub fn connect(addr: impl ToSocketAddrs, scheduler_id: impl Into<String>) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self::new(FramedStream::new(stream), scheduler_id))
    }
}

impl<T: Transport> RemoteScheduler<T> {
    /// Wrap an established transport.
    pub fn new(transport: T, scheduler_id: impl Into<String>) -> Self {
        Self {
            scheduler_id: scheduler_id.into(),
            transport: Mutex::new(transport),
        }
    }

    /// The instance id every request of this stub names.
    pub fn scheduler_id(&self) -> &str {
        &self.scheduler_id
    }

    fn id(&self) -> String {
        self.scheduler_id.clone()
    }

    /// Begin a testing iteration.
    pub fn attach(&self) -> KernelResult {
        self.call(Request::Attach { scheduler_id: self.id() })
    }

    /// End a testing iteration.
    pub fn detach(&self) -> KernelResult {
        self.call(Request::Detach { scheduler_id: self.id() })
    }

    /// Announce a new operation.
    pub fn create_operation(&self, operation_id: OpId) -> KernelResult {
        self.call(Request::CreateOperation {
            scheduler_id: self.id(),
            operation_id,
        })
    }

    /// Start an operation; returns once it holds the token.
    pub fn start_operation(&self, operation_id: OpId) -> KernelResult {
        self.call(Request::StartOperation {
            scheduler_id: self.id(),
            operation_id,
        })
    }

    /// Complete an operation and pass the token onwards.
    pub fn complete_operation(&self, operation_id: OpId) -> KernelResult {
        self.call(Request::CompleteOperation {
            scheduler_id: self.id(),
            operation_id,
        })
    }

    /// Block until the target operation completes.
    pub fn join_operation(&self, operation_id: OpId) -> KernelResult {
        self.call(Request::JoinOperation {
            scheduler_id: self.id(),
            operation_id,
        })
    }

    /// Block until any/all of the target operations complete.
    pub fn join_operations(&self, operation_ids: &[OpId], mode: WaitMode) -> KernelResult {
        self.call(Request::JoinOperations {
            scheduler_id: self.id(),
            operation_ids: operation_ids.to_vec(),
            mode,
        })
    }

    /// Create a waitable resource.
    pub fn create_resource(&self, resource_id: ResourceId) -> KernelResult {
        self.call(Request::CreateResource {
            scheduler_id: self.id(),
            resource_id,
        })
    }

    /// Destroy a resource.
    pub fn delete_resource(&self, resource_id: ResourceId) -> KernelResult {
        self.call(Request::DeleteResource {
            scheduler_id: self.id(),
            resource_id,
        })
    }

    /// Block until the resource is signalled.
    pub fn wait_resource(&self, resource_id: ResourceId) -> KernelResult {
        self.call(Request::WaitResource {
            scheduler_id: self.id(),
            resource_id,
        })
    }

    /// Block until any/all of the resources are signalled.
    pub fn wait_resources(&self, resource_ids: &[ResourceId], mode: WaitMode) -> KernelResult {
        self.call(Request::WaitResources {
            scheduler_id: self.id(),
            resource_ids: resource_ids.to_vec(),
            mode,
        })
    }

    /// Wake every satisfied waiter of the resource.
    pub fn signal_resource(&self, resource_id: ResourceId) -> KernelResult {
        self.call(Request::SignalResource {
            scheduler_id: self.id(),
            resource_id,
        })
    }

    /// Wake at most the one named waiter of the resource.
    pub fn signal_resource_for(&self, resource_id: ResourceId, operation_id: OpId) -> KernelResult {
        self.call(Request::SignalResourceFor {
            scheduler_id: self.id(),
            resource_id,
            operation_id,
        })
    }

    /// Yield: let the strategy pick the next operation.
    pub fn schedule_next(&self) -> KernelResult {
        self.call(Request::ScheduleNext { scheduler_id: self.id() })
    }

    /// Controlled nondeterministic boolean choice.
    pub fn next_boolean(&self) -> KernelResult<bool> {
        let value = self.call_value(Request::NextBoolean { scheduler_id: self.id() })?;
        Ok(value != 0)
    }

    /// Controlled nondeterministic integer choice in `[0, max_value)`.
    pub fn next_integer(&self, max_value: u64) -> KernelResult<u64> {
        self.call_value(Request::NextInteger {
            scheduler_id: self.id(),
            max_value,
        })
    }

    /// The seed driving the current iteration.
    pub fn random_seed(&self) -> KernelResult<u64> {
        self.call_value(Request::RandomSeed { scheduler_id: self.id() })
    }

    /// The id of the operation currently holding the token.
    pub fn scheduled_operation_id(&self) -> KernelResult<OpId> {
        let value = self.call_value(Request::ScheduledOperationId { scheduler_id: self.id() })?;
        Ok(OpId::from_raw(value))
    }

    /// The last error code the instance recorded.
    pub fn last_error(&self) -> KernelResult<ErrorCode> {
        let value = self.call_value(Request::LastError { scheduler_id: self.id() })?;
        Ok(ErrorCode::from_u32(value as u32))
    }

    fn call(&self, request: Request) -> KernelResult {
        self.round_trip(request).map(|_| ())
    }

    fn call_value(&self, request: Request) -> KernelResult<u64> {
        let value = self.round_trip(request)?;
        // A value-bearing entry point that succeeds always fills the value.
        value.ok_or(SchedulerError::Failure)
    }

    fn round_trip(&self, request: Request) -> KernelResult<Option<u64>> {
        let reply: Reply = {
            let mut transport = self.transport.lock().expect("transport lock poisoned");
            match transport.round_trip(&request) {
                Ok(reply) => reply,
                Err(err) => {
                    warn!("[client] transport failure: {}", err);
                    return Err(SchedulerError::Failure);
                }
            }
        };
        match reply.code().as_error() {
            None => Ok(reply.value),
            Some(err) => Err(err),
        }
    }
}
