/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Wire messages for the remote scheduler boundary.
//!
//! The protocol is a symmetric request/reply: every request names the target
//! scheduler instance and carries the parameters of exactly one kernel entry
//! point; every reply carries the numeric error code, plus a value for the
//! entry points that return one. There is no streaming and there are no push
//! notifications.

use serde::Deserialize;
use serde::Serialize;

use crate::error::ErrorCode;
use crate::types::OpId;
use crate::types::ResourceId;
use crate::types::WaitMode;

/// One request per kernel entry point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Request {
    /// Begin a testing iteration.
    Attach {
        /// Target scheduler instance.
        scheduler_id: String,
    },
    /// End a testing iteration, cancelling every live operation.
    Detach {
        /// Target scheduler instance.
        scheduler_id: String,
    },
    /// Announce a new operation.
    CreateOperation {
        /// Target scheduler instance.
        scheduler_id: String,
        /// The new operation.
        operation_id: OpId,
    },
    /// Start a created operation; replies once the operation holds the token.
    StartOperation {
        /// Target scheduler instance.
        scheduler_id: String,
        /// The operation to start.
        operation_id: OpId,
    },
    /// Complete an operation and pass the token onwards.
    CompleteOperation {
        /// Target scheduler instance.
        scheduler_id: String,
        /// The operation to complete.
        operation_id: OpId,
    },
    /// Block the caller until the target operation completes.
    JoinOperation {
        /// Target scheduler instance.
        scheduler_id: String,
        /// The operation to join.
        operation_id: OpId,
    },
    /// Block the caller until any/all of the target operations complete.
    JoinOperations {
        /// Target scheduler instance.
        scheduler_id: String,
        /// The operations to join.
        operation_ids: Vec<OpId>,
        /// Whether one completion suffices or all are required.
        mode: WaitMode,
    },
    /// Create a waitable resource.
    CreateResource {
        /// Target scheduler instance.
        scheduler_id: String,
        /// The new resource.
        resource_id: ResourceId,
    },
    /// Destroy a resource.
    DeleteResource {
        /// Target scheduler instance.
        scheduler_id: String,
        /// The resource to destroy.
        resource_id: ResourceId,
    },
    /// Block the caller until the resource is signalled.
    WaitResource {
        /// Target scheduler instance.
        scheduler_id: String,
        /// The resource to wait for.
        resource_id: ResourceId,
    },
    /// Block the caller until any/all of the resources are signalled.
    WaitResources {
        /// Target scheduler instance.
        scheduler_id: String,
        /// The resources to wait for.
        resource_ids: Vec<ResourceId>,
        /// Whether one signal suffices or all are required.
        mode: WaitMode,
    },
    /// Wake every operation blocked on the resource whose wait is satisfied.
    SignalResource {
        /// Target scheduler instance.
        scheduler_id: String,
        /// The resource being signalled.
        resource_id: ResourceId,
    },
    /// Wake at most the one named operation blocked on the resource.
    SignalResourceFor {
        /// Target scheduler instance.
        scheduler_id: String,
        /// The resource being signalled.
        resource_id: ResourceId,
        /// The single waiter to wake.
        operation_id: OpId,
    },
    /// Yield: let the strategy pick the next operation to run.
    ScheduleNext {
        /// Target scheduler instance.
        scheduler_id: String,
    },
    /// Controlled nondeterministic boolean choice.
    NextBoolean {
        /// Target scheduler instance.
        scheduler_id: String,
    },
    /// Controlled nondeterministic integer choice in `[0, max_value)`.
    NextInteger {
        /// Target scheduler instance.
        scheduler_id: String,
        /// Exclusive upper bound of the choice.
        max_value: u64,
    },
    /// The seed driving the current iteration, for reproduction.
    RandomSeed {
        /// Target scheduler instance.
        scheduler_id: String,
    },
    /// The id of the operation currently holding the token.
    ScheduledOperationId {
        /// Target scheduler instance.
        scheduler_id: String,
    },
    /// The last error code recorded by the instance.
    LastError {
        /// Target scheduler instance.
        scheduler_id: String,
    },
}

impl Request {
    /// The scheduler instance this request targets.
    pub fn scheduler_id(&self) -> &str {
        use Request::*;
        match self {
            Attach { scheduler_id }
            | Detach { scheduler_id }
            | CreateOperation { scheduler_id, .. }
            | StartOperation { scheduler_id, .. }
            | CompleteOperation { scheduler_id, .. }
            | JoinOperation { scheduler_id, .. }
            | JoinOperations { scheduler_id, .. }
            | CreateResource { scheduler_id, .. }
            | DeleteResource { scheduler_id, .. }
            | WaitResource { scheduler_id, .. }
            | WaitResources { scheduler_id, .. }
            | SignalResource { scheduler_id, .. }
            | SignalResourceFor { scheduler_id, .. }
            | ScheduleNext { scheduler_id }
            | NextBoolean { scheduler_id }
            | NextInteger { scheduler_id, .. }
            | RandomSeed { scheduler_id }
            | ScheduledOperationId { scheduler_id }
            | LastError { scheduler_id } => scheduler_id,
        }
    }
}

/// The reply to any [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reply {
    /// Numeric result of the entry point; zero is success.
    pub error_code: u32,
    /// The returned value, for the entry points that produce one
    /// (`next_boolean` encodes as 0/1).
    pub value: Option<u64>,
}

impl Reply {
    /// A bare success reply.
    pub fn ok() -> Reply {
        Reply {
            error_code: ErrorCode::Success.as_u32(),
            value: None,
        }
    }

    /// A success reply carrying a value.
    pub fn ok_value(value: u64) -> Reply {
        Reply {
            error_code: ErrorCode::Success.as_u32(),
            value: Some(value),
        }
    }

    /// An error reply.
    pub fn error(code: ErrorCode) -> Reply {
        Reply {
            error_code: code.as_u32(),
            value: None,
        }
    }

    /// The decoded result code.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::from_u32(self.error_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulerError;

    #[test]
    fn requests_round_trip_through_json() {
        let reqs = vec![
            Request::Attach {
                scheduler_id: "s".into(),
            },
            Request::JoinOperations {
                scheduler_id: "s".into(),
                operation_ids: vec![OpId::from_raw(1), OpId::from_raw(2)],
                mode: WaitMode::All,
            },
            Request::NextInteger {
                scheduler_id: "s".into(),
                max_value: 10,
            },
        ];
        for req in reqs {
            let json = serde_json::to_string(&req).unwrap();
            let back: Request = serde_json::from_str(&json).unwrap();
            assert_eq!(back, req);
            assert_eq!(back.scheduler_id(), "s");
        }
    }

    #[test]
    fn reply_codes_decode() {
        assert_eq!(Reply::ok().code(), ErrorCode::Success);
        let reply = Reply::error(SchedulerError::DeadlockDetected.into());
        assert_eq!(reply.code(), ErrorCode::DeadlockDetected);
        assert_eq!(Reply::ok_value(3).value, Some(3));
    }
}
