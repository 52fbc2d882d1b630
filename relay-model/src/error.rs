/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Error codes reported by scheduler entry points.
//!
//! [`ErrorCode`] is the stable numeric form carried on the wire and stored in
//! the kernel's `last_error` slot. [`SchedulerError`] is the typed form that
//! entry points return; the end of a schedule is an outcome (`Ok`), not an
//! error, so it has no variant here.

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Numeric result code of a scheduler entry point. `Success` is zero; every
/// other code has a stable value so that replies survive the wire unchanged.
#[derive(PartialEq, Debug, Eq, Clone, Copy, Hash, Serialize, Deserialize, Default)]
#[repr(u32)]
pub enum ErrorCode {
    /// The entry point completed, or the schedule ran to exhaustion.
    #[default]
    Success = 0,

    /// An unclassified failure, including transport-level failures.
    Failure = 100,
    /// No operation is enabled but blocked operations remain.
    DeadlockDetected = 101,
    /// `attach` was called on an already-attached scheduler.
    ClientAttached = 102,
    /// An entry point other than `attach` ran on a detached scheduler.
    ClientNotAttached = 103,
    /// An internal invariant was violated.
    InternalError = 104,
    /// Exploration is disabled by configuration.
    SchedulerDisabled = 105,

    /// `create_operation` on an id that exists and has not completed.
    DuplicateOperation = 200,
    /// The named operation id is unknown.
    NotExistingOperation = 201,
    /// `complete_operation` on an operation that never started.
    OperationNotStarted = 202,
    /// `start_operation` on an operation that already started.
    OperationAlreadyStarted = 203,
    /// The operation already ran to completion.
    OperationAlreadyCompleted = 204,
    /// The main operation is created implicitly on attach, never by the client.
    MainOperationExplicitlyCreated = 205,
    /// The main operation is started implicitly on attach, never by the client.
    MainOperationExplicitlyStarted = 206,
    /// The main operation is completed implicitly on detach, never by the client.
    MainOperationExplicitlyCompleted = 207,

    /// `create_resource` on an id that already exists.
    DuplicateResource = 300,
    /// The named resource id is unknown.
    NotExistingResource = 301,
}

impl ErrorCode {
    /// True iff this is the zero success code.
    pub fn is_success(&self) -> bool {
        *self == ErrorCode::Success
    }

    /// The numeric wire form.
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// Decode a wire code. Unknown values collapse to `Failure`, the catch-all
    /// for anything the peer does not understand.
    pub fn from_u32(code: u32) -> ErrorCode {
        use ErrorCode::*;
        match code {
            0 => Success,
            101 => DeadlockDetected,
            102 => ClientAttached,
            103 => ClientNotAttached,
            104 => InternalError,
            105 => SchedulerDisabled,
            200 => DuplicateOperation,
            201 => NotExistingOperation,
            202 => OperationNotStarted,
            203 => OperationAlreadyStarted,
            204 => OperationAlreadyCompleted,
            205 => MainOperationExplicitlyCreated,
            206 => MainOperationExplicitlyStarted,
            207 => MainOperationExplicitlyCompleted,
            300 => DuplicateResource,
            301 => NotExistingResource,
            _ => Failure,
        }
    }

    /// The typed error corresponding to this code, or `None` for `Success`.
    pub fn as_error(&self) -> Option<SchedulerError> {
        use ErrorCode::*;
        Some(match self {
            Success => return None,
            Failure => SchedulerError::Failure,
            DeadlockDetected => SchedulerError::DeadlockDetected,
            ClientAttached => SchedulerError::ClientAttached,
            ClientNotAttached => SchedulerError::ClientNotAttached,
            InternalError => SchedulerError::InternalError,
            SchedulerDisabled => SchedulerError::SchedulerDisabled,
            DuplicateOperation => SchedulerError::DuplicateOperation,
            NotExistingOperation => SchedulerError::NotExistingOperation,
            OperationNotStarted => SchedulerError::OperationNotStarted,
            OperationAlreadyStarted => SchedulerError::OperationAlreadyStarted,
            OperationAlreadyCompleted => SchedulerError::OperationAlreadyCompleted,
            MainOperationExplicitlyCreated => SchedulerError::MainOperationExplicitlyCreated,
            MainOperationExplicitlyStarted => SchedulerError::MainOperationExplicitlyStarted,
            MainOperationExplicitlyCompleted => SchedulerError::MainOperationExplicitlyCompleted,
            DuplicateResource => SchedulerError::DuplicateResource,
            NotExistingResource => SchedulerError::NotExistingResource,
        })
    }
}

/// The typed failure of a scheduler entry point.
#[derive(Error, PartialEq, Debug, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum SchedulerError {
    /// See [`ErrorCode::Failure`].
    #[error("unclassified failure")]
    Failure,
    /// See [`ErrorCode::DeadlockDetected`].
    #[error("deadlock detected: blocked operations remain but none is enabled")]
    DeadlockDetected,
    /// See [`ErrorCode::ClientAttached`].
    #[error("client is already attached")]
    ClientAttached,
    /// See [`ErrorCode::ClientNotAttached`].
    #[error("client is not attached")]
    ClientNotAttached,
    /// See [`ErrorCode::InternalError`].
    #[error("internal scheduler invariant violated")]
    InternalError,
    /// See [`ErrorCode::SchedulerDisabled`].
    #[error("exploration is disabled by configuration")]
    SchedulerDisabled,
    /// See [`ErrorCode::DuplicateOperation`].
    #[error("operation already exists and has not completed")]
    DuplicateOperation,
    /// See [`ErrorCode::NotExistingOperation`].
    #[error("no such operation")]
    NotExistingOperation,
    /// See [`ErrorCode::OperationNotStarted`].
    #[error("operation was never started")]
    OperationNotStarted,
    /// See [`ErrorCode::OperationAlreadyStarted`].
    #[error("operation has already started")]
    OperationAlreadyStarted,
    /// See [`ErrorCode::OperationAlreadyCompleted`].
    #[error("operation has already completed")]
    OperationAlreadyCompleted,
    /// See [`ErrorCode::MainOperationExplicitlyCreated`].
    #[error("the main operation cannot be created explicitly")]
    MainOperationExplicitlyCreated,
    /// See [`ErrorCode::MainOperationExplicitlyStarted`].
    #[error("the main operation cannot be started explicitly")]
    MainOperationExplicitlyStarted,
    /// See [`ErrorCode::MainOperationExplicitlyCompleted`].
    #[error("the main operation cannot be completed explicitly")]
    MainOperationExplicitlyCompleted,
    /// See [`ErrorCode::DuplicateResource`].
    #[error("resource already exists")]
    DuplicateResource,
    /// See [`ErrorCode::NotExistingResource`].
    #[error("no such resource")]
    NotExistingResource,
}

impl From<SchedulerError> for ErrorCode {
    fn from(err: SchedulerError) -> ErrorCode {
        use SchedulerError::*;
        match err {
            Failure => ErrorCode::Failure,
            DeadlockDetected => ErrorCode::DeadlockDetected,
            ClientAttached => ErrorCode::ClientAttached,
            ClientNotAttached => ErrorCode::ClientNotAttached,
            InternalError => ErrorCode::InternalError,
            SchedulerDisabled => ErrorCode::SchedulerDisabled,
            DuplicateOperation => ErrorCode::DuplicateOperation,
            NotExistingOperation => ErrorCode::NotExistingOperation,
            OperationNotStarted => ErrorCode::OperationNotStarted,
            OperationAlreadyStarted => ErrorCode::OperationAlreadyStarted,
            OperationAlreadyCompleted => ErrorCode::OperationAlreadyCompleted,
            MainOperationExplicitlyCreated => ErrorCode::MainOperationExplicitlyCreated,
            MainOperationExplicitlyStarted => ErrorCode::MainOperationExplicitlyStarted,
            MainOperationExplicitlyCompleted => ErrorCode::MainOperationExplicitlyCompleted,
            DuplicateResource => ErrorCode::DuplicateResource,
            NotExistingResource => ErrorCode::NotExistingResource,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_round_trip() {
        let codes = [
            ErrorCode::Success,
            ErrorCode::Failure,
            ErrorCode::DeadlockDetected,
            ErrorCode::ClientAttached,
            ErrorCode::ClientNotAttached,
            ErrorCode::InternalError,
            ErrorCode::SchedulerDisabled,
            ErrorCode::DuplicateOperation,
            ErrorCode::NotExistingOperation,
            ErrorCode::OperationNotStarted,
            ErrorCode::OperationAlreadyStarted,
            ErrorCode::OperationAlreadyCompleted,
            ErrorCode::MainOperationExplicitlyCreated,
            ErrorCode::MainOperationExplicitlyStarted,
            ErrorCode::MainOperationExplicitlyCompleted,
            ErrorCode::DuplicateResource,
            ErrorCode::NotExistingResource,
        ];
        for code in codes {
            assert_eq!(code, ErrorCode::from_u32(code.as_u32()));
        }
    }

    #[test]
    fn unknown_wire_code_is_failure() {
        assert_eq!(ErrorCode::from_u32(9999), ErrorCode::Failure);
    }

    #[test]
    fn typed_and_numeric_forms_agree() {
        let err = SchedulerError::DeadlockDetected;
        let code: ErrorCode = err.into();
        assert_eq!(code.as_error(), Some(err));
        assert_eq!(ErrorCode::Success.as_error(), None);
    }
}
