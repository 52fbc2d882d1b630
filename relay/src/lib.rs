/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Relay serializes the execution of a multi-threaded program under test so
//! that its interleavings can be explored systematically.
//!
//! The program registers each of its threads as an *operation* and calls back
//! into the [`Scheduler`] at every point whose ordering could matter:
//! operation creation, start and completion, resource waits and signals,
//! explicit yields, and nondeterministic choices. At each such point exactly
//! one operation holds the *token* (the right to run application code); all
//! others are parked on condition variables inside their scheduler call. An
//! exploration strategy decides who runs next, and a fixed strategy seed
//! reproduces the exact schedule.
//!
//! A minimal client looks like this:
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//!
//! use relay::Config;
//! use relay::OpId;
//! use relay::Scheduler;
//!
//! let sched = Arc::new(Scheduler::new(&Config::default()));
//! sched.attach().unwrap();
//!
//! let worker = OpId::from_raw(1);
//! sched.create_operation(worker).unwrap();
//! let handle = thread::spawn({
//!     let sched = Arc::clone(&sched);
//!     move || {
//!         sched.start_operation(worker).unwrap();
//!         // ... the work whose interleavings are being explored ...
//!         sched.complete_operation(worker).unwrap();
//!     }
//! });
//!
//! sched.join_operation(worker).unwrap();
//! sched.detach().unwrap();
//! handle.join().unwrap();
//! ```

#![deny(clippy::all)]
#![deny(missing_docs)]

mod operation;
mod resources;
pub mod scheduler;
pub mod strategy;

pub mod schedlog;

pub use operation::OperationStatus;
pub use relay_model::Config;
pub use relay_model::ErrorCode;
pub use relay_model::OpId;
pub use relay_model::ResourceId;
pub use relay_model::SchedulerError;
pub use relay_model::StrategyKind;
pub use relay_model::WaitMode;
pub use scheduler::KernelResult;
pub use scheduler::Scheduler;
