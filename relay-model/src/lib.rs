/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Widely-shared model types for the relay scheduler: operation and resource
//! ids, error codes, configuration, and the wire messages of the optional
//! remote boundary. No scheduling logic lives here.

pub mod config;
pub mod error;
pub mod types;
pub mod wire;

pub use config::Config;
pub use config::StrategyKind;
pub use error::ErrorCode;
pub use error::SchedulerError;
pub use types::OpId;
pub use types::ResourceId;
pub use types::WaitMode;
