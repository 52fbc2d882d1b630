/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Macros that tag log entries which must be identical across runs with the
//! same seed, for the purpose of verifying reproducibility.
//! [`schedlog`] writes such an entry at INFO level, [`schedlog_debug`] at
//! DEBUG level.

/// Macro used to encapsulate tracing should-be-deterministic information.
/// This is currently at the INFO log level.
#[macro_export]
macro_rules! schedlog {
    ($($arg:tt)+) => {{
        tracing::info!("SCHEDLOG {}", format!($($arg)+));
    }};
}

/// Macro used to encapsulate tracing should-be-deterministic information.
/// This variant is at a higher log level and requires that logging verbosity
/// is set to DEBUG.
#[macro_export]
macro_rules! schedlog_debug {
    ($($arg:tt)+) => {{
        tracing::debug!("SCHEDLOG {}", format!($($arg)+));
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_schedlog() {
        schedlog!("token {} -> {}", 0, 1);
        schedlog_debug!("step {}", 17);
    }
}
