/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Request/reply boundary for running the scheduler kernel in a separate
//! process.
//!
//! The kernel is unchanged by this crate: [`SchedulerServer`] hosts any
//! number of kernels keyed by instance id and maps each incoming request onto
//! the corresponding entry point, and [`RemoteScheduler`] is a client stub
//! with the same surface as the embedded kernel. Entry points that park
//! (start, join, wait, yield) park the connection's server thread, so every
//! thread of the program under test talks over its own connection.
//!
//! Transport-level failures never surface as their own error taxonomy; the
//! local caller sees a generic `Failure`, per the boundary contract.

#![deny(clippy::all)]
#![deny(missing_docs)]

pub mod client;
pub mod codec;
pub mod server;

use relay_model::wire::Reply;
use relay_model::wire::Request;
use thiserror::Error;

pub use client::RemoteScheduler;
pub use codec::FramedStream;
pub use server::SchedulerServer;

/// What can go wrong underneath a request/reply exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The byte stream failed.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// A frame did not encode/decode.
    #[error("codec failure: {0}")]
    Codec(#[from] serde_json::Error),

    /// The peer hung up between frames.
    #[error("connection closed by peer")]
    Closed,

    /// A frame claimed an implausible size.
    #[error("frame of {0} bytes exceeds the limit")]
    Oversized(usize),
}

/// One request/reply exchange with the scheduler host.
pub trait Transport {
    /// Send `request` and block for its reply.
    fn round_trip(&mut self, request: &Request) -> Result<Reply, TransportError>;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use relay_model::Config;
    use relay_model::ErrorCode;
    use relay_model::OpId;
    use relay_model::ResourceId;
    use relay_model::SchedulerError;
    use relay_model::StrategyKind;

    use super::*;

    /// A transport that short-circuits straight into a server, no bytes involved.
    struct Loopback {
        server: Arc<SchedulerServer>,
    }

    impl Transport for Loopback {
        fn round_trip(&mut self, request: &Request) -> Result<Reply, TransportError> {
            Ok(self.server.handle(request))
        }
    }

    fn loopback_client(server: &Arc<SchedulerServer>, id: &str) -> RemoteScheduler<Loopback> {
        RemoteScheduler::new(
            Loopback {
                server: Arc::clone(server),
            },
            id,
        )
    }

    fn config() -> Config {
        Config {
            strategy: StrategyKind::Pct,
            strategy_bound: 0,
            seed: 1,
        }
    }

    #[test]
    fn non_parking_calls_round_trip() {
        let server = Arc::new(SchedulerServer::new(config()));
        let client = loopback_client(&server, "loop");

        client.attach().unwrap();
        assert_eq!(client.scheduled_operation_id().unwrap(), OpId::MAIN);
        assert_eq!(client.random_seed().unwrap(), 1);
        assert!(client.next_integer(8).unwrap() < 8);
        let _ = client.next_boolean().unwrap();

        client.create_resource(ResourceId::from_raw(4)).unwrap();
        client.signal_resource(ResourceId::from_raw(4)).unwrap();
        client.delete_resource(ResourceId::from_raw(4)).unwrap();

        client.schedule_next().unwrap();
        assert_eq!(client.last_error().unwrap(), ErrorCode::Success);
        client.detach().unwrap();
    }

    #[test]
    fn kernel_errors_survive_the_boundary() {
        let server = Arc::new(SchedulerServer::new(config()));
        let client = loopback_client(&server, "loop");

        assert_eq!(client.detach(), Err(SchedulerError::ClientNotAttached));
        client.attach().unwrap();
        assert_eq!(client.attach(), Err(SchedulerError::ClientAttached));
        assert_eq!(
            client.create_operation(OpId::MAIN),
            Err(SchedulerError::MainOperationExplicitlyCreated)
        );
        assert_eq!(client.last_error().unwrap(), ErrorCode::MainOperationExplicitlyCreated);
        client.detach().unwrap();
    }

    #[test]
    fn instances_are_independent() {
        let server = Arc::new(SchedulerServer::new(config()));
        let left = loopback_client(&server, "left");
        let right = loopback_client(&server, "right");

        left.attach().unwrap();
        // A second attach on the *same* instance fails; a different instance
        // is untouched.
        assert_eq!(left.attach(), Err(SchedulerError::ClientAttached));
        right.attach().unwrap();
        left.detach().unwrap();
        right.detach().unwrap();
    }

    /// A transport that always fails, standing in for a dead network.
    struct DeadTransport;

    impl Transport for DeadTransport {
        fn round_trip(&mut self, _request: &Request) -> Result<Reply, TransportError> {
            Err(TransportError::Closed)
        }
    }

    #[test]
    fn transport_failures_surface_as_generic_failure() {
        let client = RemoteScheduler::new(DeadTransport, "gone");
        assert_eq!(client.attach(), Err(SchedulerError::Failure));
        assert_eq!(client.next_boolean(), Err(SchedulerError::Failure));
    }
}
