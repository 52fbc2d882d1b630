/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The scheduler host: kernels keyed by instance id, one serving thread per
//! connection.

use std::collections::HashMap;
use std::io;
use std::net::TcpListener;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

use relay::KernelResult;
use relay::Scheduler;
use relay_model::wire::Reply;
use relay_model::wire::Request;
use relay_model::Config;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::codec::FramedStream;
use crate::TransportError;

/// Hosts scheduler kernels, one per instance id, all built from the same
/// configuration. Instances are created lazily on first use.
#[derive(Debug)]
pub struct SchedulerServer {
    config: Config,
    kernels: Mutex<HashMap<String, Arc<Scheduler>>>,
}

impl SchedulerServer {
    /// A host whose kernels share `config`.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            kernels: Mutex::new(HashMap::new()),
        }
    }

    /// The kernel behind an instance id, created on first use.
    pub fn scheduler(&self, id: &str) -> Arc<Scheduler> {
        let mut kernels = self.kernels.lock().expect("kernel registry lock poisoned");
        Arc::clone(kernels.entry(id.to_string()).or_insert_with(|| {
            info!("[server] creating scheduler instance {:?}", id);
            Arc::new(Scheduler::new(&self.config))
        }))
    }

    /// Map one request onto the corresponding kernel entry point. Parking
    /// entry points park the calling thread, exactly as embedded callers do.
    pub fn handle(&self, request: &Request) -> Reply {
        let kernel = self.scheduler(request.scheduler_id());
        let result: KernelResult<Option<u64>> = match request {
            Request::Attach { .. } => kernel.attach().map(|_| None),
            Request::Detach { .. } => kernel.detach().map(|_| None),
            Request::CreateOperation { operation_id, .. } => {
                kernel.create_operation(*operation_id).map(|_| None)
            }
            Request::StartOperation { operation_id, .. } => {
                kernel.start_operation(*operation_id).map(|_| None)
            }
            Request::CompleteOperation { operation_id, .. } => {
                kernel.complete_operation(*operation_id).map(|_| None)
            }
            Request::JoinOperation { operation_id, .. } => {
                kernel.join_operation(*operation_id).map(|_| None)
            }
            Request::JoinOperations { operation_ids, mode, .. } => {
                kernel.join_operations(operation_ids, *mode).map(|_| None)
            }
            Request::CreateResource { resource_id, .. } => {
                kernel.create_resource(*resource_id).map(|_| None)
            }
            Request::DeleteResource { resource_id, .. } => {
                kernel.delete_resource(*resource_id).map(|_| None)
            }
            Request::WaitResource { resource_id, .. } => {
                kernel.wait_resource(*resource_id).map(|_| None)
            }
            Request::WaitResources { resource_ids, mode, .. } => {
                kernel.wait_resources(resource_ids, *mode).map(|_| None)
            }
            Request::SignalResource { resource_id, .. } => {
                kernel.signal_resource(*resource_id).map(|_| None)
            }
            Request::SignalResourceFor { resource_id, operation_id, .. } => kernel
                .signal_resource_for(*resource_id, *operation_id)
                .map(|_| None),
            Request::ScheduleNext { .. } => kernel.schedule_next().map(|_| None),
            Request::NextBoolean { .. } => kernel.next_boolean().map(|b| Some(b as u64)),
            Request::NextInteger { max_value, .. } => kernel.next_integer(*max_value).map(Some),
            Request::RandomSeed { .. } => kernel.random_seed().map(Some),
            Request::ScheduledOperationId { .. } => {
                Ok(Some(kernel.scheduled_operation_id().as_raw()))
            }
            Request::LastError { .. } => Ok(Some(kernel.last_error().as_u32() as u64)),
        };
        match result {
            Ok(None) => Reply::ok(),
            Ok(Some(value)) => Reply::ok_value(value),
            Err(err) => Reply::error(err.into()),
        }
    }

    /// Accept connections forever, serving each on its own thread.
    pub fn serve(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        info!("[server] listening on {}", listener.local_addr()?);
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let server = Arc::clone(&self);
                    thread::spawn(move || server.serve_connection(stream));
                }
                Err(err) => warn!("[server] accept failed: {}", err),
            }
        }
        Ok(())
    }

    fn serve_connection(self: Arc<Self>, stream: TcpStream) {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        debug!("[server] connection from {}", peer);
        if let Err(err) = stream.set_nodelay(true) {
            warn!("[server] set_nodelay failed for {}: {}", peer, err);
        }

        let mut framed = FramedStream::new(stream);
        loop {
            let request: Request = match framed.read_frame() {
                Ok(request) => request,
                Err(TransportError::Closed) => {
                    debug!("[server] {} disconnected", peer);
                    return;
                }
                Err(err) => {
                    warn!("[server] dropping {}: {}", peer, err);
                    return;
                }
            };
            let reply = self.handle(&request);
            if let Err(err) = framed.write_frame(&reply) {
                warn!("[server] reply to {} failed: {}", peer, err);
                return;
            }
        }
    }
}
