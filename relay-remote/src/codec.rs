/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Length-prefixed JSON framing over any byte stream.
//!
//! Each frame is a big-endian `u32` payload length followed by a JSON
//! message. JSON keeps the protocol debuggable with nothing fancier than
//! `tcpdump`; the length prefix keeps parsing trivial.

use std::io::ErrorKind;
use std::io::Read;
use std::io::Write;

use relay_model::wire::Reply;
use relay_model::wire::Request;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Transport;
use crate::TransportError;

/// Frames larger than this are treated as protocol corruption.
const MAX_FRAME_BYTES: usize = 1 << 20;

/// A byte stream carrying length-prefixed JSON frames.
#[derive(Debug)]
pub struct FramedStream<S> {
    inner: S,
}

impl<S: Read + Write> FramedStream<S> {
    /// Wrap a byte stream.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Write one frame.
    pub fn write_frame<T: Serialize>(&mut self, msg: &T) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(msg)?;
        if payload.len() > MAX_FRAME_BYTES {
            return Err(TransportError::Oversized(payload.len()));
        }
        let len = payload.len() as u32;
        self.inner.write_all(&len.to_be_bytes())?;
        self.inner.write_all(&payload)?;
        self.inner.flush()?;
        Ok(())
    }

    /// Read one frame. A clean end-of-stream between frames reads as
    /// [`TransportError::Closed`].
    pub fn read_frame<T: DeserializeOwned>(&mut self) -> Result<T, TransportError> {
        let mut len_buf = [0u8; 4];
        match self.inner.read_exact(&mut len_buf) {
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                return Err(TransportError::Closed);
            }
            Err(err) => return Err(err.into()),
            Ok(()) => {}
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_BYTES {
            return Err(TransportError::Oversized(len));
        }
        let mut payload = vec![0u8; len];
        self.inner.read_exact(&mut payload)?;
        Ok(serde_json::from_slice(&payload)?)
    }
}

impl<S: Read + Write> Transport for FramedStream<S> {
    fn round_trip(&mut self, request: &Request) -> Result<Reply, TransportError> {
        self.write_frame(request)?;
        self.read_frame()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use relay_model::wire::Request;

    use super::*;

    #[test]
    fn frames_round_trip() {
        let mut framed = FramedStream::new(Cursor::new(Vec::new()));
        let req = Request::NextInteger {
            scheduler_id: "s".into(),
            max_value: 9,
        };
        framed.write_frame(&req).unwrap();

        framed.inner.set_position(0);
        let back: Request = framed.read_frame().unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn end_of_stream_reads_as_closed() {
        let mut framed = FramedStream::new(Cursor::new(Vec::new()));
        match framed.read_frame::<Request>() {
            Err(TransportError::Closed) => {}
            other => panic!("expected Closed, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        let mut framed = FramedStream::new(Cursor::new(bytes));
        match framed.read_frame::<Request>() {
            Err(TransportError::Oversized(_)) => {}
            other => panic!("expected Oversized, got {:?}", other.map(|_| ())),
        }
    }
}
