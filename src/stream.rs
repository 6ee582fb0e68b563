// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Contiguous per-direction byte stream of a TCP session.
//!
//! Built from the resolver's accepted packets in sequence order. Bytes a
//! packet repeats from its predecessor are trimmed; holes are left closed
//! (the stream simply continues) and logged.

use crate::packet::Direction;
use crate::session::{Session, TransmissionStreamResolver};
use serde::Serialize;
use tracing::debug;

/// Where one packet's accepted bytes landed in the stream.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSegment {
    pub offset: usize,
    pub len: usize,
    /// Index into `Session::packets`.
    pub packet: usize,
}

impl StreamSegment {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamBuffer {
    bytes: Vec<u8>,
    segments: Vec<StreamSegment>,
}

impl StreamBuffer {
    pub fn build(session: &Session, direction: Direction) -> Self {
        let mut out = StreamBuffer::default();
        if !session.is_tcp() {
            return out;
        }

        let resolver = TransmissionStreamResolver::new(session);
        let mut expected: Option<u64> = None;

        for idx in resolver.resolved_stream(direction) {
            let packet = &session.packets[idx];
            let Some(tcp) = packet.record.tcp_info() else {
                continue;
            };
            let payload = &packet.record.payload;

            // packets arrive in raw sequence order, so compare unwrapped
            let seq = u64::from(tcp.seq);
            let mut skip = 0usize;
            if let Some(exp) = expected {
                if exp > seq {
                    skip = usize::try_from(exp - seq).unwrap_or(usize::MAX);
                } else if seq > exp {
                    debug!(?direction, seq = tcp.seq, missing = seq - exp, "gap in captured stream");
                }
            }
            if skip >= payload.len() {
                continue;
            }

            out.segments.push(StreamSegment {
                offset: out.bytes.len(),
                len: payload.len() - skip,
                packet: idx,
            });
            out.bytes.extend_from_slice(&payload[skip..]);
            expected = Some(seq + payload.len() as u64);
        }
        out
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn segments(&self) -> &[StreamSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Packet whose bytes cover `offset`.
    pub fn packet_at(&self, offset: usize) -> Option<usize> {
        let i = self.segments.partition_point(|s| s.end() <= offset);
        self.segments
            .get(i)
            .filter(|s| s.offset <= offset)
            .map(|s| s.packet)
    }

    /// Start of the first packet beginning strictly after `offset`.
    pub fn next_boundary_after(&self, offset: usize) -> Option<usize> {
        let i = self.segments.partition_point(|s| s.offset <= offset);
        self.segments.get(i).map(|s| s.offset)
    }
}
