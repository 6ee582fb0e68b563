// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Reconstructed HTTP request/response units.

use crate::packet::Direction;
use crate::session::Session;
use hyper::HeaderMap;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StartLine {
    Request {
        method: String,
        uri: String,
        version: String,
    },
    Response {
        version: String,
        status: u16,
        reason: String,
    },
    /// Boundaries inferred from traffic shape only (undecrypted TLS).
    Opaque,
}

/// Inclusive byte interval of an object.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteRange {
    pub first: u64,
    pub last: u64,
}

impl ByteRange {
    pub fn new(first: u64, last: u64) -> Self {
        Self { first, last }
    }

    /// Saturates at `u64::MAX` for the full span.
    pub fn len(&self) -> u64 {
        self.last.saturating_sub(self.first).saturating_add(1)
    }

    pub fn is_empty(&self) -> bool {
        self.last < self.first
    }
}

/// Stream offset -> length of each piece of an exchange's body.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct BodySegments(BTreeMap<usize, usize>);

impl BodySegments {
    pub fn insert(&mut self, offset: usize, len: usize) {
        if len > 0 {
            self.0.insert(offset, len);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.0.iter().map(|(&o, &l)| (o, l))
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// One past the last body byte in the stream.
    pub fn end(&self) -> Option<usize> {
        self.0.iter().next_back().map(|(o, l)| o + l)
    }
}

/// Non-fatal problems recorded against a single exchange.
#[derive(thiserror::Error, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExchangeDiagnostic {
    #[error("payload truncated: {available} bytes captured, {declared:?} declared")]
    PayloadTruncated { declared: Option<u64>, available: u64 },
    #[error("chunk framing corrupt (body offset {offset:?})")]
    ChunkFramingCorrupt { offset: Option<usize> },
    #[error("content decompression failed: {reason}")]
    DecompressionFailure { reason: String },
    #[error("response has no outstanding request")]
    RequestResponseUnlinked,
}

#[derive(Serialize, Debug, Clone)]
pub struct Exchange {
    /// Index of the owning session in the analysis.
    pub session: usize,
    /// Position in `Session::exchanges`.
    pub index: usize,
    pub direction: Direction,
    pub start_line: StartLine,
    #[serde(serialize_with = "crate::serde_helpers::serialize_headers")]
    pub headers: HeaderMap,
    /// Offset of the start line in the direction's stream.
    pub head_offset: usize,
    pub head_len: usize,
    /// Wire body (chunk framing included) in stream coordinates.
    pub body: BodySegments,
    pub content_length: Option<u64>,
    pub chunked: bool,
    pub chunks_complete: bool,
    pub extractable: bool,
    /// Object range carried by a 206 response.
    pub range: Option<ByteRange>,
    /// Full object length from `Content-Range`, when known.
    pub instance_length: Option<u64>,
    pub first_packet: Option<usize>,
    pub last_packet: Option<usize>,
    pub timestamp: f64,
    pub last_timestamp: f64,
    /// Bytes of the session's payload attributed to this exchange.
    pub wire_bytes: u64,
    /// Index of the paired exchange in the same session.
    pub paired: Option<usize>,
    pub diagnostics: Vec<ExchangeDiagnostic>,
}

impl Exchange {
    pub fn new(session: usize, direction: Direction, start_line: StartLine) -> Self {
        Self {
            session,
            index: 0,
            direction,
            start_line,
            headers: HeaderMap::new(),
            head_offset: 0,
            head_len: 0,
            body: BodySegments::default(),
            content_length: None,
            chunked: false,
            chunks_complete: false,
            extractable: true,
            range: None,
            instance_length: None,
            first_packet: None,
            last_packet: None,
            timestamp: 0.0,
            last_timestamp: 0.0,
            wire_bytes: 0,
            paired: None,
            diagnostics: Vec::new(),
        }
    }

    /// Requests are parsed request lines, or opaque uplink exchanges.
    pub fn is_request(&self) -> bool {
        match self.start_line {
            StartLine::Request { .. } => true,
            StartLine::Opaque => self.direction == Direction::Uplink,
            StartLine::Response { .. } => false,
        }
    }

    pub fn is_response(&self) -> bool {
        match self.start_line {
            StartLine::Response { .. } => true,
            StartLine::Opaque => self.direction == Direction::Downlink,
            StartLine::Request { .. } => false,
        }
    }

    pub fn is_opaque(&self) -> bool {
        self.start_line == StartLine::Opaque
    }

    pub fn method(&self) -> Option<&str> {
        match &self.start_line {
            StartLine::Request { method, .. } => Some(method),
            _ => None,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match &self.start_line {
            StartLine::Request { uri, .. } => Some(uri),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match &self.start_line {
            StartLine::Response { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Request target without scheme and authority, query kept.
    pub fn path(&self) -> Option<&str> {
        let uri = self.uri()?;
        let Some(rest) = uri
            .strip_prefix("http://")
            .or_else(|| uri.strip_prefix("https://"))
        else {
            return Some(uri);
        };
        Some(rest.find('/').map_or("/", |i| &rest[i..]))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        crate::helpers::headers::get_header_str(&self.headers, name)
    }

    /// Wire body length in the stream (chunk framing included).
    pub fn body_len(&self) -> usize {
        self.body.total()
    }

    /// Host the object was fetched from: `Host` header, then the session's
    /// resolved hostname, then the remote address.
    pub fn host(&self, session: &Session) -> String {
        if let Some(h) = self.header("host") {
            return h.trim().to_ascii_lowercase();
        }
        session
            .remote_host
            .clone()
            .unwrap_or_else(|| session.key.remote_addr.to_string())
    }

    pub fn has_diagnostic(&self, pred: impl Fn(&ExchangeDiagnostic) -> bool) -> bool {
        self.diagnostics.iter().any(pred)
    }
}
