// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! HTTP/1.x message parsing over one direction's stream.

use crate::chunked::{self, ChunkError};
use crate::content::{ContentCodec, ContentError};
use crate::exchange::{ByteRange, Exchange, ExchangeDiagnostic, StartLine};
use crate::helpers::content_range::{parse_content_range, ContentRange};
use crate::helpers::headers::{header_has_token, header_u64};
use crate::helpers::token::is_token;
use crate::packet::Direction;
use crate::session::Session;
use hyper::header::{HeaderName, HeaderValue};
use hyper::HeaderMap;
use tracing::{debug, warn};

enum Framing {
    Empty,
    Chunked,
    Length(u64),
    UntilClose,
}

pub(super) struct DirectionParser<'a> {
    pub session_id: usize,
    pub session: &'a Session,
    pub direction: Direction,
    pub codec: ContentCodec,
    pub max_header_bytes: usize,
}

impl DirectionParser<'_> {
    /// Split the direction's stream into exchanges.
    ///
    /// `request_methods` lists, in order, the methods of the requests that the
    /// final responses of this stream answer; HEAD responses carry no body.
    pub fn parse(&self, request_methods: &[String]) -> Vec<Exchange> {
        let buffer = self.session.stream(self.direction);
        let bytes = buffer.bytes();
        let mut out = Vec::new();
        let mut pos = 0usize;
        let mut answered = 0usize;

        while pos < bytes.len() {
            let limit = bytes.len().min(pos.saturating_add(self.max_header_bytes));
            let Some(start_line) =
                line_at(bytes, pos, limit).and_then(|(line, _)| parse_start_line(line))
            else {
                // not at a message boundary; resync on the next packet
                pos = buffer.next_boundary_after(pos).unwrap_or(bytes.len());
                continue;
            };

            let mut ex = Exchange::new(self.session_id, self.direction, start_line);
            ex.head_offset = pos;

            let end = match parse_head(bytes, pos, limit) {
                Head::Complete { headers, end } => {
                    ex.headers = headers;
                    ex.head_len = end - pos;
                    let head_request = ex.is_response()
                        && request_methods
                            .get(answered)
                            .is_some_and(|m| m.eq_ignore_ascii_case("HEAD"));
                    if ex.status().is_some_and(|s| s >= 200) {
                        answered += 1;
                    }
                    self.read_body(&mut ex, bytes, end, head_request)
                }
                Head::Truncated { headers } => {
                    ex.headers = headers;
                    ex.head_len = bytes.len() - pos;
                    ex.extractable = false;
                    ex.diagnostics.push(ExchangeDiagnostic::PayloadTruncated {
                        declared: None,
                        available: (bytes.len() - pos) as u64,
                    });
                    debug!(session = self.session_id, offset = pos, "header section cut by end of capture");
                    bytes.len()
                }
                Head::Oversized => {
                    debug!(session = self.session_id, offset = pos, "header section too large, resyncing");
                    pos = buffer.next_boundary_after(pos).unwrap_or(bytes.len());
                    continue;
                }
            };

            ex.first_packet = buffer.packet_at(pos);
            ex.last_packet = buffer.packet_at(end.saturating_sub(1).max(pos));
            ex.timestamp = self.packet_time(ex.first_packet);
            ex.last_timestamp = self.packet_time(ex.last_packet);
            ex.wire_bytes = (end - pos) as u64;

            if ex.extractable && ex.header("content-encoding").is_some() {
                if let Err(ContentError::DecompressionFailure(reason)) = self.codec.extract(bytes, &ex) {
                    ex.diagnostics
                        .push(ExchangeDiagnostic::DecompressionFailure { reason });
                }
            }

            out.push(ex);
            pos = end;
        }
        out
    }

    fn packet_time(&self, packet: Option<usize>) -> f64 {
        packet
            .and_then(|i| self.session.packets.get(i))
            .map_or(0.0, |p| p.timestamp())
    }

    fn framing(&self, ex: &Exchange, head_request: bool) -> Framing {
        if let Some(status) = ex.status() {
            if status < 200 || status == 204 || status == 304 || head_request {
                return Framing::Empty;
            }
        }
        if ex.chunked {
            Framing::Chunked
        } else if let Some(n) = ex.content_length {
            Framing::Length(n)
        } else if ex.is_response() {
            Framing::UntilClose
        } else {
            Framing::Empty
        }
    }

    /// Fill in the body of `ex` starting at `start`; returns the offset
    /// where the next message may begin.
    fn read_body(&self, ex: &mut Exchange, bytes: &[u8], start: usize, head_request: bool) -> usize {
        ex.content_length = header_u64(&ex.headers, "content-length");
        ex.chunked = header_has_token(&ex.headers, "transfer-encoding", "chunked");

        if ex.status() == Some(206) {
            if let Some(Ok(ContentRange::Satisfied {
                first,
                last,
                instance_length,
            })) = ex.header("content-range").map(parse_content_range)
            {
                let span = last.checked_sub(first).and_then(|d| d.checked_add(1));
                let consistent = match (span, ex.content_length) {
                    (Some(n), Some(cl)) => n == cl,
                    (Some(_), None) => true,
                    (None, _) => false,
                };
                if consistent {
                    ex.range = Some(ByteRange::new(first, last));
                    ex.instance_length = instance_length;
                } else {
                    debug!(
                        session = self.session_id,
                        first,
                        last,
                        content_length = ?ex.content_length,
                        "content-range disagrees with body length, ignoring"
                    );
                }
            }
        }

        match self.framing(ex, head_request) {
            Framing::Empty => start,
            Framing::UntilClose => {
                ex.body.insert(start, bytes.len() - start);
                bytes.len()
            }
            Framing::Length(declared) => {
                let available = bytes.len() - start;
                let take = usize::try_from(declared).unwrap_or(usize::MAX).min(available);
                ex.body.insert(start, take);
                if (take as u64) < declared {
                    ex.diagnostics.push(ExchangeDiagnostic::PayloadTruncated {
                        declared: Some(declared),
                        available: take as u64,
                    });
                    if self.codec.below_threshold(take as u64, declared) {
                        ex.extractable = false;
                    }
                    debug!(
                        session = self.session_id,
                        declared,
                        available = take,
                        extractable = ex.extractable,
                        "payload shorter than content-length"
                    );
                }
                start + take
            }
            Framing::Chunked => match chunked::decode(&bytes[start..]) {
                Ok(body) => {
                    ex.body.insert(start, body.consumed);
                    ex.chunks_complete = true;
                    start + body.consumed
                }
                Err(err) => {
                    let (end, offset) = match &err {
                        ChunkError::Truncated { .. } => (bytes.len(), None),
                        ChunkError::Malformed { offset, .. } => (start + offset, Some(*offset)),
                    };
                    warn!(session = self.session_id, error = %err, "chunked body corrupt");
                    ex.body.insert(start, end - start);
                    ex.diagnostics
                        .push(ExchangeDiagnostic::ChunkFramingCorrupt { offset });
                    end
                }
            },
        }
    }
}

enum Head {
    Complete { headers: HeaderMap, end: usize },
    Truncated { headers: HeaderMap },
    Oversized,
}

/// Line at `pos` (terminator stripped) and the offset after it, if a line
/// feed occurs before `limit`.
fn line_at(bytes: &[u8], pos: usize, limit: usize) -> Option<(&[u8], usize)> {
    let window = bytes.get(pos..limit)?;
    let nl = window.iter().position(|&b| b == b'\n')?;
    let line = &window[..nl];
    Some((line.strip_suffix(b"\r").unwrap_or(line), pos + nl + 1))
}

fn parse_head(bytes: &[u8], pos: usize, limit: usize) -> Head {
    let mut headers = HeaderMap::new();
    let Some((_, mut cur)) = line_at(bytes, pos, limit) else {
        return Head::Oversized;
    };

    loop {
        match line_at(bytes, cur, limit) {
            Some((line, after)) if line.is_empty() => {
                return Head::Complete {
                    headers,
                    end: after,
                };
            }
            Some((line, after)) => {
                append_header(&mut headers, line);
                cur = after;
            }
            None if limit == bytes.len() => return Head::Truncated { headers },
            None => return Head::Oversized,
        }
    }
}

fn append_header(headers: &mut HeaderMap, line: &[u8]) {
    let Some(colon) = line.iter().position(|&b| b == b':') else {
        return;
    };
    let name = HeaderName::from_bytes(trim_ows(&line[..colon]));
    let value = HeaderValue::from_bytes(trim_ows(&line[colon + 1..]));
    match (name, value) {
        (Ok(n), Ok(v)) => {
            headers.append(n, v);
        }
        _ => debug!(line = %String::from_utf8_lossy(line), "skipping invalid header line"),
    }
}

/// Strip optional whitespace around a header name or value.
fn trim_ows(b: &[u8]) -> &[u8] {
    let start = b
        .iter()
        .position(|c| !c.is_ascii_whitespace())
        .unwrap_or(b.len());
    let end = b
        .iter()
        .rposition(|c| !c.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &b[start..end]
}

/// Request line or status line; anything else is not a message start.
pub(super) fn parse_start_line(line: &[u8]) -> Option<StartLine> {
    let line = std::str::from_utf8(line).ok()?;
    let mut parts = line.splitn(3, ' ');
    let first = parts.next()?;

    if first.starts_with("HTTP/") {
        let code = parts.next()?;
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        return Some(StartLine::Response {
            version: first.to_string(),
            status: code.parse().ok()?,
            reason: parts.next().unwrap_or("").to_string(),
        });
    }

    let uri = parts.next()?;
    let version = parts.next()?;
    if !is_token(first.as_bytes())
        || uri.is_empty()
        || !version.starts_with("HTTP/")
        || version.contains(' ')
    {
        return None;
    }
    Some(StartLine::Request {
        method: first.to_string(),
        uri: uri.to_string(),
        version: version.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&b"GET /index.html HTTP/1.1"[..], Some("GET"), None)]
    #[case(&b"HTTP/1.1 206 Partial Content"[..], None, Some(206))]
    #[case(&b"HTTP/1.0 200"[..], None, Some(200))]
    #[case(&b"HTTP/1.1 20 OK"[..], None, None)]
    #[case(&b"GET /index.html"[..], None, None)]
    #[case(&b"G(T / HTTP/1.1"[..], None, None)]
    #[case(&b"\x17\x03\x03\x00\x20"[..], None, None)]
    fn start_line_cases(
        #[case] line: &[u8],
        #[case] method: Option<&str>,
        #[case] status: Option<u16>,
    ) {
        let parsed = parse_start_line(line);
        match (&parsed, method, status) {
            (Some(StartLine::Request { method: m, .. }), Some(want), None) => assert_eq!(m, want),
            (Some(StartLine::Response { status: s, .. }), None, Some(want)) => assert_eq!(*s, want),
            (None, None, None) => {}
            _ => panic!("unexpected parse {parsed:?}"),
        }
    }

    #[test]
    fn head_keeps_repeated_fields_and_skips_garbage() {
        let raw = b"HTTP/1.1 200 OK\r\nSet-Cookie: a=1\r\nnot a header\r\nSet-Cookie: b=2\r\n\r\nbody";
        match parse_head(raw, 0, raw.len()) {
            Head::Complete { headers, end } => {
                assert_eq!(headers.get_all("set-cookie").iter().count(), 2);
                assert_eq!(&raw[end..], b"body");
            }
            _ => panic!("head should be complete"),
        }
    }

    #[test]
    fn head_cut_by_capture_end_is_truncated() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n";
        assert!(matches!(parse_head(raw, 0, raw.len()), Head::Truncated { .. }));
        assert!(matches!(parse_head(raw, 0, 20), Head::Oversized));
    }
}
