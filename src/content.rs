// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Payload extraction, decompression and comparison for exchanges.

use crate::chunked;
use crate::exchange::{ByteRange, Exchange};
use crate::helpers::headers::header_has_token;
use flate2::read::GzDecoder;
use std::io::Read;
use tracing::warn;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    #[error("exchange content is not extractable")]
    NotExtractable,
    #[error("payload truncated: {available} of {declared} bytes captured")]
    PayloadTruncated { declared: u64, available: u64 },
    #[error("chunk framing corrupt after {} bytes", partial.len())]
    ChunkFramingCorrupt { partial: Vec<u8> },
    #[error("gzip decompression failed: {0}")]
    DecompressionFailure(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ContentCodec {
    /// Share of the declared length that must be captured for content to
    /// be usable.
    pub completeness_threshold: f64,
}

impl Default for ContentCodec {
    fn default() -> Self {
        Self {
            completeness_threshold: 0.9,
        }
    }
}

impl ContentCodec {
    pub fn new(completeness_threshold: f64) -> Self {
        Self {
            completeness_threshold,
        }
    }

    /// True when `available` bytes fall materially short of `declared`.
    pub fn below_threshold(&self, available: u64, declared: u64) -> bool {
        (available as f64) < self.completeness_threshold * declared as f64
    }

    /// Wire body bytes of `exchange`, clipped to what `buffer` holds.
    pub fn raw_bytes(&self, buffer: &[u8], exchange: &Exchange) -> Vec<u8> {
        let mut out = Vec::with_capacity(exchange.body_len());
        for (offset, len) in exchange.body.iter() {
            let end = (offset + len).min(buffer.len());
            if offset < end {
                out.extend_from_slice(&buffer[offset..end]);
            }
        }
        out
    }

    /// Decoded content: chunk framing removed, then gzip undone.
    pub fn extract(&self, buffer: &[u8], exchange: &Exchange) -> Result<Vec<u8>, ContentError> {
        if !exchange.extractable {
            return Err(ContentError::NotExtractable);
        }
        let raw = self.raw_bytes(buffer, exchange);

        let body = if exchange.chunked {
            match chunked::decode(&raw) {
                Ok(body) => body.collect(&raw),
                Err(e) => {
                    return Err(ContentError::ChunkFramingCorrupt {
                        partial: e.partial().collect(&raw),
                    })
                }
            }
        } else {
            if let Some(declared) = exchange.content_length {
                if self.below_threshold(raw.len() as u64, declared) {
                    return Err(ContentError::PayloadTruncated {
                        declared,
                        available: raw.len() as u64,
                    });
                }
            }
            raw
        };

        if is_gzip(exchange) {
            return decompress_gzip(&body).map_err(|e| {
                warn!(
                    session = exchange.session,
                    exchange = exchange.index,
                    error = %e,
                    "gzip decompression failed"
                );
                ContentError::DecompressionFailure(e.to_string())
            });
        }
        Ok(body)
    }

    /// Body bytes actually present in a buffer of `buffer_len` bytes.
    pub fn actual_byte_count(&self, buffer_len: usize, exchange: &Exchange) -> u64 {
        exchange
            .body
            .iter()
            .map(|(offset, len)| (offset + len).min(buffer_len).saturating_sub(offset) as u64)
            .sum()
    }

    /// Object bytes the decoded content of `exchange` spans: its 206 range
    /// start, or zero, onward.
    pub fn content_range(&self, buffer: &[u8], exchange: &Exchange) -> Option<ByteRange> {
        let content = self.extract(buffer, exchange).ok()?;
        span(exchange, content.len())
    }

    /// Whether two exchanges carry the same bytes where their object ranges
    /// overlap. Without ranges both contents must be identical.
    pub fn same_content(&self, a_buf: &[u8], a: &Exchange, b_buf: &[u8], b: &Exchange) -> bool {
        let (Ok(ca), Ok(cb)) = (self.extract(a_buf, a), self.extract(b_buf, b)) else {
            return false;
        };
        if a.range.is_none() && b.range.is_none() {
            return ca == cb;
        }
        matches!(overlap(a, &ca, b, &cb), Some((_, true)))
    }

    /// Object bytes where `a` and `b` overlap with identical content.
    pub fn matching_range(
        &self,
        a_buf: &[u8],
        a: &Exchange,
        b_buf: &[u8],
        b: &Exchange,
    ) -> Option<ByteRange> {
        let ca = self.extract(a_buf, a).ok()?;
        let cb = self.extract(b_buf, b).ok()?;
        if a.range.is_none() && b.range.is_none() && ca != cb {
            return None;
        }
        overlap(a, &ca, b, &cb).and_then(|(r, same)| same.then_some(r))
    }
}

fn span(exchange: &Exchange, len: usize) -> Option<ByteRange> {
    let first = exchange.range.map_or(0, |r| r.first);
    let len = u64::try_from(len).ok()?.checked_sub(1)?;
    Some(ByteRange::new(first, first.checked_add(len)?))
}

/// Overlap of two decoded contents in object coordinates, and whether the
/// bytes there agree.
fn overlap(a: &Exchange, ca: &[u8], b: &Exchange, cb: &[u8]) -> Option<(ByteRange, bool)> {
    let ra = span(a, ca.len())?;
    let rb = span(b, cb.len())?;
    let first = ra.first.max(rb.first);
    let last = ra.last.min(rb.last);
    if first > last {
        return None;
    }
    let same = window(ca, ra.first, first, last)? == window(cb, rb.first, first, last)?;
    Some((ByteRange::new(first, last), same))
}

fn window(content: &[u8], origin: u64, first: u64, last: u64) -> Option<&[u8]> {
    let lo = usize::try_from(first.checked_sub(origin)?).ok()?;
    let hi = usize::try_from(last.checked_sub(origin)?).ok()?;
    content.get(lo..=hi)
}

fn is_gzip(exchange: &Exchange) -> bool {
    header_has_token(&exchange.headers, "content-encoding", "gzip")
        || header_has_token(&exchange.headers, "content-encoding", "x-gzip")
}

pub fn decompress_gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
