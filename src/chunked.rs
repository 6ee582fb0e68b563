// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! HTTP/1.1 chunked transfer coding.
//!
//! Decoding never copies: it reports where each chunk's data sits in the
//! input. Every loop is bounded by the input length.

use serde::Serialize;

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkedBody {
    /// `(offset, len)` of each chunk's data within the decoded input.
    pub segments: Vec<(usize, usize)>,
    /// Input bytes consumed, last-chunk and trailer section included.
    pub consumed: usize,
}

impl ChunkedBody {
    pub fn data_len(&self) -> usize {
        self.segments.iter().map(|(_, len)| len).sum()
    }

    /// Concatenate the chunk data out of the buffer that was decoded.
    pub fn collect(&self, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data_len());
        for &(offset, len) in &self.segments {
            if let Some(data) = input.get(offset..offset + len) {
                out.extend_from_slice(data);
            }
        }
        out
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk stream ended before the zero-size chunk")]
    Truncated { partial: ChunkedBody },
    #[error("malformed chunk framing at offset {offset}")]
    Malformed { offset: usize, partial: ChunkedBody },
}

impl ChunkError {
    /// Data decoded before the failure.
    pub fn partial(&self) -> &ChunkedBody {
        match self {
            ChunkError::Truncated { partial } | ChunkError::Malformed { partial, .. } => partial,
        }
    }
}

/// Next line starting at `pos`, without its terminator, and the position
/// after it. Accepts CRLF and bare LF.
fn next_line(input: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let rest = input.get(pos..)?;
    let nl = rest.iter().position(|&b| b == b'\n')?;
    let line = rest[..nl].strip_suffix(b"\r").unwrap_or(&rest[..nl]);
    Some((line, pos + nl + 1))
}

fn parse_size(line: &[u8]) -> Option<usize> {
    let size = line.split(|&b| b == b';').next().unwrap_or_default();
    let start = size
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(size.len());
    let end = size
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    let size = &size[start..end];
    if size.is_empty() || !size.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let s = std::str::from_utf8(size).ok()?;
    usize::from_str_radix(s, 16).ok()
}

pub fn decode(input: &[u8]) -> Result<ChunkedBody, ChunkError> {
    let mut body = ChunkedBody::default();
    let mut pos = 0usize;

    loop {
        let Some((line, after)) = next_line(input, pos) else {
            return Err(ChunkError::Truncated { partial: body });
        };
        let Some(size) = parse_size(line) else {
            return Err(ChunkError::Malformed { offset: pos, partial: body });
        };
        pos = after;

        if size == 0 {
            // trailer section up to the empty line; a capture cut right
            // after the last-chunk line still counts as complete
            while let Some((trailer, after)) = next_line(input, pos) {
                pos = after;
                if trailer.is_empty() {
                    break;
                }
            }
            body.consumed = pos.min(input.len());
            return Ok(body);
        }

        let available = input.len() - pos;
        if size > available {
            if available > 0 {
                body.segments.push((pos, available));
            }
            body.consumed = input.len();
            return Err(ChunkError::Truncated { partial: body });
        }
        body.segments.push((pos, size));
        pos += size;
        body.consumed = pos;

        let rest = &input[pos..];
        if rest.starts_with(b"\r\n") {
            pos += 2;
        } else if rest.starts_with(b"\n") {
            pos += 1;
        } else if rest.is_empty() || rest == b"\r" {
            return Err(ChunkError::Truncated { partial: body });
        } else {
            return Err(ChunkError::Malformed { offset: pos, partial: body });
        }
        body.consumed = pos;
    }
}

/// Frame `data` as chunks of at most `chunk_size` bytes plus the last chunk.
pub fn encode(data: &[u8], chunk_size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    for chunk in data.chunks(chunk_size.max(1)) {
        out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
    out
}
