// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

use std::num::ParseIntError;

/// Result of parsing a `Content-Range` header value.
#[derive(Debug, PartialEq, Eq)]
pub enum ContentRange {
    /// Example: `bytes 0-499/1234` or `bytes 0-499/*` (instance_length = None for `*`).
    Satisfied {
        first: u64,
        last: u64,
        instance_length: Option<u64>,
    },
    /// Example: `bytes */1234` used in `416 Range Not Satisfiable` responses.
    Unsatisfiable { instance_length: u64 },
}

/// Parse a `Content-Range` header value. Returns a `ContentRange` or an error string.
pub fn parse_content_range(s: &str) -> Result<ContentRange, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty header value".into());
    }

    // Expect unit SP range / instance-length
    let mut parts = s.splitn(2, ' ');
    let unit = parts.next().ok_or_else(|| "missing unit".to_string())?;
    if !unit.eq_ignore_ascii_case("bytes") {
        return Err(format!("unsupported unit '{}', expected 'bytes'", unit));
    }
    let rest = parts
        .next()
        .ok_or_else(|| "missing range/spec".to_string())?
        .trim();

    let (left, right) = rest
        .split_once('/')
        .ok_or_else(|| "missing '/' in range/spec".to_string())?;
    let left = left.trim();
    let right = right.trim();

    if left.starts_with('*') {
        if left != "*" {
            return Err("unexpected value before '/'".into());
        }
        let instance_length =
            parse_u64(right).map_err(|e| format!("invalid instance-length: {}", e))?;
        return Ok(ContentRange::Unsatisfiable { instance_length });
    }

    let (first, last) = left
        .split_once('-')
        .ok_or_else(|| "missing '-' in byte-range".to_string())?;
    let first = first.trim();
    let last = last.trim();

    if first.is_empty() || last.is_empty() {
        return Err("missing first or last byte-pos".into());
    }

    let first_v = parse_u64(first).map_err(|e| format!("invalid first byte-pos: {}", e))?;
    let last_v = parse_u64(last).map_err(|e| format!("invalid last byte-pos: {}", e))?;
    if first_v > last_v {
        return Err("first byte-pos greater than last".into());
    }

    let instance_length = if right == "*" {
        None
    } else {
        Some(parse_u64(right).map_err(|e| format!("invalid instance-length: {}", e))?)
    };

    Ok(ContentRange::Satisfied {
        first: first_v,
        last: last_v,
        instance_length,
    })
}

fn parse_u64(s: &str) -> Result<u64, ParseIntError> {
    s.parse::<u64>()
}
