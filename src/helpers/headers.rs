// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

use hyper::HeaderMap;

/// Retrieve a header value as a string, if it exists and contains only visible ASCII.
///
/// Returns `None` if the header is missing or contains non-visible ASCII characters
/// (control characters) or non-ASCII bytes.
pub fn get_header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Parse a comma-separated list of header values (e.g., Connection, Transfer-Encoding).
///
/// This iterator splits by comma, trims whitespace, and skips empty parts.
pub fn parse_list_header(val: &str) -> impl Iterator<Item = &str> {
    val.split(',').map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Split on top-level commas, keeping commas inside quoted-strings intact.
pub fn split_commas_respecting_quotes(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut in_quote = false;
    let mut prev_backslash = false;

    for (i, b) in s.as_bytes().iter().enumerate() {
        match *b {
            b'\\' if in_quote && !prev_backslash => {
                prev_backslash = true;
                continue;
            }
            b'"' if !prev_backslash => in_quote = !in_quote,
            b',' if !in_quote => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        prev_backslash = false;
    }
    parts.push(&s[start..]);
    parts
}

/// True when any field named `name` lists `token` (case-insensitive), e.g.
/// `Transfer-Encoding: gzip, chunked` has token `chunked`.
pub fn header_has_token(headers: &HeaderMap, name: &str, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(parse_list_header)
        .any(|t| {
            let t = t.split(';').next().unwrap_or("").trim();
            t.eq_ignore_ascii_case(token)
        })
}

/// Parse the first field named `name` as a non-negative decimal integer.
pub fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    get_header_str(headers, name).and_then(|s| s.trim().parse::<u64>().ok())
}
