// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Small helpers to parse HTTP-date values and relate them to capture time.

use chrono::{DateTime, TimeZone, Utc};
use hyper::HeaderMap;

/// Parse an HTTP-date string (IMF-fixdate) into a `chrono::DateTime<Utc>`.
/// Returns an `anyhow::Error` when parsing fails.
pub fn parse_http_date_to_datetime(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let st =
        httpdate::parse_http_date(s).map_err(|e| anyhow::anyhow!("httpdate parse error: {}", e))?;
    Ok(DateTime::<Utc>::from(st))
}

/// Parse the header `name` as an HTTP-date; missing or malformed values yield `None`.
pub fn header_datetime(headers: &HeaderMap, name: &str) -> Option<DateTime<Utc>> {
    crate::helpers::headers::get_header_str(headers, name)
        .and_then(|s| parse_http_date_to_datetime(s.trim()).ok())
}

/// Convert a capture timestamp (seconds since the epoch) to a `DateTime<Utc>`.
pub fn capture_time(timestamp: f64) -> DateTime<Utc> {
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9) as u32;
    Utc.timestamp_opt(secs as i64, nanos)
        .single()
        .unwrap_or_default()
}
