// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

use crate::helpers::headers::split_commas_respecting_quotes;
use hyper::HeaderMap;

/// Largest delta-seconds value kept; bigger values are clamped to it.
pub const MAX_DELTA_SECONDS: i64 = 1 << 31;

/// Parse a delta-seconds value. Digits only; overflowing values saturate.
pub fn parse_delta_seconds(v: &str) -> Option<i64> {
    if v.is_empty() || !v.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n = v.parse::<u64>().unwrap_or(u64::MAX);
    Some(n.min(MAX_DELTA_SECONDS as u64) as i64)
}

/// Cache-Control directives relevant to storage and freshness, collected
/// across every `Cache-Control` field of a message. `Pragma: no-cache` is
/// folded into `no_cache`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheDirectives {
    pub no_cache: bool,
    pub no_store: bool,
    pub max_age: Option<i64>,
}

impl CacheDirectives {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut out = Self::default();

        for hv in headers.get_all("cache-control").iter() {
            let Ok(s) = hv.to_str() else {
                continue;
            };
            for member in split_commas_respecting_quotes(s) {
                let m = member.trim();
                if m.is_empty() {
                    continue;
                }
                let mut kv = m.splitn(2, '=');
                let name = kv.next().unwrap_or("").trim().to_ascii_lowercase();
                let value = kv.next().map(|v| v.trim().trim_matches('"'));
                match name.as_str() {
                    // `no-cache="field"` only restricts the named fields
                    "no-cache" if value.is_none() => out.no_cache = true,
                    "no-store" => out.no_store = true,
                    "max-age" => {
                        // first valid max-age wins
                        if out.max_age.is_none() {
                            out.max_age = value.and_then(parse_delta_seconds);
                        }
                    }
                    _ => {}
                }
            }
        }

        if crate::helpers::headers::header_has_token(headers, "pragma", "no-cache") {
            out.no_cache = true;
        }

        out
    }
}
