// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Freshness of a stored response at the time of a later request.

use crate::exchange::Exchange;
use crate::helpers::cache_control::CacheDirectives;
use crate::helpers::headers::header_u64;
use crate::http_date::{capture_time, header_datetime};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Expiry {
    Expired,
    NotExpired,
    ExpiredHeuristic,
    NotExpiredHeuristic,
}

impl Expiry {
    pub fn is_expired(self) -> bool {
        matches!(self, Expiry::Expired | Expiry::ExpiredHeuristic)
    }
}

/// Decide whether `stored` (the cached response) is still fresh when
/// `request` is issued at `now`. Rules apply in order, first match wins:
///
/// 1. `no-cache` on the stored response or the new request
/// 2. stored Date + max-age already passed
/// 3. stored Expires already passed
/// 4. request max-age (from the request Date, else the stored Date) passed
/// 5. stored Age >= max-age
/// 6. stored Age >= Expires - Date
/// 7. fresh while Expires or Date + max-age lies ahead
/// 8. heuristic: fresh for `heuristic_secs` after Date (or capture time)
pub fn evaluate(stored: &Exchange, request: &Exchange, now: DateTime<Utc>, heuristic_secs: i64) -> Expiry {
    let resp_cc = CacheDirectives::from_headers(&stored.headers);
    let req_cc = CacheDirectives::from_headers(&request.headers);

    if resp_cc.no_cache || req_cc.no_cache {
        return Expiry::Expired;
    }

    let date = header_datetime(&stored.headers, "date");
    let expires = header_datetime(&stored.headers, "expires");
    let age = header_u64(&stored.headers, "age").map(|a| a.min(i64::MAX as u64) as i64);
    let fresh_until = date.zip(resp_cc.max_age).map(|(d, m)| add_secs(d, m));

    if fresh_until.is_some_and(|t| t < now) {
        return Expiry::Expired;
    }
    if expires.is_some_and(|e| e < now) {
        return Expiry::Expired;
    }
    if let Some(max_age) = req_cc.max_age {
        let base = header_datetime(&request.headers, "date").or(date);
        if base.is_some_and(|d| add_secs(d, max_age) < now) {
            return Expiry::Expired;
        }
    }
    if let (Some(a), Some(m)) = (age, resp_cc.max_age) {
        if a >= m {
            return Expiry::Expired;
        }
    }
    if let (Some(a), Some(e), Some(d)) = (age, expires, date) {
        if a >= (e - d).num_seconds() {
            return Expiry::Expired;
        }
    }
    if expires.is_some_and(|e| e > now) || fresh_until.is_some_and(|t| t >= now) {
        return Expiry::NotExpired;
    }

    let base = date.unwrap_or_else(|| capture_time(stored.timestamp));
    if now.signed_duration_since(base) < TimeDelta::try_seconds(heuristic_secs).unwrap_or(TimeDelta::MAX) {
        Expiry::NotExpiredHeuristic
    } else {
        Expiry::ExpiredHeuristic
    }
}

/// `d + secs`, saturating at the far future when out of range.
fn add_secs(d: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
    TimeDelta::try_seconds(secs)
        .and_then(|delta| d.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
