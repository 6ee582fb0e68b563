// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Cache simulation over the reconstructed exchanges of a whole trace.
//!
//! Responses are replayed in capture order against a private cache. Each
//! one is classified (miss, duplicate, changed, ...) and duplicate bytes
//! are accounted only when the repeated content is byte-identical.

pub mod expiry;
pub mod ranges;

use crate::config::CacheConfig;
use crate::content::ContentCodec;
use crate::exchange::{ByteRange, Exchange};
use crate::helpers::cache_control::CacheDirectives;
use crate::http_date::capture_time;
use crate::session::Session;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

pub use expiry::Expiry;
pub use ranges::RangeSet;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Diagnosis {
    /// Response without a matching request.
    RequestNotFound,
    /// Request method outside the cacheable set.
    InvalidRequest,
    /// Status other than 200/206, or a 304 with nothing to revalidate.
    InvalidResponse,
    /// `no-store` on either side.
    NotCacheable,
    CacheMiss,
    NotExpiredDup,
    NotExpiredDupPartialHit,
    ObjChanged,
    ObjNotChanged304,
    ObjNotChangedDupServer,
    ObjNotChangedDupClient,
}

/// What makes two responses the same cached object.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectIdentity {
    pub host: String,
    pub path: String,
    /// ETag of the response.
    pub validator: Option<String>,
    /// Full object length.
    pub length: Option<u64>,
}

impl ObjectIdentity {
    fn loose(&self) -> LooseKey {
        (self.host.clone(), self.path.clone(), self.length)
    }
}

type LooseKey = (String, String, Option<u64>);

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExchangeRef {
    pub session: usize,
    pub exchange: usize,
}

#[derive(Serialize, Debug, Clone)]
pub struct CacheEntry {
    pub identity: ObjectIdentity,
    pub request: ExchangeRef,
    pub response: ExchangeRef,
    pub diagnosis: Diagnosis,
    pub hits: usize,
    /// Later responses counted as duplicates of this entry.
    pub duplicates: Vec<ExchangeRef>,
    pub duplicate_bytes: u64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CacheDecision {
    pub response: ExchangeRef,
    pub request: Option<ExchangeRef>,
    pub identity: Option<ObjectIdentity>,
    pub diagnosis: Diagnosis,
    pub expiry: Option<Expiry>,
    pub duplicate_bytes: u64,
    pub uncovered_bytes: u64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DuplicateEntry {
    pub identity: ObjectIdentity,
    pub original: ExchangeRef,
    pub occurrences: Vec<ExchangeRef>,
    pub bytes: u64,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct CacheReport {
    pub decisions: Vec<CacheDecision>,
    pub duplicates: Vec<DuplicateEntry>,
    pub total_response_bytes: u64,
    pub duplicate_bytes: u64,
    pub duplicate_ratio: f64,
    pub expiry: BTreeMap<Expiry, Vec<ExchangeRef>>,
    pub diagnosis_counts: BTreeMap<Diagnosis, usize>,
}

impl CacheReport {
    pub fn decision_for(&self, response: ExchangeRef) -> Option<&CacheDecision> {
        self.decisions.iter().find(|d| d.response == response)
    }
}

/// Run-scoped cache contents; dropped when the analysis returns.
#[derive(Default)]
struct CacheState {
    entries: Vec<CacheEntry>,
    by_identity: HashMap<ObjectIdentity, usize>,
    /// Same object ignoring the validator, for duplicates served without ETag.
    unvalidated: HashMap<LooseKey, usize>,
    ranges: HashMap<ObjectIdentity, RangeSet>,
    /// Responses whose bytes make up the cached ranges.
    pieces: HashMap<ObjectIdentity, Vec<ExchangeRef>>,
}

impl CacheState {
    fn lookup(&self, identity: &ObjectIdentity) -> Option<usize> {
        self.by_identity.get(identity).copied().or_else(|| {
            identity
                .validator
                .is_none()
                .then(|| self.unvalidated.get(&identity.loose()).copied())
                .flatten()
        })
    }

    fn insert(&mut self, entry: CacheEntry) -> usize {
        let idx = self.entries.len();
        self.by_identity.insert(entry.identity.clone(), idx);
        self.unvalidated.insert(entry.identity.loose(), idx);
        self.entries.push(entry);
        idx
    }

    fn has_path(&self, host: &str, path: &str) -> bool {
        self.by_identity
            .keys()
            .any(|k| k.host == host && k.path == path)
    }

    fn evict_path(&mut self, host: &str, path: &str) {
        self.by_identity
            .retain(|k, _| !(k.host == host && k.path == path));
        self.unvalidated
            .retain(|(h, p, _), _| !(h == host && p == path));
        self.ranges
            .retain(|k, _| !(k.host == host && k.path == path));
        self.pieces
            .retain(|k, _| !(k.host == host && k.path == path));
    }

    fn rekey(&mut self, idx: usize, identity: ObjectIdentity) {
        let old = self.entries[idx].identity.clone();
        self.by_identity.remove(&old);
        self.unvalidated.remove(&old.loose());
        self.ranges.remove(&old);
        self.pieces.remove(&old);
        self.by_identity.insert(identity.clone(), idx);
        self.unvalidated.insert(identity.loose(), idx);
        self.entries[idx].identity = identity;
    }
}

struct Outcome {
    diagnosis: Diagnosis,
    identity: Option<ObjectIdentity>,
    expiry: Option<Expiry>,
    duplicate_bytes: u64,
    uncovered_bytes: u64,
}

impl Outcome {
    fn rejected(diagnosis: Diagnosis) -> Self {
        Self {
            diagnosis,
            identity: None,
            expiry: None,
            duplicate_bytes: 0,
            uncovered_bytes: 0,
        }
    }
}

pub struct CacheSemanticsEngine {
    cfg: CacheConfig,
    codec: ContentCodec,
}

impl Default for CacheSemanticsEngine {
    fn default() -> Self {
        Self::new(&CacheConfig::default(), ContentCodec::default())
    }
}

impl CacheSemanticsEngine {
    pub fn new(cfg: &CacheConfig, codec: ContentCodec) -> Self {
        Self {
            cfg: cfg.clone(),
            codec,
        }
    }

    pub fn analyze(&self, sessions: &[Session]) -> CacheReport {
        let mut state = CacheState::default();
        let mut report = CacheReport::default();

        let mut responses: Vec<(ExchangeRef, f64)> = sessions
            .iter()
            .enumerate()
            .flat_map(|(s, session)| {
                session.responses().map(move |ex| {
                    (
                        ExchangeRef {
                            session: s,
                            exchange: ex.index,
                        },
                        ex.timestamp,
                    )
                })
            })
            .collect();
        responses.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        for (resp_ref, _) in responses {
            let session = &sessions[resp_ref.session];
            let response = &session.exchanges[resp_ref.exchange];
            let buffer_len = session.stream(response.direction).len();
            report.total_response_bytes += self.codec.actual_byte_count(buffer_len, response);

            let req_ref = response.paired.map(|i| ExchangeRef {
                session: resp_ref.session,
                exchange: i,
            });
            let outcome = match req_ref {
                Some(r) => self.classify(&mut state, sessions, r, resp_ref),
                None => Outcome::rejected(Diagnosis::RequestNotFound),
            };

            debug!(
                session = resp_ref.session,
                exchange = resp_ref.exchange,
                diagnosis = ?outcome.diagnosis,
                "cache decision"
            );
            report.duplicate_bytes += outcome.duplicate_bytes;
            *report.diagnosis_counts.entry(outcome.diagnosis).or_default() += 1;
            if let Some(e) = outcome.expiry {
                report.expiry.entry(e).or_default().push(resp_ref);
            }
            report.decisions.push(CacheDecision {
                response: resp_ref,
                request: req_ref,
                identity: outcome.identity,
                diagnosis: outcome.diagnosis,
                expiry: outcome.expiry,
                duplicate_bytes: outcome.duplicate_bytes,
                uncovered_bytes: outcome.uncovered_bytes,
            });
        }

        report.duplicate_ratio = if report.total_response_bytes > 0 {
            report.duplicate_bytes as f64 / report.total_response_bytes as f64
        } else {
            0.0
        };
        report.duplicates = state
            .entries
            .into_iter()
            .filter(|e| !e.duplicates.is_empty())
            .map(|e| DuplicateEntry {
                identity: e.identity,
                original: e.response,
                occurrences: e.duplicates,
                bytes: e.duplicate_bytes,
            })
            .collect();
        report
    }

    fn classify(
        &self,
        state: &mut CacheState,
        sessions: &[Session],
        req_ref: ExchangeRef,
        resp_ref: ExchangeRef,
    ) -> Outcome {
        let session = &sessions[resp_ref.session];
        let request = &session.exchanges[req_ref.exchange];
        let response = &session.exchanges[resp_ref.exchange];

        let Some(method) = request.method() else {
            return Outcome::rejected(Diagnosis::InvalidRequest);
        };
        if !self.cfg.is_cacheable_method(method) {
            return Outcome::rejected(Diagnosis::InvalidRequest);
        }

        let host = request.host(session);
        let path = request.path().unwrap_or("/").to_string();

        if CacheDirectives::from_headers(&request.headers).no_store
            || CacheDirectives::from_headers(&response.headers).no_store
        {
            state.evict_path(&host, &path);
            return Outcome::rejected(Diagnosis::NotCacheable);
        }

        match response.status() {
            Some(304) if state.has_path(&host, &path) => {
                if let Some(idx) = state
                    .entries
                    .iter()
                    .rposition(|e| e.identity.host == host && e.identity.path == path)
                {
                    state.entries[idx].hits += 1;
                }
                return Outcome::rejected(Diagnosis::ObjNotChanged304);
            }
            Some(200) | Some(206) => {}
            _ => return Outcome::rejected(Diagnosis::InvalidResponse),
        }

        let buffer = session.stream(response.direction).bytes();
        let identity = ObjectIdentity {
            host,
            path,
            validator: response.header("etag").map(|s| s.trim().to_string()),
            length: self.object_length(buffer, response),
        };
        let range = self.byte_range(buffer, response);
        let body_bytes = self.codec.actual_byte_count(buffer.len(), response);

        let Some(idx) = state.lookup(&identity) else {
            state.insert(CacheEntry {
                identity: identity.clone(),
                request: req_ref,
                response: resp_ref,
                diagnosis: Diagnosis::CacheMiss,
                hits: 0,
                duplicates: Vec::new(),
                duplicate_bytes: 0,
            });
            merge_range(state, &identity, range, resp_ref);
            return Outcome {
                diagnosis: Diagnosis::CacheMiss,
                identity: Some(identity),
                expiry: None,
                duplicate_bytes: 0,
                uncovered_bytes: 0,
            };
        };

        let stored_ref = state.entries[idx].response;
        let stored_session = &sessions[stored_ref.session];
        let stored = &stored_session.exchanges[stored_ref.exchange];
        let stored_buf = stored_session.stream(stored.direction).bytes();
        state.entries[idx].hits += 1;

        let expiry = expiry::evaluate(
            stored,
            request,
            capture_time(request.timestamp),
            self.cfg.heuristic_freshness_secs,
        );
        let same = self.codec.same_content(stored_buf, stored, buffer, response);
        let entry_identity = state.entries[idx].identity.clone();

        let (diagnosis, duplicate_bytes, uncovered_bytes) = if !expiry.is_expired() {
            let covered = state.ranges.get(&entry_identity);
            let uncovered = range.map_or(0, |r| covered.map_or(r.len(), |set| set.uncovered(r)));
            let hit = range.map_or(true, |r| covered.is_some_and(|set| set.covers(r)));
            let diagnosis = if hit {
                Diagnosis::NotExpiredDup
            } else {
                Diagnosis::NotExpiredDupPartialHit
            };
            let dup = self.verified_bytes(state, sessions, &entry_identity, resp_ref, body_bytes);
            (diagnosis, dup, uncovered)
        } else if same && stored.header("last-modified") == response.header("last-modified") {
            let conditional = request.header("if-none-match").is_some()
                || request.header("if-modified-since").is_some();
            let diagnosis = if conditional {
                Diagnosis::ObjNotChangedDupServer
            } else {
                Diagnosis::ObjNotChangedDupClient
            };
            let dup = self.verified_bytes(state, sessions, &entry_identity, resp_ref, body_bytes);
            (diagnosis, dup, 0)
        } else {
            state.rekey(idx, identity.clone());
            let entry = &mut state.entries[idx];
            entry.request = req_ref;
            entry.response = resp_ref;
            entry.diagnosis = Diagnosis::ObjChanged;
            (Diagnosis::ObjChanged, 0, 0)
        };

        if diagnosis != Diagnosis::ObjChanged {
            let entry = &mut state.entries[idx];
            entry.duplicates.push(resp_ref);
            entry.duplicate_bytes += duplicate_bytes;
        }
        let key = state.entries[idx].identity.clone();
        merge_range(state, &key, range, resp_ref);

        Outcome {
            diagnosis,
            identity: Some(identity),
            expiry: Some(expiry),
            duplicate_bytes,
            uncovered_bytes,
        }
    }

    /// Body bytes of `resp_ref` whose content matches, byte for byte, a
    /// stored piece of the object. A fully matched body counts whole.
    fn verified_bytes(
        &self,
        state: &CacheState,
        sessions: &[Session],
        identity: &ObjectIdentity,
        resp_ref: ExchangeRef,
        body_bytes: u64,
    ) -> u64 {
        let (session, response) = resolve(sessions, resp_ref);
        let buffer = session.stream(response.direction).bytes();
        let Some(wanted) = self.codec.content_range(buffer, response) else {
            return 0;
        };

        let mut matched = RangeSet::default();
        for &piece_ref in state.pieces.get(identity).into_iter().flatten() {
            let (piece_session, piece) = resolve(sessions, piece_ref);
            let piece_buf = piece_session.stream(piece.direction).bytes();
            if let Some(r) = self.codec.matching_range(piece_buf, piece, buffer, response) {
                matched.insert(r);
            }
        }

        let verified = wanted.len().saturating_sub(matched.uncovered(wanted));
        if verified == wanted.len() {
            body_bytes
        } else {
            verified.min(body_bytes)
        }
    }

    /// Full object length: the Content-Range instance length of a 206,
    /// otherwise the declared or decoded body length.
    fn object_length(&self, buffer: &[u8], response: &Exchange) -> Option<u64> {
        if response.status() == Some(206) {
            return response.instance_length;
        }
        response.content_length.or_else(|| {
            self.codec
                .extract(buffer, response)
                .ok()
                .map(|c| c.len() as u64)
        })
    }

    /// Object bytes a response carries.
    fn byte_range(&self, buffer: &[u8], response: &Exchange) -> Option<ByteRange> {
        if response.range.is_some() {
            return response.range;
        }
        let len = self.object_length(buffer, response)?;
        (len > 0).then(|| ByteRange::new(0, len - 1))
    }
}

fn resolve(sessions: &[Session], r: ExchangeRef) -> (&Session, &Exchange) {
    let session = &sessions[r.session];
    (session, &session.exchanges[r.exchange])
}

fn merge_range(
    state: &mut CacheState,
    identity: &ObjectIdentity,
    range: Option<ByteRange>,
    response: ExchangeRef,
) {
    let adds_bytes = match range {
        Some(r) => {
            let set = state.ranges.entry(identity.clone()).or_default();
            let fresh = !set.covers(r);
            set.insert(r);
            fresh
        }
        None => true,
    };
    if adds_bytes {
        state.pieces.entry(identity.clone()).or_default().push(response);
    }
}
