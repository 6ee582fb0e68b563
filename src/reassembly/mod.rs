// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Request/response reconstruction from a session's byte streams.

mod http;
mod tls;

use crate::config::ReassemblyConfig;
use crate::content::ContentCodec;
use crate::exchange::{Exchange, ExchangeDiagnostic};
use crate::packet::Direction;
use crate::session::{Session, SessionDiagnostic};
use crate::stream::StreamBuffer;
use std::collections::VecDeque;
use tracing::{debug, warn};

pub trait Reassembler {
    /// Rebuild `session`'s streams and exchanges in place. Running it twice
    /// yields the same result.
    fn reassemble(&self, session_id: usize, session: &mut Session);
}

#[derive(Debug, Clone, Copy)]
pub struct HttpStreamReassembler {
    pub completeness_threshold: f64,
    pub max_header_bytes: usize,
}

impl Default for HttpStreamReassembler {
    fn default() -> Self {
        Self::new(&ReassemblyConfig::default())
    }
}

impl HttpStreamReassembler {
    pub fn new(cfg: &ReassemblyConfig) -> Self {
        Self {
            completeness_threshold: cfg.completeness_threshold,
            max_header_bytes: cfg.max_header_bytes,
        }
    }

    fn parser<'a>(&self, session_id: usize, session: &'a Session, direction: Direction) -> http::DirectionParser<'a> {
        http::DirectionParser {
            session_id,
            session,
            direction,
            codec: ContentCodec::new(self.completeness_threshold),
            max_header_bytes: self.max_header_bytes,
        }
    }
}

impl Reassembler for HttpStreamReassembler {
    fn reassemble(&self, session_id: usize, session: &mut Session) {
        session.exchanges.clear();
        session.uplink_stream = StreamBuffer::default();
        session.downlink_stream = StreamBuffer::default();

        if session.packets.is_empty() {
            warn!(session = session_id, "session without packets, skipping");
            if !session.diagnostics.contains(&SessionDiagnostic::SessionWithoutPackets) {
                session
                    .diagnostics
                    .push(SessionDiagnostic::SessionWithoutPackets);
            }
            return;
        }
        if !session.is_tcp() {
            return;
        }

        session.uplink_stream = StreamBuffer::build(session, Direction::Uplink);
        session.downlink_stream = StreamBuffer::build(session, Direction::Downlink);

        let mut exchanges = if session.ssl && !session.decrypted {
            tls::infer_exchanges(session_id, session)
        } else {
            let mut requests = self.parser(session_id, session, Direction::Uplink).parse(&[]);
            let methods: Vec<String> = requests
                .iter()
                .filter_map(|e| e.method().map(str::to_string))
                .collect();
            let responses = self
                .parser(session_id, session, Direction::Downlink)
                .parse(&methods);
            requests.extend(responses);
            requests
        };

        // chronological; a request never sorts after a response sharing its timestamp
        exchanges.sort_by(|a, b| {
            a.timestamp
                .total_cmp(&b.timestamp)
                .then_with(|| b.is_request().cmp(&a.is_request()))
        });
        for (i, ex) in exchanges.iter_mut().enumerate() {
            ex.index = i;
        }
        pair_fifo(session_id, &mut exchanges);

        debug!(
            session = session_id,
            exchanges = exchanges.len(),
            uplink_bytes = session.uplink_stream.len(),
            downlink_bytes = session.downlink_stream.len(),
            "reassembled session"
        );
        session.exchanges = exchanges;
    }
}

/// Pair each final response with the oldest unanswered request. Interim
/// (1xx) responses never consume a request.
fn pair_fifo(session_id: usize, exchanges: &mut [Exchange]) {
    let mut pending: VecDeque<usize> = VecDeque::new();

    for i in 0..exchanges.len() {
        if exchanges[i].is_request() {
            pending.push_back(i);
            continue;
        }
        if !exchanges[i].is_response() || exchanges[i].status().is_some_and(|s| s < 200) {
            continue;
        }
        match pending.pop_front() {
            Some(req) => {
                exchanges[req].paired = Some(i);
                exchanges[i].paired = Some(req);
            }
            None => {
                debug!(session = session_id, exchange = i, "response without request");
                exchanges[i]
                    .diagnostics
                    .push(ExchangeDiagnostic::RequestResponseUnlinked);
            }
        }
    }
}
