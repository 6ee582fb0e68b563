// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! End-to-end pipeline: packets -> sessions -> exchanges -> cache report.

use crate::cache::{CacheReport, CacheSemanticsEngine};
use crate::config::Config;
use crate::content::ContentCodec;
use crate::exchange::ExchangeDiagnostic;
use crate::packet::{Direction, PacketSource};
use crate::reassembly::{HttpStreamReassembler, Reassembler};
use crate::session::{
    FlowAssembler, Session, SessionAssembler, SessionDiagnostic, SessionKey, TcpStateAnnotator,
    Termination, TransportKind,
};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Analysis {
    pub sessions: Vec<Session>,
    pub cache: CacheReport,
}

pub fn analyze(source: &mut dyn PacketSource, cfg: &Config) -> Analysis {
    let mut sessions = FlowAssembler.assemble(source);
    let reassembler = HttpStreamReassembler::new(&cfg.reassembly);

    for (i, session) in sessions.iter_mut().enumerate() {
        TcpStateAnnotator::annotate(session);
        reassembler.reassemble(i, session);
    }

    let engine = CacheSemanticsEngine::new(
        &cfg.cache,
        ContentCodec::new(cfg.reassembly.completeness_threshold),
    );
    let cache = engine.analyze(&sessions);

    info!(
        sessions = sessions.len(),
        exchanges = sessions.iter().map(|s| s.exchanges.len()).sum::<usize>(),
        duplicate_bytes = cache.duplicate_bytes,
        total_response_bytes = cache.total_response_bytes,
        "analysis complete"
    );
    Analysis { sessions, cache }
}

#[derive(Serialize, Debug, Clone)]
pub struct ExchangeSummary {
    pub index: usize,
    pub direction: Direction,
    pub method: Option<String>,
    pub uri: Option<String>,
    pub status: Option<u16>,
    pub timestamp: f64,
    pub wire_bytes: u64,
    /// Inferred from TLS records; carries no HTTP head.
    pub opaque: bool,
    pub extractable: bool,
    pub paired: Option<usize>,
    pub diagnostics: Vec<ExchangeDiagnostic>,
}

#[derive(Serialize, Debug, Clone)]
pub struct SessionSummary {
    pub index: usize,
    pub key: SessionKey,
    pub transport: TransportKind,
    pub remote_host: Option<String>,
    pub packets: usize,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub uplink_bytes: u64,
    pub downlink_bytes: u64,
    pub latency: Option<f64>,
    pub ssl: bool,
    pub termination: Option<Termination>,
    pub exchanges: Vec<ExchangeSummary>,
    pub diagnostics: Vec<SessionDiagnostic>,
}

#[derive(Serialize, Debug, Clone)]
pub struct AnalysisSummary<'a> {
    pub sessions: Vec<SessionSummary>,
    pub cache: &'a CacheReport,
}

impl Analysis {
    pub fn summary(&self) -> AnalysisSummary<'_> {
        let sessions = self
            .sessions
            .iter()
            .enumerate()
            .map(|(index, s)| SessionSummary {
                index,
                key: s.key,
                transport: s.transport,
                remote_host: s.remote_host.clone(),
                packets: s.packets.len(),
                start: s.first_timestamp(),
                end: s.last_timestamp(),
                uplink_bytes: s.payload_bytes(Direction::Uplink),
                downlink_bytes: s.payload_bytes(Direction::Downlink),
                latency: s.connection_latency(),
                ssl: s.ssl,
                termination: s.termination,
                exchanges: s
                    .exchanges
                    .iter()
                    .map(|e| ExchangeSummary {
                        index: e.index,
                        direction: e.direction,
                        method: e.method().map(str::to_string),
                        uri: e.uri().map(str::to_string),
                        status: e.status(),
                        timestamp: e.timestamp,
                        wire_bytes: e.wire_bytes,
                        opaque: e.is_opaque(),
                        extractable: e.extractable,
                        paired: e.paired,
                        diagnostics: e.diagnostics.clone(),
                    })
                    .collect(),
                diagnostics: s.diagnostics.clone(),
            })
            .collect();

        AnalysisSummary {
            sessions,
            cache: &self.cache,
        }
    }
}
