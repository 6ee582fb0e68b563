// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

mod common;

use std::io::Write;

use common::{run, trace, Flow};
use flate2::write::GzEncoder;
use flate2::Compression;
use trace_http::analysis::analyze;
use trace_http::chunked;
use trace_http::config::Config;
use trace_http::exchange::ExchangeDiagnostic;
use trace_http::packet::Direction;
use trace_http::reassembly::{HttpStreamReassembler, Reassembler};

fn mixed_flows() -> Vec<Flow> {
    let chunked_body = chunked::encode(b"the quick brown fox jumps over the lazy dog", 7);
    let mut chunked_response = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    chunked_response.extend_from_slice(&chunked_body);
    let (head, tail) = chunked_response.split_at(30);

    vec![
        Flow::open(0, 41000)
            .request(b"GET /a HTTP/1.1\r\nHost: example.com\r\n\r\n")
            .response(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello")
            .retransmit_last_response()
            .request(b"GET /b HTTP/1.1\r\nHost: example.com\r\n\r\n")
            .response_segments(&[head, tail])
            .close(),
        Flow::open(1, 41001)
            .request(b"POST /upload HTTP/1.1\r\nHost: example.com\r\nContent-Length: 3\r\n\r\nabc")
            .response(b"HTTP/1.1 201 Created\r\nContent-Length: 1000\r\n\r\nshort")
            .close(),
    ]
}

#[test]
fn reassembly_is_idempotent() -> anyhow::Result<()> {
    let analysis = run(mixed_flows());
    let reassembler = HttpStreamReassembler::default();

    for (i, session) in analysis.sessions.iter().enumerate() {
        let mut again = session.clone();
        reassembler.reassemble(i, &mut again);
        assert_eq!(
            serde_json::to_value(&again.exchanges)?,
            serde_json::to_value(&session.exchanges)?
        );
        assert_eq!(again.uplink_stream, session.uplink_stream);
        assert_eq!(again.downlink_stream, session.downlink_stream);
    }

    let packets = trace(mixed_flows());
    let first = analyze(&mut packets.clone().into_iter(), &Config::default());
    let second = analyze(&mut packets.into_iter(), &Config::default());
    assert_eq!(
        serde_json::to_value(first.summary())?,
        serde_json::to_value(second.summary())?
    );
    Ok(())
}

#[test]
fn exchanges_never_claim_more_than_captured_payload() {
    let analysis = run(mixed_flows());
    for session in &analysis.sessions {
        let assigned: u64 = session.exchanges.iter().map(|e| e.wire_bytes).sum();
        let captured =
            session.payload_bytes(Direction::Uplink) + session.payload_bytes(Direction::Downlink);
        assert!(assigned <= captured, "{} > {}", assigned, captured);
    }
}

#[test]
fn retransmitted_segment_is_reassembled_once() -> anyhow::Result<()> {
    let analysis = run(mixed_flows());
    let session = &analysis.sessions[0];
    let responses: Vec<_> = session.responses().collect();
    assert_eq!(responses.len(), 2);
    assert_eq!(session.payload(responses[0])?, b"hello");
    assert_eq!(
        session.payload(responses[1])?,
        b"the quick brown fox jumps over the lazy dog"
    );
    assert!(responses[1].chunked);
    Ok(())
}

#[test]
fn short_body_is_flagged_truncated() {
    let analysis = run(mixed_flows());
    let session = &analysis.sessions[1];
    let response = session.responses().next();
    let Some(response) = response else {
        panic!("missing response");
    };
    assert!(!response.extractable);
    assert!(response.has_diagnostic(|d| matches!(
        d,
        ExchangeDiagnostic::PayloadTruncated {
            declared: Some(1000),
            available: 5
        }
    )));
    assert!(session.payload(response).is_err());
}

#[test]
fn gzip_content_is_decoded() -> anyhow::Result<()> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(b"compressed hello")?;
    let gz = enc.finish()?;

    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\n\r\n",
        gz.len()
    )
    .into_bytes();
    response.extend_from_slice(&gz);

    let analysis = run(vec![Flow::open(0, 42000)
        .request(b"GET /z HTTP/1.1\r\nHost: example.com\r\n\r\n")
        .response(&response)]);
    let session = &analysis.sessions[0];
    let Some(ex) = session.responses().next() else {
        panic!("missing response");
    };
    assert_eq!(session.payload(ex)?, b"compressed hello");
    assert!(ex.diagnostics.is_empty());
    Ok(())
}
