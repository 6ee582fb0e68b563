// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Transport sessions reconstructed from a packet trace.

pub mod assembler;
pub mod resolver;
pub mod tcp_state;

use crate::content::{ContentCodec, ContentError};
use crate::exchange::Exchange;
use crate::packet::{Direction, PacketRecord};
use crate::stream::StreamBuffer;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;

pub use assembler::{FlowAssembler, SessionAssembler};
pub use resolver::TransmissionStreamResolver;
pub use tcp_state::{TcpState, TcpStateAnnotator};

/// Device-side normalized 4-tuple identifying a flow.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote_port: u16,
    pub remote_addr: IpAddr,
}

impl SessionKey {
    pub fn of(p: &PacketRecord) -> Self {
        Self {
            local_addr: p.local_addr,
            local_port: p.local_port,
            remote_port: p.remote_port,
            remote_addr: p.remote_addr,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Udp,
}

/// A packet as owned by its session, with its resolved direction.
#[derive(Debug, Clone)]
pub struct SessionPacket {
    pub record: PacketRecord,
    /// Never `Direction::Unknown`; guessed when the decoder could not tell.
    pub direction: Direction,
    pub tcp_state: Option<TcpState>,
    /// Uplink SYN repeating the session's recorded base sequence number.
    pub handshake_retransmit: bool,
}

impl SessionPacket {
    pub fn new(record: PacketRecord, direction: Direction) -> Self {
        Self {
            record,
            direction,
            tcp_state: None,
            handshake_retransmit: false,
        }
    }

    pub fn timestamp(&self) -> f64 {
        self.record.timestamp
    }

    pub fn payload_len(&self) -> usize {
        self.record.payload_len()
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TerminationKind {
    Fin,
    Rst,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Termination {
    /// Index into `Session::packets`.
    pub packet: usize,
    pub kind: TerminationKind,
    /// Seconds between the terminating packet and the packet before it.
    pub since_previous: f64,
}

/// Problems recorded against a whole session; none of them stop the run.
#[derive(thiserror::Error, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionDiagnostic {
    #[error("session has no packets")]
    SessionWithoutPackets,
    #[error("direction of packet {packet} was indeterminate, assumed {assumed:?}")]
    IndeterminateDirection { packet: usize, assumed: Direction },
}

/// One TCP or UDP flow and everything derived from it.
#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    pub transport: TransportKind,
    pub remote_host: Option<String>,
    /// Capture order.
    pub packets: Vec<SessionPacket>,
    pub uplink: Vec<usize>,
    pub downlink: Vec<usize>,
    uplink_seq: BTreeMap<u32, Vec<usize>>,
    downlink_seq: BTreeMap<u32, Vec<usize>>,
    /// ACK numbers carried by uplink packets (acknowledging downlink data).
    uplink_acks: HashSet<u32>,
    /// ACK numbers carried by downlink packets (acknowledging uplink data).
    downlink_acks: HashSet<u32>,
    pub base_uplink_seq: Option<u32>,
    pub base_downlink_seq: Option<u32>,
    pub ssl: bool,
    pub decrypted: bool,
    pub termination: Option<Termination>,
    syn_times: Vec<f64>,
    synack_times: Vec<f64>,
    pub uplink_stream: StreamBuffer,
    pub downlink_stream: StreamBuffer,
    pub exchanges: Vec<Exchange>,
    pub diagnostics: Vec<SessionDiagnostic>,
}

impl Session {
    pub fn new(key: SessionKey, transport: TransportKind) -> Self {
        Self {
            key,
            transport,
            remote_host: None,
            packets: Vec::new(),
            uplink: Vec::new(),
            downlink: Vec::new(),
            uplink_seq: BTreeMap::new(),
            downlink_seq: BTreeMap::new(),
            uplink_acks: HashSet::new(),
            downlink_acks: HashSet::new(),
            base_uplink_seq: None,
            base_downlink_seq: None,
            ssl: false,
            decrypted: false,
            termination: None,
            syn_times: Vec::new(),
            synack_times: Vec::new(),
            uplink_stream: StreamBuffer::default(),
            downlink_stream: StreamBuffer::default(),
            exchanges: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn is_tcp(&self) -> bool {
        self.transport == TransportKind::Tcp
    }

    /// Append a packet, updating every per-direction index. Returns its index.
    pub fn push_packet(&mut self, packet: SessionPacket) -> usize {
        let idx = self.packets.len();
        let direction = packet.direction;

        if packet.record.tls_record.is_some() {
            self.ssl = true;
        }
        if packet.record.decrypted {
            self.decrypted = true;
        }

        if let Some(tcp) = packet.record.tcp_info().copied() {
            let (seq_map, acks, base) = match direction {
                Direction::Downlink => (
                    &mut self.downlink_seq,
                    &mut self.downlink_acks,
                    &mut self.base_downlink_seq,
                ),
                _ => (
                    &mut self.uplink_seq,
                    &mut self.uplink_acks,
                    &mut self.base_uplink_seq,
                ),
            };
            seq_map.entry(tcp.seq).or_default().push(idx);
            if tcp.flags.ack {
                acks.insert(tcp.ack);
            }
            if base.is_none() {
                *base = Some(tcp.seq);
            }

            if tcp.flags.syn {
                match (direction, tcp.flags.ack) {
                    (Direction::Uplink, false) => self.syn_times.push(packet.timestamp()),
                    (Direction::Downlink, true) => self.synack_times.push(packet.timestamp()),
                    _ => {}
                }
            }

            if (tcp.flags.fin || tcp.flags.rst) && self.termination.is_none() {
                let since_previous = self
                    .packets
                    .last()
                    .map(|prev| (packet.timestamp() - prev.timestamp()).max(0.0))
                    .unwrap_or(0.0);
                self.termination = Some(Termination {
                    packet: idx,
                    kind: if tcp.flags.rst {
                        TerminationKind::Rst
                    } else {
                        TerminationKind::Fin
                    },
                    since_previous,
                });
            }
        }

        match direction {
            Direction::Downlink => self.downlink.push(idx),
            _ => self.uplink.push(idx),
        }
        self.packets.push(packet);
        idx
    }

    /// Sequence number -> packets sharing it, for one direction.
    pub fn seq_map(&self, direction: Direction) -> &BTreeMap<u32, Vec<usize>> {
        match direction {
            Direction::Downlink => &self.downlink_seq,
            _ => &self.uplink_seq,
        }
    }

    /// ACK numbers sent by packets travelling in `direction`.
    pub fn acks_from(&self, direction: Direction) -> &HashSet<u32> {
        match direction {
            Direction::Downlink => &self.downlink_acks,
            _ => &self.uplink_acks,
        }
    }

    pub fn packets_in(&self, direction: Direction) -> &[usize] {
        match direction {
            Direction::Downlink => &self.downlink,
            _ => &self.uplink,
        }
    }

    pub fn stream(&self, direction: Direction) -> &StreamBuffer {
        match direction {
            Direction::Downlink => &self.downlink_stream,
            _ => &self.uplink_stream,
        }
    }

    /// Connection setup latency in seconds: first SYN-ACK minus the SYN it
    /// answers. `None` when no SYN-ACK (or no SYN before it) was captured.
    pub fn connection_latency(&self) -> Option<f64> {
        let synack = *self.synack_times.first()?;
        let reference = if self.syn_times.iter().any(|&t| t == synack) {
            synack
        } else {
            self.syn_times.iter().copied().filter(|&t| t < synack).last()?
        };
        Some((synack - reference).max(0.0))
    }

    pub fn first_timestamp(&self) -> Option<f64> {
        self.packets.first().map(SessionPacket::timestamp)
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.packets.last().map(SessionPacket::timestamp)
    }

    pub fn payload_bytes(&self, direction: Direction) -> u64 {
        self.packets_in(direction)
            .iter()
            .map(|&i| self.packets[i].payload_len() as u64)
            .sum()
    }

    /// Decoded payload of one of this session's exchanges.
    pub fn payload(&self, exchange: &Exchange) -> Result<Vec<u8>, ContentError> {
        ContentCodec::default().extract(self.stream(exchange.direction).bytes(), exchange)
    }

    pub fn requests(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter().filter(|e| e.is_request())
    }

    pub fn responses(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter().filter(|e| e.is_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::TcpFlags;
    use rstest::rstest;

    fn syn(t: f64) -> SessionPacket {
        SessionPacket::new(
            PacketRecord::tcp(t, Direction::Uplink, 100, 0, TcpFlags::from_bits(TcpFlags::SYN)),
            Direction::Uplink,
        )
    }

    fn synack(t: f64) -> SessionPacket {
        SessionPacket::new(
            PacketRecord::tcp(
                t,
                Direction::Downlink,
                900,
                101,
                TcpFlags::from_bits(TcpFlags::SYN | TcpFlags::ACK),
            ),
            Direction::Downlink,
        )
    }

    fn session() -> Session {
        let p = PacketRecord::tcp(0.0, Direction::Uplink, 0, 0, TcpFlags::default());
        Session::new(SessionKey::of(&p), TransportKind::Tcp)
    }

    #[rstest]
    #[case(&[1.0], &[1.25], Some(0.25))]
    #[case(&[1.0, 2.0], &[2.5], Some(0.5))]
    #[case(&[1.0, 2.5, 3.0], &[2.5], Some(0.0))]
    #[case(&[1.0], &[], None)]
    #[case(&[3.0], &[2.0], None)]
    fn latency_cases(#[case] syns: &[f64], #[case] synacks: &[f64], #[case] expected: Option<f64>) {
        let mut s = session();
        let mut all: Vec<SessionPacket> = syns.iter().map(|&t| syn(t)).collect();
        all.extend(synacks.iter().map(|&t| synack(t)));
        all.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));
        for p in all {
            s.push_packet(p);
        }
        match (s.connection_latency(), expected) {
            (Some(got), Some(want)) => assert!((got - want).abs() < 1e-9, "{got} != {want}"),
            (got, want) => assert_eq!(got, want),
        }
    }

    #[test]
    fn push_packet_indexes_directions_and_acks() {
        let mut s = session();
        s.push_packet(syn(1.0));
        s.push_packet(synack(1.1));
        assert_eq!(s.uplink, vec![0]);
        assert_eq!(s.downlink, vec![1]);
        assert_eq!(s.base_uplink_seq, Some(100));
        assert_eq!(s.base_downlink_seq, Some(900));
        assert!(s.acks_from(Direction::Downlink).contains(&101));
        assert!(s.acks_from(Direction::Uplink).is_empty());
        assert_eq!(s.seq_map(Direction::Uplink).get(&100), Some(&vec![0]));
    }

    #[test]
    fn termination_records_first_fin_with_delay() {
        let mut s = session();
        s.push_packet(syn(1.0));
        let fin = PacketRecord::tcp(
            4.0,
            Direction::Uplink,
            101,
            901,
            TcpFlags::from_bits(TcpFlags::FIN | TcpFlags::ACK),
        );
        s.push_packet(SessionPacket::new(fin, Direction::Uplink));
        let rst = PacketRecord::tcp(5.0, Direction::Downlink, 901, 0, TcpFlags::from_bits(TcpFlags::RST));
        s.push_packet(SessionPacket::new(rst, Direction::Downlink));

        let t = s.termination.expect("terminated");
        assert_eq!(t.packet, 1);
        assert_eq!(t.kind, TerminationKind::Fin);
        assert!((t.since_previous - 3.0).abs() < 1e-9);
    }
}
