// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Grouping of raw packets into TCP and UDP sessions.

use super::{Session, SessionDiagnostic, SessionKey, SessionPacket, TransportKind};
use crate::packet::{Direction, PacketRecord, PacketSource, Transport};
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::{debug, warn};

pub trait SessionAssembler {
    /// Consume `source` and return sessions ordered by their first packet.
    fn assemble(&self, source: &mut dyn PacketSource) -> Vec<Session>;
}

/// Splits TCP flows on handshake reuse; keeps one session per UDP flow.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlowAssembler;

impl SessionAssembler for FlowAssembler {
    fn assemble(&self, source: &mut dyn PacketSource) -> Vec<Session> {
        let mut sessions: Vec<Session> = Vec::new();
        let mut tcp_index: HashMap<SessionKey, usize> = HashMap::new();
        let mut udp_index: HashMap<SessionKey, usize> = HashMap::new();
        let mut hostnames: HashMap<IpAddr, String> = HashMap::new();
        let mut seen = 0usize;

        while let Some(record) = source.next_packet() {
            seen += 1;
            let key = SessionKey::of(&record);
            let (direction, guessed) = resolve_direction(&record);
            if guessed {
                warn!(
                    packet = seen,
                    timestamp = record.timestamp,
                    assumed = ?direction,
                    "packet direction indeterminate"
                );
            }

            if let Some(answer) = record.dns.as_ref() {
                for addr in &answer.addresses {
                    hostnames.insert(*addr, answer.domain.clone());
                }
            }

            let session_idx = match record.transport {
                Transport::Tcp(tcp) => {
                    let handshake = direction == Direction::Uplink && tcp.flags.syn && !tcp.flags.ack;
                    let existing = tcp_index
                        .get(&key)
                        .map(|&i| (i, sessions[i].base_uplink_seq));
                    match existing {
                        Some((i, Some(base))) if !handshake || base == tcp.seq => i,
                        Some((i, None)) if !handshake => i,
                        Some(_) => {
                            debug!(?key, seq = tcp.seq, "new handshake on existing tuple, splitting session");
                            open_session(&mut sessions, &mut tcp_index, key, TransportKind::Tcp)
                        }
                        None => open_session(&mut sessions, &mut tcp_index, key, TransportKind::Tcp),
                    }
                }
                Transport::Udp => match udp_index.get(&key).copied() {
                    Some(i) => i,
                    None => open_session(&mut sessions, &mut udp_index, key, TransportKind::Udp),
                },
            };

            let session = &mut sessions[session_idx];
            let mut packet = SessionPacket::new(record, direction);
            if let Some(tcp) = packet.record.tcp_info() {
                packet.handshake_retransmit = direction == Direction::Uplink
                    && tcp.flags.syn
                    && !tcp.flags.ack
                    && session.base_uplink_seq == Some(tcp.seq)
                    && !session.packets.is_empty();
            }
            let idx = session.push_packet(packet);
            if guessed {
                session
                    .diagnostics
                    .push(SessionDiagnostic::IndeterminateDirection {
                        packet: idx,
                        assumed: direction,
                    });
            }
        }

        for session in &mut sessions {
            if session.remote_host.is_none() {
                session.remote_host = hostnames.get(&session.key.remote_addr).cloned();
            }
        }

        debug!(packets = seen, sessions = sessions.len(), "assembled sessions");
        sessions
    }
}

fn open_session(
    sessions: &mut Vec<Session>,
    index: &mut HashMap<SessionKey, usize>,
    key: SessionKey,
    transport: TransportKind,
) -> usize {
    sessions.push(Session::new(key, transport));
    let idx = sessions.len() - 1;
    index.insert(key, idx);
    idx
}

/// The decoder's direction, or a best guess plus `true` when it had none.
fn resolve_direction(record: &PacketRecord) -> (Direction, bool) {
    if record.direction != Direction::Unknown {
        return (record.direction, false);
    }

    if let Some(tcp) = record.tcp_info() {
        if tcp.flags.syn {
            let d = if tcp.flags.ack {
                Direction::Downlink
            } else {
                Direction::Uplink
            };
            return (d, true);
        }
    }
    if record.dns.is_some() || record.payload.starts_with(b"HTTP/") {
        return (Direction::Downlink, true);
    }
    (Direction::Uplink, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{DnsAnswer, TcpFlags};

    fn flags(bits: u8) -> TcpFlags {
        TcpFlags::from_bits(bits)
    }

    #[test]
    fn single_handshake_makes_one_session() {
        let packets = vec![
            PacketRecord::tcp(1.0, Direction::Uplink, 100, 0, flags(TcpFlags::SYN)),
            PacketRecord::tcp(1.1, Direction::Downlink, 900, 101, flags(TcpFlags::SYN | TcpFlags::ACK)),
            PacketRecord::tcp(1.2, Direction::Uplink, 101, 901, flags(TcpFlags::ACK)),
        ];
        let sessions = FlowAssembler.assemble(&mut packets.into_iter());
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].packets.len(), 3);
        assert_eq!(sessions[0].base_uplink_seq, Some(100));
    }

    #[test]
    fn repeated_syn_with_same_seq_is_a_retransmission() {
        let packets = vec![
            PacketRecord::tcp(1.0, Direction::Uplink, 100, 0, flags(TcpFlags::SYN)),
            PacketRecord::tcp(2.0, Direction::Uplink, 100, 0, flags(TcpFlags::SYN)),
        ];
        let sessions = FlowAssembler.assemble(&mut packets.into_iter());
        assert_eq!(sessions.len(), 1);
        assert!(!sessions[0].packets[0].handshake_retransmit);
        assert!(sessions[0].packets[1].handshake_retransmit);
    }

    #[test]
    fn new_syn_on_same_tuple_splits_session() {
        let packets = vec![
            PacketRecord::tcp(1.0, Direction::Uplink, 100, 0, flags(TcpFlags::SYN)),
            PacketRecord::tcp(1.1, Direction::Downlink, 900, 101, flags(TcpFlags::SYN | TcpFlags::ACK)),
            PacketRecord::tcp(5.0, Direction::Uplink, 7000, 0, flags(TcpFlags::SYN)),
            PacketRecord::tcp(5.1, Direction::Downlink, 300, 7001, flags(TcpFlags::SYN | TcpFlags::ACK)),
        ];
        let sessions = FlowAssembler.assemble(&mut packets.into_iter());
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].key, sessions[1].key);
        assert_eq!(sessions[0].base_uplink_seq, Some(100));
        assert_eq!(sessions[1].base_uplink_seq, Some(7000));
        assert_eq!(sessions[0].packets.len(), 2);
        assert_eq!(sessions[1].packets.len(), 2);
    }

    #[test]
    fn sessions_follow_first_packet_order() {
        let a = PacketRecord::tcp(1.0, Direction::Uplink, 1, 0, flags(TcpFlags::SYN));
        let b = PacketRecord::tcp(2.0, Direction::Uplink, 1, 0, flags(TcpFlags::SYN)).with_endpoints(
            "10.0.0.2".parse().unwrap(),
            40001,
            "1.1.1.1".parse().unwrap(),
            443,
        );
        let a2 = PacketRecord::tcp(3.0, Direction::Uplink, 2, 0, flags(TcpFlags::ACK));
        let sessions = FlowAssembler.assemble(&mut vec![a, b, a2].into_iter());
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].key.local_port, 40000);
        assert_eq!(sessions[0].packets.len(), 2);
        assert_eq!(sessions[1].key.local_port, 40001);
    }

    #[test]
    fn udp_flow_is_never_split_and_dns_backfills_hosts() {
        let server: IpAddr = "93.184.216.34".parse().unwrap();
        let query = PacketRecord::udp(1.0, Direction::Uplink);
        let answer = PacketRecord::udp(1.1, Direction::Downlink).with_dns(DnsAnswer {
            domain: "example.com".into(),
            addresses: vec![server],
        });
        let query2 = PacketRecord::udp(9.0, Direction::Uplink);
        let http = PacketRecord::tcp(2.0, Direction::Uplink, 1, 0, flags(TcpFlags::SYN));

        let sessions = FlowAssembler.assemble(&mut vec![query, answer, http, query2].into_iter());
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].transport, TransportKind::Udp);
        assert_eq!(sessions[0].packets.len(), 3);
        assert_eq!(sessions[1].remote_host.as_deref(), Some("example.com"));
    }

    #[test]
    fn unknown_direction_is_guessed_and_recorded() {
        let p = PacketRecord::tcp(1.0, Direction::Unknown, 5, 0, flags(TcpFlags::SYN | TcpFlags::ACK));
        let sessions = FlowAssembler.assemble(&mut vec![p].into_iter());
        assert_eq!(sessions[0].packets[0].direction, Direction::Downlink);
        assert_eq!(
            sessions[0].diagnostics,
            vec![SessionDiagnostic::IndeterminateDirection {
                packet: 0,
                assumed: Direction::Downlink
            }]
        );
    }
}
