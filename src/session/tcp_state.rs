// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Descriptive TCP state tags for diagnostics.
//!
//! Tags never influence ordering or payload handling.

use super::Session;
use crate::packet::{Direction, TcpFlags};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TcpState {
    Establish,
    Close,
    Reset,
    Data,
    DataDup,
    DataRecover,
    Ack,
    AckDup,
    AckRecover,
    WindowUpdate,
    KeepAlive,
    ZeroWindow,
}

/// Control bits of a segment other than ACK, used to tell apart ACKs that
/// share an acknowledgement number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlagKind(u8);

impl FlagKind {
    pub fn of(flags: &TcpFlags) -> Self {
        FlagKind(flags.bits() & !TcpFlags::ACK)
    }
}

type AckKey = (u32, FlagKind);

fn slot(direction: Direction) -> usize {
    match direction {
        Direction::Downlink => 1,
        _ => 0,
    }
}

pub struct TcpStateAnnotator;

impl TcpStateAnnotator {
    /// Tag every TCP packet of `session` in place. UDP sessions are untouched.
    pub fn annotate(session: &mut Session) {
        if !session.is_tcp() {
            return;
        }
        let mut states = Self::base_states(session);
        Self::classify_acks(session, &mut states);
        Self::detect_zero_window(session, &mut states);
        Self::correlate_recovery(session, &mut states);

        for (packet, state) in session.packets.iter_mut().zip(states) {
            packet.tcp_state = state;
        }
    }

    /// Handshake, teardown and data tags. A data packet is a duplicate when an
    /// earlier payload-bearing packet of the same direction shares its
    /// sequence number.
    fn base_states(session: &Session) -> Vec<Option<TcpState>> {
        let mut seen_data: [HashSet<u32>; 2] = [HashSet::new(), HashSet::new()];
        session
            .packets
            .iter()
            .map(|p| {
                let tcp = p.record.tcp_info()?;
                let state = if tcp.flags.rst {
                    TcpState::Reset
                } else if tcp.flags.syn {
                    TcpState::Establish
                } else if tcp.flags.fin {
                    TcpState::Close
                } else if p.payload_len() > 0 {
                    if seen_data[slot(p.direction)].insert(tcp.seq) {
                        TcpState::Data
                    } else {
                        TcpState::DataDup
                    }
                } else {
                    return None;
                };
                Some(state)
            })
            .collect()
    }

    fn classify_acks(session: &Session, states: &mut [Option<TcpState>]) {
        let mut windows: [HashMap<AckKey, u16>; 2] = [HashMap::new(), HashMap::new()];
        // seq a keep-alive probe from the other side would carry (ack - 1)
        let mut alive: [HashSet<u32>; 2] = [HashSet::new(), HashSet::new()];

        for (i, p) in session.packets.iter().enumerate() {
            let Some(tcp) = p.record.tcp_info() else {
                continue;
            };
            if p.payload_len() > 0 || tcp.flags.is_control() {
                continue;
            }
            let d = slot(p.direction);
            let key = (tcp.ack, FlagKind::of(&tcp.flags));

            let mut state = match windows[d].insert(key, tcp.window) {
                None => TcpState::Ack,
                Some(w) if w == tcp.window => TcpState::AckDup,
                Some(_) => TcpState::WindowUpdate,
            };
            if alive[1 - d].contains(&tcp.seq) {
                state = TcpState::KeepAlive;
            }
            alive[d].insert(tcp.ack.wrapping_sub(1));
            states[i] = Some(state);
        }
    }

    fn detect_zero_window(session: &Session, states: &mut [Option<TcpState>]) {
        for (i, p) in session.packets.iter().enumerate() {
            if let Some(tcp) = p.record.tcp_info() {
                if p.payload_len() == 0 && !tcp.flags.is_control() && tcp.window == 0 {
                    states[i] = Some(TcpState::ZeroWindow);
                }
            }
        }
    }

    /// Data answering a duplicate ACK, or an ACK covering retransmitted data,
    /// marks the end of a loss episode. Each recorded duplicate is consumed
    /// once.
    fn correlate_recovery(session: &Session, states: &mut [Option<TcpState>]) {
        let mut dup_data_ends: [HashSet<u32>; 2] = [HashSet::new(), HashSet::new()];
        let mut dup_acks: [HashSet<u32>; 2] = [HashSet::new(), HashSet::new()];

        for (i, p) in session.packets.iter().enumerate() {
            let Some(tcp) = p.record.tcp_info() else {
                continue;
            };
            let d = slot(p.direction);
            match states[i] {
                Some(TcpState::DataDup) => {
                    dup_data_ends[d].insert(tcp.seq.wrapping_add(p.payload_len() as u32));
                }
                Some(TcpState::AckDup) => {
                    dup_acks[d].insert(tcp.ack);
                }
                Some(TcpState::Data) if dup_acks[1 - d].remove(&tcp.seq) => {
                    states[i] = Some(TcpState::DataRecover);
                }
                Some(TcpState::Ack) if dup_data_ends[1 - d].remove(&tcp.ack) => {
                    states[i] = Some(TcpState::AckRecover);
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketRecord;
    use crate::session::{SessionKey, SessionPacket, TransportKind};

    const UP: Direction = Direction::Uplink;
    const DOWN: Direction = Direction::Downlink;

    fn pkt(dir: Direction, seq: u32, ack: u32, bits: u8, payload: &'static [u8], window: u16) -> SessionPacket {
        SessionPacket::new(
            PacketRecord::tcp(0.0, dir, seq, ack, TcpFlags::from_bits(bits))
                .with_payload(payload)
                .with_window(window),
            dir,
        )
    }

    fn annotate(packets: Vec<SessionPacket>) -> Vec<Option<TcpState>> {
        let mut s = Session::new(SessionKey::of(&packets[0].record), TransportKind::Tcp);
        for p in packets {
            s.push_packet(p);
        }
        TcpStateAnnotator::annotate(&mut s);
        s.packets.iter().map(|p| p.tcp_state).collect()
    }

    const A: u8 = TcpFlags::ACK;
    const PA: u8 = TcpFlags::ACK | TcpFlags::PSH;

    #[test]
    fn handshake_data_and_teardown() {
        let states = annotate(vec![
            pkt(UP, 100, 0, TcpFlags::SYN, b"", 1000),
            pkt(DOWN, 900, 101, TcpFlags::SYN | A, b"", 1000),
            pkt(UP, 101, 901, PA, b"GET", 1000),
            pkt(UP, 104, 901, TcpFlags::FIN | A, b"", 1000),
            pkt(DOWN, 901, 105, TcpFlags::RST, b"", 0),
        ]);
        assert_eq!(
            states,
            vec![
                Some(TcpState::Establish),
                Some(TcpState::Establish),
                Some(TcpState::Data),
                Some(TcpState::Close),
                Some(TcpState::Reset),
            ]
        );
    }

    #[test]
    fn ack_dup_and_window_update() {
        let states = annotate(vec![
            pkt(DOWN, 900, 200, A, b"", 1000),
            pkt(DOWN, 900, 200, A, b"", 1000),
            pkt(DOWN, 900, 200, A, b"", 2000),
        ]);
        assert_eq!(
            states,
            vec![
                Some(TcpState::Ack),
                Some(TcpState::AckDup),
                Some(TcpState::WindowUpdate)
            ]
        );
    }

    #[test]
    fn different_flag_kind_is_a_new_ack_key() {
        let states = annotate(vec![
            pkt(DOWN, 900, 200, A, b"", 1000),
            pkt(DOWN, 900, 200, A | TcpFlags::URG, b"", 1000),
        ]);
        assert_eq!(states, vec![Some(TcpState::Ack), Some(TcpState::Ack)]);
    }

    #[test]
    fn keep_alive_probe_overrides_ack_tags() {
        // downlink acks up to 500, uplink then probes with seq 499
        let states = annotate(vec![
            pkt(DOWN, 900, 500, A, b"", 1000),
            pkt(UP, 499, 900, A, b"", 1000),
            pkt(UP, 499, 900, A, b"", 1000),
        ]);
        assert_eq!(
            states,
            vec![
                Some(TcpState::Ack),
                Some(TcpState::KeepAlive),
                Some(TcpState::KeepAlive)
            ]
        );
    }

    #[test]
    fn zero_window_is_tagged() {
        let states = annotate(vec![pkt(DOWN, 900, 200, A, b"", 0)]);
        assert_eq!(states, vec![Some(TcpState::ZeroWindow)]);
    }

    #[test]
    fn duplicate_data_and_ack_recovery() {
        let states = annotate(vec![
            pkt(UP, 100, 900, PA, b"abcd", 1000),
            pkt(UP, 100, 900, PA, b"abcd", 1000),
            pkt(DOWN, 900, 104, A, b"", 1000),
        ]);
        assert_eq!(
            states,
            vec![
                Some(TcpState::Data),
                Some(TcpState::DataDup),
                Some(TcpState::AckRecover)
            ]
        );
    }

    #[test]
    fn data_answering_dup_acks_is_recovery_once() {
        let states = annotate(vec![
            pkt(DOWN, 900, 100, A, b"", 1000),
            pkt(DOWN, 900, 100, A, b"", 1000),
            pkt(UP, 100, 900, PA, b"abcd", 1000),
            pkt(UP, 104, 900, PA, b"efgh", 1000),
        ]);
        assert_eq!(
            states,
            vec![
                Some(TcpState::Ack),
                Some(TcpState::AckDup),
                Some(TcpState::DataRecover),
                Some(TcpState::Data)
            ]
        );
    }

    #[test]
    fn udp_sessions_are_left_alone() {
        let p = PacketRecord::udp(0.0, UP);
        let mut s = Session::new(SessionKey::of(&p), TransportKind::Udp);
        s.push_packet(SessionPacket::new(p, UP));
        TcpStateAnnotator::annotate(&mut s);
        assert_eq!(s.packets[0].tcp_state, None);
    }
}
