// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Shared test utilities to reduce duplication across test modules.

use crate::packet::{Direction, PacketRecord, TcpFlags};
use crate::session::{FlowAssembler, Session, SessionAssembler};

/// Scripted TCP conversation: handshake, then alternating data segments
/// each acknowledged by the peer. Every packet advances the clock by 10ms.
pub struct Conversation {
    packets: Vec<PacketRecord>,
    t: f64,
    client_seq: u32,
    server_seq: u32,
}

impl Conversation {
    pub fn new() -> Self {
        Self::starting_at(1.0, 1000, 5000)
    }

    pub fn starting_at(t: f64, client_isn: u32, server_isn: u32) -> Self {
        let mut c = Self {
            packets: Vec::new(),
            t,
            client_seq: client_isn,
            server_seq: server_isn,
        };
        c.push(Direction::Uplink, client_isn, 0, TcpFlags::SYN, &[]);
        c.push(
            Direction::Downlink,
            server_isn,
            client_isn.wrapping_add(1),
            TcpFlags::SYN | TcpFlags::ACK,
            &[],
        );
        c.client_seq = client_isn.wrapping_add(1);
        c.server_seq = server_isn.wrapping_add(1);
        c.push(Direction::Uplink, c.client_seq, c.server_seq, TcpFlags::ACK, &[]);
        c
    }

    fn push(&mut self, dir: Direction, seq: u32, ack: u32, bits: u8, payload: &[u8]) {
        self.packets.push(
            PacketRecord::tcp(self.t, dir, seq, ack, TcpFlags::from_bits(bits))
                .with_payload(payload.to_vec()),
        );
        self.t += 0.01;
    }

    pub fn request(mut self, payload: &[u8]) -> Self {
        let (seq, ack) = (self.client_seq, self.server_seq);
        self.push(Direction::Uplink, seq, ack, TcpFlags::ACK | TcpFlags::PSH, payload);
        self.client_seq = seq.wrapping_add(payload.len() as u32);
        self.push(Direction::Downlink, ack, self.client_seq, TcpFlags::ACK, &[]);
        self
    }

    pub fn response(mut self, payload: &[u8]) -> Self {
        let (seq, ack) = (self.server_seq, self.client_seq);
        self.push(Direction::Downlink, seq, ack, TcpFlags::ACK | TcpFlags::PSH, payload);
        self.server_seq = seq.wrapping_add(payload.len() as u32);
        self.push(Direction::Uplink, ack, self.server_seq, TcpFlags::ACK, &[]);
        self
    }

    pub fn packets(self) -> Vec<PacketRecord> {
        self.packets
    }

    pub fn build(self) -> Session {
        FlowAssembler
            .assemble(&mut self.packets.into_iter())
            .into_iter()
            .next()
            .expect("conversation yields one session")
    }
}
