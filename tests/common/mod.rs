// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};

use trace_http::analysis::{analyze, Analysis};
use trace_http::config::Config;
use trace_http::packet::{Direction, PacketRecord, TcpFlags};

pub const T0: i64 = 1_700_000_000;

pub fn http_date(offset_secs: i64) -> String {
    httpdate::fmt_http_date(
        std::time::UNIX_EPOCH + std::time::Duration::from_secs((T0 + offset_secs) as u64),
    )
}

/// One client connection, scripted packet by packet. Each connection gets
/// its own local port so flows never collide.
pub struct Flow {
    packets: Vec<PacketRecord>,
    t: f64,
    local_port: u16,
    client_seq: u32,
    server_seq: u32,
}

impl Flow {
    /// Handshake at `T0 + offset_secs`.
    pub fn open(offset_secs: i64, local_port: u16) -> Self {
        let mut f = Self {
            packets: Vec::new(),
            t: (T0 + offset_secs) as f64,
            local_port,
            client_seq: 7_000,
            server_seq: 90_000,
        };
        let (c, s) = (f.client_seq, f.server_seq);
        f.push(Direction::Uplink, c, 0, TcpFlags::SYN, &[]);
        f.push(Direction::Downlink, s, c + 1, TcpFlags::SYN | TcpFlags::ACK, &[]);
        f.client_seq += 1;
        f.server_seq += 1;
        let (c, s) = (f.client_seq, f.server_seq);
        f.push(Direction::Uplink, c, s, TcpFlags::ACK, &[]);
        f
    }

    fn push(&mut self, dir: Direction, seq: u32, ack: u32, bits: u8, payload: &[u8]) {
        self.packets.push(
            PacketRecord::tcp(self.t, dir, seq, ack, TcpFlags::from_bits(bits))
                .with_endpoints(
                    IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
                    self.local_port,
                    IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)),
                    80,
                )
                .with_payload(payload.to_vec()),
        );
        self.t += 0.01;
    }

    pub fn request(mut self, payload: &[u8]) -> Self {
        let (seq, ack) = (self.client_seq, self.server_seq);
        self.push(Direction::Uplink, seq, ack, TcpFlags::ACK | TcpFlags::PSH, payload);
        self.client_seq += payload.len() as u32;
        let c = self.client_seq;
        self.push(Direction::Downlink, ack, c, TcpFlags::ACK, &[]);
        self
    }

    pub fn response(mut self, payload: &[u8]) -> Self {
        let (seq, ack) = (self.server_seq, self.client_seq);
        self.push(Direction::Downlink, seq, ack, TcpFlags::ACK | TcpFlags::PSH, payload);
        self.server_seq += payload.len() as u32;
        let s = self.server_seq;
        self.push(Direction::Uplink, ack, s, TcpFlags::ACK, &[]);
        self
    }

    /// Server payload split across several segments.
    pub fn response_segments(mut self, segments: &[&[u8]]) -> Self {
        for seg in segments {
            let (seq, ack) = (self.server_seq, self.client_seq);
            self.push(Direction::Downlink, seq, ack, TcpFlags::ACK, seg);
            self.server_seq += seg.len() as u32;
        }
        let (c, s) = (self.client_seq, self.server_seq);
        self.push(Direction::Uplink, c, s, TcpFlags::ACK, &[]);
        self
    }

    /// Re-send the last server data segment unchanged.
    pub fn retransmit_last_response(mut self) -> Self {
        if let Some(p) = self
            .packets
            .iter()
            .rev()
            .find(|p| p.direction == Direction::Downlink && p.payload_len() > 0)
            .cloned()
        {
            let mut dup = p;
            dup.timestamp = self.t;
            self.packets.push(dup);
            self.t += 0.01;
        }
        self
    }

    pub fn close(mut self) -> Self {
        let (c, s) = (self.client_seq, self.server_seq);
        self.push(Direction::Uplink, c, s, TcpFlags::FIN | TcpFlags::ACK, &[]);
        self.push(Direction::Downlink, s, c + 1, TcpFlags::FIN | TcpFlags::ACK, &[]);
        self
    }

    pub fn packets(self) -> Vec<PacketRecord> {
        self.packets
    }
}

/// Interleave the flows in capture order.
pub fn trace(flows: Vec<Flow>) -> Vec<PacketRecord> {
    let mut packets: Vec<PacketRecord> = flows.into_iter().flat_map(Flow::packets).collect();
    packets.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    packets
}

pub fn run(flows: Vec<Flow>) -> Analysis {
    analyze(&mut trace(flows).into_iter(), &Config::default())
}
