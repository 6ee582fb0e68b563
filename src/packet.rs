// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Typed packet records produced by an external capture decoder.
//!
//! The core never decodes link or network layers itself; it consumes
//! `PacketRecord` values through the `PacketSource` pull interface.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Which way a packet travelled relative to the device under test.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Uplink,
    Downlink,
    #[default]
    Unknown,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Uplink => Direction::Downlink,
            Direction::Downlink => Direction::Uplink,
            Direction::Unknown => Direction::Unknown,
        }
    }
}

/// TCP control bits as decoded from the segment header.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(default)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
    pub urg: bool,
}

impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;

    pub fn from_bits(bits: u8) -> Self {
        Self {
            syn: bits & Self::SYN != 0,
            ack: bits & Self::ACK != 0,
            fin: bits & Self::FIN != 0,
            rst: bits & Self::RST != 0,
            psh: bits & Self::PSH != 0,
            urg: bits & Self::URG != 0,
        }
    }

    pub fn bits(&self) -> u8 {
        let mut b = 0;
        if self.fin {
            b |= Self::FIN;
        }
        if self.syn {
            b |= Self::SYN;
        }
        if self.rst {
            b |= Self::RST;
        }
        if self.psh {
            b |= Self::PSH;
        }
        if self.ack {
            b |= Self::ACK;
        }
        if self.urg {
            b |= Self::URG;
        }
        b
    }

    /// SYN, FIN or RST set.
    pub fn is_control(&self) -> bool {
        self.syn || self.fin || self.rst
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpInfo {
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub window: u16,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Transport {
    Tcp(TcpInfo),
    Udp,
}

/// TLS record content type, taken from the first byte of a TLS record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TlsRecordType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    Heartbeat,
}

impl TlsRecordType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            20 => Some(Self::ChangeCipherSpec),
            21 => Some(Self::Alert),
            22 => Some(Self::Handshake),
            23 => Some(Self::ApplicationData),
            24 => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

/// Answer section of a DNS response, flattened to name -> addresses.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DnsAnswer {
    pub domain: String,
    pub addresses: Vec<IpAddr>,
}

/// One captured packet, immutable once produced by the decoder.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PacketRecord {
    /// Capture time in seconds since the Unix epoch.
    pub timestamp: f64,
    #[serde(default)]
    pub direction: Direction,
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
    pub transport: Transport,
    #[serde(
        default,
        serialize_with = "crate::serde_helpers::serialize_payload",
        deserialize_with = "crate::serde_helpers::deserialize_payload"
    )]
    pub payload: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_record: Option<TlsRecordType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsAnswer>,
    /// The decoder supplied plaintext for a TLS flow.
    #[serde(default)]
    pub decrypted: bool,
}

impl PacketRecord {
    /// Build a TCP record between the default test endpoints; chain the
    /// `with_*` helpers to fill in the rest.
    pub fn tcp(timestamp: f64, direction: Direction, seq: u32, ack: u32, flags: TcpFlags) -> Self {
        Self {
            timestamp,
            direction,
            local_addr: IpAddr::from([10, 0, 0, 2]),
            local_port: 40000,
            remote_addr: IpAddr::from([93, 184, 216, 34]),
            remote_port: 80,
            transport: Transport::Tcp(TcpInfo {
                seq,
                ack,
                flags,
                window: 65535,
            }),
            payload: Bytes::new(),
            tls_record: None,
            dns: None,
            decrypted: false,
        }
    }

    pub fn udp(timestamp: f64, direction: Direction) -> Self {
        Self {
            timestamp,
            direction,
            local_addr: IpAddr::from([10, 0, 0, 2]),
            local_port: 40000,
            remote_addr: IpAddr::from([8, 8, 8, 8]),
            remote_port: 53,
            transport: Transport::Udp,
            payload: Bytes::new(),
            tls_record: None,
            dns: None,
            decrypted: false,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_endpoints(
        mut self,
        local_addr: IpAddr,
        local_port: u16,
        remote_addr: IpAddr,
        remote_port: u16,
    ) -> Self {
        self.local_addr = local_addr;
        self.local_port = local_port;
        self.remote_addr = remote_addr;
        self.remote_port = remote_port;
        self
    }

    pub fn with_window(mut self, window: u16) -> Self {
        if let Transport::Tcp(ref mut t) = self.transport {
            t.window = window;
        }
        self
    }

    pub fn with_tls_record(mut self, record: TlsRecordType) -> Self {
        self.tls_record = Some(record);
        self
    }

    pub fn with_dns(mut self, answer: DnsAnswer) -> Self {
        self.dns = Some(answer);
        self
    }

    pub fn tcp_info(&self) -> Option<&TcpInfo> {
        match &self.transport {
            Transport::Tcp(t) => Some(t),
            Transport::Udp => None,
        }
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self.transport, Transport::Tcp(_))
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Pull interface over a finite, capture-ordered packet stream.
pub trait PacketSource {
    fn next_packet(&mut self) -> Option<PacketRecord>;
}

impl<I> PacketSource for I
where
    I: Iterator<Item = PacketRecord>,
{
    fn next_packet(&mut self) -> Option<PacketRecord> {
        self.next()
    }
}
