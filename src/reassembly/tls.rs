// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Opaque exchanges for TLS sessions the decoder could not decrypt.
//!
//! An exchange is a run of application-data records flowing one way; it
//! ends when application data starts flowing the other way or a non
//! application-data record (handshake, alert) is seen.

use crate::exchange::{Exchange, StartLine};
use crate::packet::{Direction, TlsRecordType};
use crate::session::{Session, TransmissionStreamResolver};
use std::collections::HashSet;

pub(super) fn infer_exchanges(session_id: usize, session: &Session) -> Vec<Exchange> {
    let resolver = TransmissionStreamResolver::new(session);
    let accepted: HashSet<usize> = [Direction::Uplink, Direction::Downlink]
        .into_iter()
        .flat_map(|d| resolver.resolved_stream(d))
        .collect();

    let mut groups: Vec<(Direction, Vec<usize>)> = Vec::new();
    let mut open = false;

    for (i, p) in session.packets.iter().enumerate() {
        if p.payload_len() == 0 || !accepted.contains(&i) {
            continue;
        }
        match p.record.tls_record {
            Some(TlsRecordType::ApplicationData) => match groups.last_mut() {
                Some((dir, members)) if open && *dir == p.direction => members.push(i),
                _ => {
                    groups.push((p.direction, vec![i]));
                    open = true;
                }
            },
            // continuation of a record that started in an earlier packet
            None => {
                if let Some((dir, members)) = groups.last_mut() {
                    if open && *dir == p.direction {
                        members.push(i);
                    }
                }
            }
            Some(_) => open = false,
        }
    }

    groups
        .into_iter()
        .map(|(direction, members)| {
            let mut ex = Exchange::new(session_id, direction, StartLine::Opaque);
            ex.extractable = false;
            ex.first_packet = members.first().copied();
            ex.last_packet = members.last().copied();
            ex.timestamp = members
                .first()
                .map_or(0.0, |&i| session.packets[i].timestamp());
            ex.last_timestamp = members
                .last()
                .map_or(0.0, |&i| session.packets[i].timestamp());
            ex.wire_bytes = members
                .iter()
                .map(|&i| session.packets[i].payload_len() as u64)
                .sum();
            ex
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{PacketRecord, TcpFlags};
    use crate::session::{SessionKey, SessionPacket, TransportKind};

    fn record(t: f64, dir: Direction, seq: u32, len: usize, kind: Option<TlsRecordType>) -> SessionPacket {
        let mut r = PacketRecord::tcp(t, dir, seq, 0, TcpFlags::from_bits(TcpFlags::ACK | TcpFlags::PSH))
            .with_payload(vec![0u8; len]);
        r.tls_record = kind;
        SessionPacket::new(r, dir)
    }

    #[test]
    fn application_data_direction_changes_split_exchanges() {
        let app = Some(TlsRecordType::ApplicationData);
        let mut s = Session::new(
            SessionKey::of(&record(0.0, Direction::Uplink, 0, 0, None).record),
            TransportKind::Tcp,
        );
        for p in [
            record(1.0, Direction::Uplink, 0, 100, Some(TlsRecordType::Handshake)),
            record(1.1, Direction::Downlink, 0, 200, Some(TlsRecordType::Handshake)),
            record(2.0, Direction::Uplink, 100, 50, app),
            record(2.1, Direction::Uplink, 150, 30, None),
            record(2.2, Direction::Downlink, 200, 1000, app),
            record(2.3, Direction::Downlink, 1200, 500, None),
            record(3.0, Direction::Uplink, 180, 40, app),
        ] {
            s.push_packet(p);
        }

        let exchanges = infer_exchanges(7, &s);
        assert_eq!(exchanges.len(), 3);
        assert!(exchanges[0].is_request());
        assert_eq!(exchanges[0].wire_bytes, 80);
        assert!(exchanges[1].is_response());
        assert_eq!(exchanges[1].wire_bytes, 1500);
        assert_eq!(exchanges[1].first_packet, Some(4));
        assert_eq!(exchanges[1].last_packet, Some(5));
        assert_eq!(exchanges[2].wire_bytes, 40);
        assert!(exchanges.iter().all(|e| !e.extractable && e.session == 7));
    }
}
