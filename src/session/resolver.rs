// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Choice between packets that share a sequence number.
//!
//! A retransmitted segment shows up in the capture more than once. The copy
//! that belongs to the accepted stream is the one whose continuation (its
//! sequence number plus payload length) the peer acknowledged, either
//! directly or through the packets that follow it.

use super::Session;
use crate::packet::Direction;
use std::collections::HashSet;

pub struct TransmissionStreamResolver<'a> {
    session: &'a Session,
}

impl<'a> TransmissionStreamResolver<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Pick the accepted payload-bearing packet among those at `seq`.
    ///
    /// Zero-length packets (pure ACKs) are never candidates. When no
    /// candidate's continuation is ever acknowledged the last captured one
    /// wins.
    pub fn resolve(&self, direction: Direction, seq: u32) -> Option<usize> {
        let group = self.session.seq_map(direction).get(&seq)?;
        let candidates: Vec<usize> = group
            .iter()
            .copied()
            .filter(|&i| self.session.packets[i].payload_len() > 0)
            .collect();

        match candidates.as_slice() {
            [] => None,
            [only] => Some(*only),
            _ => candidates
                .iter()
                .copied()
                .find(|&i| {
                    let len = self.session.packets[i].payload_len() as u32;
                    self.continuation_confirmed(direction, seq.wrapping_add(len))
                })
                .or_else(|| candidates.last().copied()),
        }
    }

    /// Accepted packets of one direction in ascending sequence order.
    pub fn resolved_stream(&self, direction: Direction) -> Vec<usize> {
        self.session
            .seq_map(direction)
            .keys()
            .filter_map(|&seq| self.resolve(direction, seq))
            .collect()
    }

    /// Whether `start`, or the continuation of any chain of packets
    /// beginning at `start`, was acknowledged by the opposite direction.
    fn continuation_confirmed(&self, direction: Direction, start: u32) -> bool {
        let acks = self.session.acks_from(direction.opposite());
        let seq_map = self.session.seq_map(direction);
        let mut work = vec![start];
        let mut visited: HashSet<u32> = HashSet::new();

        while let Some(next) = work.pop() {
            if acks.contains(&next) {
                return true;
            }
            if !visited.insert(next) {
                continue;
            }
            if let Some(group) = seq_map.get(&next) {
                for &i in group {
                    let len = self.session.packets[i].payload_len() as u32;
                    if len > 0 {
                        work.push(next.wrapping_add(len));
                    }
                }
            }
        }
        false
    }
}
