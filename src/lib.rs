// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Offline HTTP traffic analysis over captured packets.
//!
//! Packets are grouped into sessions, tagged with TCP states, reassembled
//! into HTTP exchanges (or TLS-inferred opaque exchanges), and finally
//! checked against HTTP caching semantics to find redundant transfers.

pub mod analysis;
pub mod cache;
pub mod chunked;
pub mod config;
pub mod content;
pub mod exchange;
pub mod helpers;
pub mod http_date;
pub mod packet;
pub mod reassembly;
pub mod serde_helpers;
pub mod session;
pub mod stream;
pub mod trace;

#[cfg(test)]
mod test_helpers;
