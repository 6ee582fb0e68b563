// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Helper utilities shared by reassembly and cache analysis.
//!
//! This module groups reusable helpers for parsing HTTP header structures.

pub mod cache_control;
pub mod content_range;
pub mod headers;
pub mod token;
