// SPDX-FileCopyrightText: 2026 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

use crate::exchange::ByteRange;
use serde::Serialize;

/// Sorted, disjoint, coalesced byte ranges of one object.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct RangeSet {
    ranges: Vec<ByteRange>,
}

impl RangeSet {
    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    /// Merge `r` in; overlapping or adjacent ranges coalesce.
    pub fn insert(&mut self, r: ByteRange) {
        if r.is_empty() {
            return;
        }
        let mut merged = r;
        let mut out = Vec::with_capacity(self.ranges.len() + 1);
        let mut placed = false;

        for &cur in &self.ranges {
            if cur.last.saturating_add(1) < merged.first {
                out.push(cur);
            } else if merged.last.saturating_add(1) < cur.first {
                if !placed {
                    out.push(merged);
                    placed = true;
                }
                out.push(cur);
            } else {
                merged = ByteRange::new(merged.first.min(cur.first), merged.last.max(cur.last));
            }
        }
        if !placed {
            out.push(merged);
        }
        self.ranges = out;
    }

    pub fn covers(&self, r: ByteRange) -> bool {
        self.ranges
            .iter()
            .any(|c| c.first <= r.first && r.last <= c.last)
    }

    /// Bytes of `r` not covered by the set.
    pub fn uncovered(&self, r: ByteRange) -> u64 {
        if r.is_empty() {
            return 0;
        }
        let covered: u64 = self
            .ranges
            .iter()
            .filter(|c| c.first <= r.last && r.first <= c.last)
            .map(|c| ByteRange::new(c.first.max(r.first), c.last.min(r.last)).len())
            .fold(0u64, u64::saturating_add);
        r.len().saturating_sub(covered)
    }
}
