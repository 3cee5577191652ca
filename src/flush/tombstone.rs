//! Range-tombstone aggregator (the tombstone half of component A):
//! fragments a set of overlapping range tombstones into non-overlapping
//! stripes, parameterized by the live-snapshot vector so each stripe
//! carries the maximum LSN covering it *per snapshot stripe* rather than
//! one global winner.
//!
//! Unlike `compaction::dedup_records`, which passes range tombstones
//! through untouched because other SSTables outside a compaction's merge
//! set may still hold covered data, a flush's output tombstones must not
//! overlap — the SSTable range-tombstone block itself does no dedup.

use crate::engine::RangeTombstone;

/// Collects overlapping range tombstones and fragments them into
/// non-overlapping, per-snapshot-stripe output on [`finish`](Self::finish).
#[derive(Default)]
pub struct RangeTombstoneAggregator {
    tombstones: Vec<RangeTombstone>,
}

impl RangeTombstoneAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one input range tombstone into the aggregator.
    pub fn add(&mut self, tombstone: RangeTombstone) {
        self.tombstones.push(tombstone);
    }

    /// Consumes the aggregator, producing non-overlapping stripes in
    /// ascending key order.
    ///
    /// `snapshots` partitions the LSN axis into stripes `(-inf, s0],
    /// (s0, s1], ..., (sN, +inf)`: two readers whose snapshots fall in the
    /// same stripe always observe the same winning tombstone, since no
    /// live snapshot sits between them to tell the difference. A key
    /// interval covered by more than one stripe's worth of tombstones
    /// therefore emits one output tombstone *per distinct winning LSN*,
    /// not just the single newest one — otherwise a reader pinned at an
    /// older snapshot could lose a tombstone to a newer, larger one that
    /// later grew to cover the same span.
    pub fn finish(self, snapshots: &[u64]) -> Vec<RangeTombstone> {
        if self.tombstones.is_empty() {
            return Vec::new();
        }

        // Sweep-line: collect every interval boundary, sort + dedup them,
        // then for each resulting slice find every stripe's max-LSN
        // covering tombstone.
        let mut boundaries: Vec<Vec<u8>> = Vec::with_capacity(self.tombstones.len() * 2);
        for t in &self.tombstones {
            boundaries.push(t.start.clone());
            boundaries.push(t.end.clone());
        }
        boundaries.sort();
        boundaries.dedup();

        let mut stripe_bounds: Vec<Option<u64>> = snapshots.iter().copied().map(Some).collect();
        stripe_bounds.sort();
        stripe_bounds.dedup();
        stripe_bounds.push(None);

        let mut raw: Vec<RangeTombstone> = Vec::new();
        for window in boundaries.windows(2) {
            let (start, end) = (&window[0], &window[1]);

            let covering: Vec<&RangeTombstone> = self
                .tombstones
                .iter()
                .filter(|t| &t.start <= start && end <= &t.end)
                .collect();
            if covering.is_empty() {
                continue;
            }

            let mut last_winner_lsn = None;
            for bound in &stripe_bounds {
                let winner = match bound {
                    Some(b) => covering.iter().filter(|t| t.lsn <= *b).max_by_key(|t| t.lsn),
                    None => covering.iter().max_by_key(|t| t.lsn),
                };
                let Some(winner) = winner else { continue };
                if last_winner_lsn == Some(winner.lsn) {
                    continue;
                }
                last_winner_lsn = Some(winner.lsn);

                raw.push(RangeTombstone {
                    start: start.clone(),
                    end: end.clone(),
                    lsn: winner.lsn,
                    timestamp: winner.timestamp,
                });
            }
        }

        // Each distinct winning LSN forms its own independent run of
        // key-adjacent stripes; merge those back together so the output
        // isn't needlessly fragmented.
        raw.sort_by(|a, b| a.lsn.cmp(&b.lsn).then_with(|| a.start.cmp(&b.start)));
        let mut stripes: Vec<RangeTombstone> = Vec::new();
        for t in raw {
            if let Some(last) = stripes.last_mut() {
                if last.lsn == t.lsn && last.end == t.start {
                    last.end = t.end;
                    continue;
                }
            }
            stripes.push(t);
        }

        stripes.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| b.lsn.cmp(&a.lsn)));
        stripes
    }
}
