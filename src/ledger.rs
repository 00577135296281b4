//! Track position ledger.
//!
//! Keeps, per track id, the last observed vertical centroid and whether the id
//! has already been counted. Records live for one run and are cleared together.

use std::collections::{HashMap, HashSet};

pub type TrackId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackRecord {
    pub last_y: i32,
    /// Ledger tick at which the id was last observed.
    pub last_seen: u64,
}

/// Per-run mapping of track id to last position and crossing status.
///
/// Crossed ids are kept in their own set so that evicting an idle position record
/// can never make an already-counted id countable again.
#[derive(Debug, Default)]
pub struct TrackLedger {
    positions: HashMap<TrackId, TrackRecord>,
    crossed: HashSet<TrackId>,
    tick: u64,
}

impl TrackLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the ledger clock. Called once per processed frame.
    pub fn tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Record `y` for `id` and return the position recorded before this call.
    ///
    /// A new id returns `y` itself, so a first observation can never look like a crossing.
    pub fn observe(&mut self, id: TrackId, y: i32) -> i32 {
        let tick = self.tick;
        match self.positions.get_mut(&id) {
            Some(record) => {
                let previous = record.last_y;
                record.last_y = y;
                record.last_seen = tick;
                previous
            }
            None => {
                self.positions.insert(
                    id,
                    TrackRecord {
                        last_y: y,
                        last_seen: tick,
                    },
                );
                y
            }
        }
    }

    /// Marks `id` as counted. Returns false if it already was.
    pub fn mark_crossed(&mut self, id: TrackId) -> bool {
        self.crossed.insert(id)
    }

    pub fn has_crossed(&self, id: TrackId) -> bool {
        self.crossed.contains(&id)
    }

    pub fn record(&self, id: TrackId) -> Option<&TrackRecord> {
        self.positions.get(&id)
    }

    /// Drop position records not observed within `max_idle` ticks.
    /// Returns the number of records evicted.
    pub fn evict_idle(&mut self, max_idle: u64) -> usize {
        let tick = self.tick;
        let before = self.positions.len();
        self.positions
            .retain(|_, record| tick.saturating_sub(record.last_seen) <= max_idle);
        before - self.positions.len()
    }

    /// Clears every record, crossed id and the clock.
    pub fn reset(&mut self) {
        self.positions.clear();
        self.crossed.clear();
        self.tick = 0;
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.crossed.is_empty()
    }

    pub fn crossed_len(&self) -> usize {
        self.crossed.len()
    }
}
