//! Frame-skip buffer.
//!
//! Holds the output of the last processed frame. Skipped frames read it verbatim
//! so the presentation layer never flickers to an empty state between updates.

use crate::OutputRecord;

#[derive(Clone, Debug)]
pub struct TemporalCache {
    last: OutputRecord,
    processed_frame: Option<u64>,
}

impl TemporalCache {
    /// Empty cache: no detections and a `min_green` recommendation.
    pub fn new(min_green: u32) -> Self {
        Self {
            last: OutputRecord::empty(min_green),
            processed_frame: None,
        }
    }

    /// Overwrite the cache with the output of processed frame `frame_index`.
    pub fn store(&mut self, frame_index: u64, record: OutputRecord) {
        self.last = record;
        self.processed_frame = Some(frame_index);
    }

    pub fn current(&self) -> &OutputRecord {
        &self.last
    }

    /// Frame index that produced the cached output, if any frame was processed yet.
    pub fn processed_frame(&self) -> Option<u64> {
        self.processed_frame
    }

    /// Frames elapsed since the cached output was computed.
    pub fn staleness(&self, frame_index: u64) -> Option<u64> {
        self.processed_frame
            .map(|processed| frame_index.saturating_sub(processed))
    }

    pub fn reset(&mut self, min_green: u32) {
        self.last = OutputRecord::empty(min_green);
        self.processed_frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DensityTier;

    #[test]
    fn initial_state_is_empty_min_green() {
        let cache = TemporalCache::new(10);
        assert_eq!(cache.current().instantaneous_count, 0);
        assert!(cache.current().detections.is_empty());
        assert_eq!(cache.current().recommended_green_seconds, 10);
        assert_eq!(cache.current().density_tier, DensityTier::Low);
        assert_eq!(cache.processed_frame(), None);
    }

    #[test]
    fn store_and_reset() {
        let mut cache = TemporalCache::new(10);
        let record = OutputRecord {
            cumulative_count: 4,
            instantaneous_count: 6,
            density_tier: DensityTier::Medium,
            is_emergency: false,
            recommended_green_seconds: 22,
            detections: Vec::new(),
        };
        cache.store(8, record.clone());
        assert_eq!(cache.current(), &record);
        assert_eq!(cache.staleness(9), Some(1));

        cache.reset(12);
        assert_eq!(cache.current(), &OutputRecord::empty(12));
        assert_eq!(cache.staleness(9), None);
    }
}
