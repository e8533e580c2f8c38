// src/vehicle_tracker.rs
//
// Per-vehicle read aggregation and exit detection.
//
// Every tracked vehicle gets a record that accumulates OCR reads across
// frames. Once a vehicle goes unseen for more than STALE_FRAMES frames it
// is presumed gone and finalized exactly once: its reads go through the
// voting engine and the result is handed back to the caller. Records stay
// in the map after finalization so a late re-detection of a retired track
// id cannot resurrect it; see DESIGN.md on retention.

use crate::plate_voting::VotingEngine;
use crate::types::{FinalizedPlate, PlateRead};
use std::collections::HashMap;
use tracing::{info, warn};

/// Frames a vehicle may go unseen before it is presumed to have left.
pub const STALE_FRAMES: u64 = 15;

#[derive(Debug, Clone)]
struct VehicleRecord {
    reads: Vec<PlateRead>,
    last_seen_frame: u64,
    finalized: bool,
}

pub struct VehicleTracker {
    vehicles: HashMap<i64, VehicleRecord>,
    voting: VotingEngine,
    no_plate_exits: u64,
}

impl VehicleTracker {
    pub fn new(voting: VotingEngine) -> Self {
        Self {
            vehicles: HashMap::new(),
            voting,
            no_plate_exits: 0,
        }
    }

    /// Vehicles finalized without a single valid read so far.
    pub fn total_no_plate_exits(&self) -> u64 {
        self.no_plate_exits
    }

    /// Register that a tracked vehicle was seen this frame. Creates the
    /// record on first sight; afterwards only advances the last-seen frame.
    /// Reads are never reset.
    pub fn update(&mut self, track_id: i64, frame_count: u64) {
        self.vehicles
            .entry(track_id)
            .and_modify(|record| record.last_seen_frame = frame_count)
            .or_insert_with(|| VehicleRecord {
                reads: Vec::new(),
                last_seen_frame: frame_count,
                finalized: false,
            });
    }

    /// Append an OCR read to a vehicle's history. Unknown track ids are a
    /// silent no-op: reads can arrive out of order with respect to updates
    /// from the external tracker.
    pub fn add_read(&mut self, track_id: i64, text: String, confidence: f32, area: f32) {
        if let Some(record) = self.vehicles.get_mut(&track_id) {
            record.reads.push(PlateRead {
                text,
                confidence,
                area,
            });
        }
    }

    /// Number of reads accumulated for a live track (tests and overlays).
    pub fn read_count(&self, track_id: i64) -> usize {
        self.vehicles.get(&track_id).map_or(0, |r| r.reads.len())
    }

    /// Finalize every vehicle unseen for more than STALE_FRAMES frames.
    /// Returns the plates decided on this call, keyed by track id; a
    /// vehicle that left without a single valid read is only logged. Either
    /// way the record is marked finalized and never revisited.
    pub fn check_exiting_vehicles(&mut self, current_frame: u64) -> HashMap<i64, FinalizedPlate> {
        let mut finalized_this_frame = HashMap::new();

        for (&track_id, record) in self.vehicles.iter_mut() {
            if record.finalized
                || current_frame.saturating_sub(record.last_seen_frame) <= STALE_FRAMES
            {
                continue;
            }

            if record.reads.is_empty() {
                warn!(track_id, "vehicle left frame with no valid plate read");
                self.no_plate_exits += 1;
            } else if let Some(result) = self.voting.finalize(track_id, &record.reads) {
                info!(
                    track_id,
                    plate = %result.best_plate,
                    confidence = result.confidence,
                    reads = result.history.len(),
                    "plate finalized"
                );
                finalized_this_frame.insert(track_id, result);
            }

            record.finalized = true;
        }

        finalized_this_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VotingConfig;

    fn tracker() -> VehicleTracker {
        VehicleTracker::new(VotingEngine::new(VotingConfig::default()))
    }

    #[test]
    fn test_finalizes_only_past_staleness_threshold() {
        let mut t = tracker();
        t.update(7, 10);
        t.add_read(7, "AB12 CDE".into(), 0.9, 5000.0);

        // 25 - 10 = 15 is not yet stale.
        assert!(t.check_exiting_vehicles(25).is_empty());

        // 26 - 10 = 16 > 15 finalizes.
        let finalized = t.check_exiting_vehicles(26);
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[&7].best_plate, "AB12 CDE");
        assert_eq!(finalized[&7].history.len(), 1);
    }

    #[test]
    fn test_exit_scan_is_idempotent() {
        let mut t = tracker();
        t.update(3, 1);
        t.add_read(3, "AB12 CDE".into(), 0.9, 5000.0);

        assert_eq!(t.check_exiting_vehicles(20).len(), 1);
        // Same frame again: already finalized, nothing re-emitted.
        assert!(t.check_exiting_vehicles(20).is_empty());
        assert!(t.check_exiting_vehicles(100).is_empty());
    }

    #[test]
    fn test_update_keeps_vehicle_alive() {
        let mut t = tracker();
        t.update(5, 10);
        t.add_read(5, "AB12 CDE".into(), 0.9, 5000.0);
        t.update(5, 20);

        // 26 - 20 = 6, still present.
        assert!(t.check_exiting_vehicles(26).is_empty());
        let finalized = t.check_exiting_vehicles(36);
        assert_eq!(finalized.len(), 1);
    }

    #[test]
    fn test_update_never_resets_reads() {
        let mut t = tracker();
        t.update(9, 1);
        t.add_read(9, "AB12 CDE".into(), 0.9, 5000.0);
        t.update(9, 2);
        t.add_read(9, "AB12 CDF".into(), 0.5, 2500.0);
        assert_eq!(t.read_count(9), 2);
    }

    #[test]
    fn test_read_for_unknown_track_is_ignored() {
        let mut t = tracker();
        t.add_read(42, "AB12 CDE".into(), 0.9, 5000.0);
        assert_eq!(t.read_count(42), 0);
        assert!(t.check_exiting_vehicles(100).is_empty());
    }

    #[test]
    fn test_vehicle_without_reads_emits_no_result() {
        let mut t = tracker();
        t.update(11, 1);
        assert!(t.check_exiting_vehicles(50).is_empty());
        // Still finalized: a later read on the retired id goes nowhere new.
        t.update(11, 60);
        assert!(t.check_exiting_vehicles(100).is_empty());
    }

    #[test]
    fn test_weighted_vote_through_tracker() {
        let mut t = tracker();
        t.update(1, 1);
        t.add_read(1, "AB12 CDE".into(), 0.9, 5000.0);
        t.add_read(1, "AB12 CDF".into(), 0.5, 2500.0);

        let finalized = t.check_exiting_vehicles(20);
        let plate = &finalized[&1];
        assert_eq!(plate.best_plate, "AB12 CDE");
        assert!((plate.confidence - 0.45).abs() < 1e-6);
    }
}
