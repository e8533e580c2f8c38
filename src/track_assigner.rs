// src/track_assigner.rs
//
// Greedy IoU association: gives raw per-frame detections stable track ids.
// Good enough for the handful of vehicles a gate camera sees at once; no
// motion model. Tracks coast through short detection gaps so a missed
// frame does not fork a new id.

use crate::vehicle_detection::{calculate_iou, Detection};
use tracing::debug;

/// A detection stamped with its track id. `track_id == -1` means the
/// associator could not attach it to a track this frame; aggregation
/// ignores those.
#[derive(Debug, Clone)]
pub struct TrackedDetection {
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: usize,
    pub track_id: i64,
}

struct TrackSlot {
    id: i64,
    bbox: [f32; 4],
    frames_since_hit: u32,
}

pub struct TrackAssigner {
    tracks: Vec<TrackSlot>,
    next_id: i64,
    min_iou: f32,
    max_coast_frames: u32,
}

impl TrackAssigner {
    pub fn new(min_iou: f32, max_coast_frames: u32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            min_iou,
            max_coast_frames,
        }
    }

    /// Associate one frame's detections with existing tracks. Greedy over
    /// descending IoU: each (track, detection) pair is matched at most
    /// once; leftovers spawn fresh tracks.
    pub fn assign(&mut self, detections: &[Detection]) -> Vec<TrackedDetection> {
        // All candidate pairs above the IoU floor, best first.
        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (t_idx, track) in self.tracks.iter().enumerate() {
            for (d_idx, det) in detections.iter().enumerate() {
                let iou = calculate_iou(&track.bbox, &det.bbox);
                if iou >= self.min_iou {
                    pairs.push((t_idx, d_idx, iou));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut track_taken = vec![false; self.tracks.len()];
        let mut det_track: Vec<Option<usize>> = vec![None; detections.len()];
        for (t_idx, d_idx, _) in pairs {
            if track_taken[t_idx] || det_track[d_idx].is_some() {
                continue;
            }
            track_taken[t_idx] = true;
            det_track[d_idx] = Some(t_idx);
        }

        let mut tracked = Vec::with_capacity(detections.len());
        for (d_idx, det) in detections.iter().enumerate() {
            let track_id = match det_track[d_idx] {
                Some(t_idx) => {
                    let track = &mut self.tracks[t_idx];
                    track.bbox = det.bbox;
                    track.frames_since_hit = 0;
                    track.id
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.tracks.push(TrackSlot {
                        id,
                        bbox: det.bbox,
                        frames_since_hit: 0,
                    });
                    debug!(track_id = id, class = det.class_name(), "new track");
                    id
                }
            };
            tracked.push(TrackedDetection {
                bbox: det.bbox,
                confidence: det.confidence,
                class_id: det.class_id,
                track_id,
            });
        }

        // Age unmatched pre-existing tracks (tracks created this frame are
        // fresh hits); retire ids that coasted too long. Ids never recycle.
        let prior_tracks = track_taken.len();
        for (t_idx, track) in self.tracks.iter_mut().take(prior_tracks).enumerate() {
            if !track_taken[t_idx] {
                track.frames_since_hit += 1;
            }
        }
        self.tracks
            .retain(|t| t.frames_since_hit <= self.max_coast_frames);

        tracked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: [f32; 4]) -> Detection {
        Detection {
            bbox,
            confidence: 0.9,
            class_id: 2,
        }
    }

    #[test]
    fn test_stable_id_across_frames() {
        let mut assigner = TrackAssigner::new(0.2, 5);
        let first = assigner.assign(&[det([100.0, 100.0, 200.0, 180.0])]);
        let id = first[0].track_id;

        // Same vehicle, slightly moved.
        let second = assigner.assign(&[det([110.0, 102.0, 210.0, 182.0])]);
        assert_eq!(second[0].track_id, id);
    }

    #[test]
    fn test_distinct_vehicles_get_distinct_ids() {
        let mut assigner = TrackAssigner::new(0.2, 5);
        let tracked = assigner.assign(&[
            det([0.0, 0.0, 50.0, 50.0]),
            det([300.0, 300.0, 380.0, 360.0]),
        ]);
        assert_ne!(tracked[0].track_id, tracked[1].track_id);
    }

    #[test]
    fn test_track_survives_short_gap() {
        let mut assigner = TrackAssigner::new(0.2, 3);
        let id = assigner.assign(&[det([100.0, 100.0, 200.0, 180.0])])[0].track_id;

        // Two empty frames, within the coast budget.
        assert!(assigner.assign(&[]).is_empty());
        assert!(assigner.assign(&[]).is_empty());

        let back = assigner.assign(&[det([104.0, 100.0, 204.0, 180.0])]);
        assert_eq!(back[0].track_id, id);
    }

    #[test]
    fn test_id_retired_after_long_gap() {
        let mut assigner = TrackAssigner::new(0.2, 2);
        let id = assigner.assign(&[det([100.0, 100.0, 200.0, 180.0])])[0].track_id;

        for _ in 0..3 {
            assigner.assign(&[]);
        }

        let back = assigner.assign(&[det([100.0, 100.0, 200.0, 180.0])]);
        assert_ne!(back[0].track_id, id);
    }

    #[test]
    fn test_best_overlap_wins_greedy_match() {
        let mut assigner = TrackAssigner::new(0.1, 5);
        let first = assigner.assign(&[det([0.0, 0.0, 100.0, 100.0])]);
        let id = first[0].track_id;

        // Two candidates overlap the track; the tighter one takes the id.
        let second = assigner.assign(&[
            det([40.0, 40.0, 140.0, 140.0]),
            det([5.0, 5.0, 105.0, 105.0]),
        ]);
        assert_eq!(second[1].track_id, id);
        assert_ne!(second[0].track_id, id);
    }
}
