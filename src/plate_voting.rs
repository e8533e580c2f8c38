// src/plate_voting.rs
//
// Finalization vote: fuse a vehicle's accumulated OCR reads into one plate.
//
// Phase A picks the best whole-string candidate by weighted plurality.
// Phase B (optional) rebuilds the plate character by character across all
// length-7 reads, which can recover a plate no single read got right. The
// reconstruction is reported next to the Phase A winner but does not
// replace it — kept bit-for-bit compatible with the deployed behavior, see
// DESIGN.md.
//
// Tie-break rule: when two candidates reach the same score, the first one
// to appear in read order wins. This applies to whole strings in Phase A
// and independently per position in Phase B.

use crate::types::{FinalizedPlate, PlateRead, VotingConfig};
use tracing::{debug, info};

/// Plate area (px^2) that counts as weight 1.0 under resolution weighting.
const REFERENCE_PLATE_AREA: f32 = 5000.0;

/// Number of characters in the standard plate layout.
const PLATE_LEN: usize = 7;

pub struct VotingEngine {
    config: VotingConfig,
}

/// Insertion-ordered score accumulator. The candidate count per vehicle is
/// tiny, so linear scans beat a map and keep first-appearance order without
/// extra bookkeeping.
struct ScoreTable<K: PartialEq> {
    entries: Vec<(K, f32, u32)>,
}

impl<K: PartialEq> ScoreTable<K> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn add(&mut self, key: K, score: f32) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _, _)| *k == key) {
            entry.1 += score;
            entry.2 += 1;
        } else {
            self.entries.push((key, score, 1));
        }
    }

    /// First entry (in insertion order) holding the maximum score.
    fn winner(&self) -> Option<&(K, f32, u32)> {
        let mut best: Option<&(K, f32, u32)> = None;
        for entry in &self.entries {
            match best {
                Some(b) if entry.1 <= b.1 => {}
                _ => best = Some(entry),
            }
        }
        best
    }
}

impl VotingEngine {
    pub fn new(config: VotingConfig) -> Self {
        Self { config }
    }

    fn read_score(&self, confidence: f32, area: f32) -> f32 {
        let weight = if self.config.resolution_weighting {
            area / REFERENCE_PLATE_AREA
        } else {
            1.0
        };
        if self.config.confidence_weighting {
            confidence * weight
        } else {
            weight
        }
    }

    /// Decide the plate for one vehicle from its read history.
    ///
    /// Returns None only for an empty history; the exit monitor never calls
    /// it with one.
    pub fn finalize(&self, track_id: i64, reads: &[PlateRead]) -> Option<FinalizedPlate> {
        if reads.is_empty() {
            return None;
        }

        // Phase A: weighted plurality over whole strings.
        let mut votes: ScoreTable<&str> = ScoreTable::new();
        for read in reads {
            votes.add(&read.text, self.read_score(read.confidence, read.area));
        }

        for (text, score, count) in &votes.entries {
            debug!(track_id, %text, score, votes = count, "plate candidate");
        }

        let &(best_plate, best_score, vote_count) = votes.winner()?;
        info!(
            track_id,
            plate = best_plate,
            score = best_score,
            votes = %format!("{vote_count}/{}", reads.len()),
            "vehicle left frame, best read selected"
        );

        // Rough normalization against the read count; not a probability.
        let confidence = best_score / (reads.len() as f32).max(1.0);

        let consensus = if self.config.positional_voting {
            self.positional_consensus(track_id, best_plate, reads)
        } else {
            None
        };

        Some(FinalizedPlate {
            best_plate: best_plate.to_string(),
            confidence,
            consensus,
            history: reads.to_vec(),
        })
    }

    /// Phase B: per-position weighted majority across all reads with the
    /// standard 7-character shape (spaces ignored). Needs at least two such
    /// reads to mean anything.
    fn positional_consensus(
        &self,
        track_id: i64,
        phase_a_winner: &str,
        reads: &[PlateRead],
    ) -> Option<String> {
        let candidates: Vec<(Vec<char>, f32)> = reads
            .iter()
            .filter_map(|r| {
                let stripped: Vec<char> = r.text.chars().filter(|c| *c != ' ').collect();
                (stripped.len() == PLATE_LEN)
                    .then(|| (stripped, self.read_score(r.confidence, r.area)))
            })
            .collect();

        if candidates.len() < 2 {
            return None;
        }

        let mut plate: Vec<char> = Vec::with_capacity(PLATE_LEN);
        for pos in 0..PLATE_LEN {
            let mut table: ScoreTable<char> = ScoreTable::new();
            for (chars, score) in &candidates {
                table.add(chars[pos], *score);
            }
            if table.entries.len() > 1 {
                let summary: Vec<String> = table
                    .entries
                    .iter()
                    .map(|(c, s, _)| format!("'{c}':{s:.2}"))
                    .collect();
                debug!(track_id, pos, votes = %summary.join(", "), "contested position");
            }
            let &(best_char, _, _) = table.winner()?;
            plate.push(best_char);
        }

        let head: String = plate[..4].iter().collect();
        let tail: String = plate[4..].iter().collect();
        let formatted = format!("{head} {tail}");
        if formatted != phase_a_winner {
            info!(
                track_id,
                consensus = %formatted,
                merged_from = candidates.len(),
                "positional consensus differs from plurality winner"
            );
        }
        Some(formatted)
    }
}
