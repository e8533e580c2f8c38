// src/processor.rs
//
// The frame-synchronous processing loop: detect vehicles, attach track
// ids, try one plate read per tracked vehicle, then sweep for vehicles
// that left the scene. One frame is fully processed before the next; the
// tracker is only ever touched from this path.

use crate::metrics::PipelineMetrics;
use crate::plate_detection::PlateDetector;
use crate::plate_format::PlateNormalizer;
use crate::plate_pipeline::process_plate_detection;
use crate::plate_reader::OcrReader;
use crate::track_assigner::{TrackAssigner, TrackedDetection};
use crate::vehicle_detection::VehicleDetector;
use crate::vehicle_tracker::VehicleTracker;
use crate::types::{Config, FinalizedPlate, Frame};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use tracing::debug;

pub struct FrameProcessor {
    vehicle_detector: Box<dyn VehicleDetector>,
    plate_detector: Box<dyn PlateDetector>,
    reader: Box<dyn OcrReader>,
    assigner: TrackAssigner,
    tracker: VehicleTracker,
    normalizer: PlateNormalizer,
    metrics: PipelineMetrics,
    confidence_threshold: f32,
    frame_skip_rate: u64,
}

impl FrameProcessor {
    pub fn new(
        config: &Config,
        vehicle_detector: Box<dyn VehicleDetector>,
        plate_detector: Box<dyn PlateDetector>,
        reader: Box<dyn OcrReader>,
        tracker: VehicleTracker,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            vehicle_detector,
            plate_detector,
            reader,
            assigner: TrackAssigner::new(config.detection.min_iou, config.detection.max_coast_frames),
            tracker,
            normalizer: PlateNormalizer::new(config.format),
            metrics,
            confidence_threshold: config.detection.confidence_threshold,
            frame_skip_rate: config.detection.frame_skip_rate.max(1),
        }
    }

    /// Process one frame and return the plates finalized by it. Frames that
    /// fall off the skip grid return an empty map without touching state.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        frame_count: u64,
    ) -> Result<HashMap<i64, FinalizedPlate>> {
        if frame_count % self.frame_skip_rate != 0 {
            return Ok(HashMap::new());
        }
        PipelineMetrics::incr(&self.metrics.frames_processed);

        let detections = self
            .vehicle_detector
            .detect_vehicles(frame, self.confidence_threshold)?;
        let tracked = self.assigner.assign(&detections);
        self.aggregate_detections(frame, frame_count, &tracked)?;

        // Exit sweep runs after every detection of this frame is aggregated.
        let finalized = self.tracker.check_exiting_vehicles(frame_count);
        self.metrics
            .plates_finalized
            .fetch_add(finalized.len() as u64, Ordering::Relaxed);
        self.metrics
            .exits_without_plate
            .store(self.tracker.total_no_plate_exits(), Ordering::Relaxed);

        Ok(finalized)
    }

    fn aggregate_detections(
        &mut self,
        frame: &Frame,
        frame_count: u64,
        tracked: &[TrackedDetection],
    ) -> Result<()> {
        for detection in tracked {
            // Untracked detections never aggregate.
            if detection.track_id == -1 {
                continue;
            }
            PipelineMetrics::incr(&self.metrics.vehicles_seen);
            self.tracker.update(detection.track_id, frame_count);

            let read = process_plate_detection(
                frame,
                detection.bbox,
                self.plate_detector.as_mut(),
                self.reader.as_mut(),
                &self.normalizer,
            )?;

            if let Some(read) = read {
                debug!(
                    track_id = detection.track_id,
                    text = %read.text,
                    confidence = read.confidence,
                    "plate read accepted"
                );
                PipelineMetrics::incr(&self.metrics.reads_accepted);
                self.tracker
                    .add_read(detection.track_id, read.text, read.confidence, read.area);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plate_geometry::PlateBox;
    use crate::plate_reader::OcrCandidate;
    use crate::plate_voting::VotingEngine;
    use crate::types::*;
    use crate::vehicle_detection::Detection;

    struct ScriptedVehicleDetector {
        // Detections to return per call, in order; empty after the script ends.
        script: Vec<Vec<Detection>>,
        call: usize,
    }

    impl VehicleDetector for ScriptedVehicleDetector {
        fn detect_vehicles(
            &mut self,
            _frame: &Frame,
            _confidence_threshold: f32,
        ) -> Result<Vec<Detection>> {
            let out = self.script.get(self.call).cloned().unwrap_or_default();
            self.call += 1;
            Ok(out)
        }
    }

    struct FixedPlateDetector(Option<PlateBox>);

    impl PlateDetector for FixedPlateDetector {
        fn detect_plate(&mut self, _vehicle_crop: &Frame) -> Result<Option<PlateBox>> {
            Ok(self.0)
        }
    }

    struct FixedReader(Vec<OcrCandidate>);

    impl OcrReader for FixedReader {
        fn read_text(&mut self, _plate_crop: &Frame) -> Result<Vec<OcrCandidate>> {
            Ok(self.0.clone())
        }
    }

    fn test_config() -> Config {
        Config {
            device: DeviceConfig {
                location_id: "TEST".into(),
            },
            video: VideoConfig {
                input_dir: String::new(),
            },
            model: ModelConfig {
                vehicle_model_path: String::new(),
                plate_model_path: String::new(),
                rec_model_path: String::new(),
                num_threads: 1,
            },
            detection: DetectionConfig {
                confidence_threshold: 0.25,
                frame_skip_rate: 1,
                min_iou: 0.2,
                max_coast_frames: 30,
            },
            voting: VotingConfig::default(),
            format: FormatConfig::default(),
            ocr: OcrConfig {
                logic_layer: true,
                min_confidence: 0.5,
            },
            submission: SubmissionConfig {
                enabled: false,
                api_endpoint: String::new(),
                api_key: String::new(),
            },
            simulation: SimulationConfig {
                enabled: false,
                mock_plates: vec![],
                mock_locations: vec![],
            },
            logging: LoggingConfig {
                level: "info".into(),
            },
        }
    }

    fn vehicle(bbox: [f32; 4]) -> Detection {
        Detection {
            bbox,
            confidence: 0.9,
            class_id: 2,
        }
    }

    #[test]
    fn test_vehicle_tracked_read_and_finalized_after_exit() {
        let config = test_config();
        let bbox = [10.0, 10.0, 120.0, 90.0];

        // Seen for three frames, then gone.
        let script = vec![vec![vehicle(bbox)], vec![vehicle(bbox)], vec![vehicle(bbox)]];
        let metrics = PipelineMetrics::new();
        let mut processor = FrameProcessor::new(
            &config,
            Box::new(ScriptedVehicleDetector { script, call: 0 }),
            Box::new(FixedPlateDetector(Some(PlateBox {
                x: 20,
                y: 40,
                w: 50,
                h: 20,
            }))),
            Box::new(FixedReader(vec![OcrCandidate {
                text: "AB12CDE".into(),
                confidence: 0.9,
            }])),
            VehicleTracker::new(VotingEngine::new(config.voting)),
            metrics.clone(),
        );

        let frame = Frame::new(vec![0; 200 * 200 * 3], 200, 200);

        let mut finalized = HashMap::new();
        for frame_count in 1..=30 {
            let out = processor.process_frame(&frame, frame_count).unwrap();
            if !out.is_empty() {
                assert!(finalized.is_empty(), "finalized twice");
                assert_eq!(frame_count, 19, "3 (last seen) + 15 stale + 1");
                finalized = out;
            }
        }

        assert_eq!(finalized.len(), 1);
        let plate = finalized.values().next().unwrap();
        assert_eq!(plate.best_plate, "AB12 CDE");
        assert_eq!(plate.history.len(), 3);
        assert_eq!(
            metrics.plates_finalized.load(Ordering::Relaxed),
            1
        );
        assert_eq!(metrics.reads_accepted.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_frame_skip_leaves_state_untouched() {
        let mut config = test_config();
        config.detection.frame_skip_rate = 7;

        let script = vec![vec![vehicle([0.0, 0.0, 50.0, 50.0])]];
        let metrics = PipelineMetrics::new();
        let mut processor = FrameProcessor::new(
            &config,
            Box::new(ScriptedVehicleDetector { script, call: 0 }),
            Box::new(FixedPlateDetector(None)),
            Box::new(FixedReader(vec![])),
            VehicleTracker::new(VotingEngine::new(config.voting)),
            metrics.clone(),
        );

        let frame = Frame::new(vec![0; 100 * 100 * 3], 100, 100);
        for frame_count in 1..=6 {
            processor.process_frame(&frame, frame_count).unwrap();
        }
        // Frames 1..=6 all skipped; the detector script has not advanced.
        assert_eq!(metrics.frames_processed.load(Ordering::Relaxed), 0);

        processor.process_frame(&frame, 7).unwrap();
        assert_eq!(metrics.frames_processed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.vehicles_seen.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_vehicle_without_reads_counts_no_plate_exit() {
        let config = test_config();
        let script = vec![vec![vehicle([0.0, 0.0, 50.0, 50.0])]];
        let metrics = PipelineMetrics::new();
        let mut processor = FrameProcessor::new(
            &config,
            Box::new(ScriptedVehicleDetector { script, call: 0 }),
            Box::new(FixedPlateDetector(None)),
            Box::new(FixedReader(vec![])),
            VehicleTracker::new(VotingEngine::new(config.voting)),
            metrics.clone(),
        );

        let frame = Frame::new(vec![0; 100 * 100 * 3], 100, 100);
        for frame_count in 1..=20 {
            let out = processor.process_frame(&frame, frame_count).unwrap();
            assert!(out.is_empty());
        }
        assert_eq!(metrics.exits_without_plate.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.plates_finalized.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_untracked_detection_never_aggregates() {
        let config = test_config();
        let metrics = PipelineMetrics::new();
        let mut processor = FrameProcessor::new(
            &config,
            Box::new(ScriptedVehicleDetector {
                script: vec![],
                call: 0,
            }),
            Box::new(FixedPlateDetector(Some(PlateBox {
                x: 20,
                y: 40,
                w: 50,
                h: 20,
            }))),
            Box::new(FixedReader(vec![OcrCandidate {
                text: "AB12CDE".into(),
                confidence: 0.9,
            }])),
            VehicleTracker::new(VotingEngine::new(config.voting)),
            metrics.clone(),
        );

        let frame = Frame::new(vec![0; 200 * 200 * 3], 200, 200);
        let untracked = TrackedDetection {
            bbox: [10.0, 10.0, 120.0, 90.0],
            confidence: 0.9,
            class_id: 2,
            track_id: -1,
        };
        let tracked = TrackedDetection {
            track_id: 5,
            ..untracked.clone()
        };
        processor
            .aggregate_detections(&frame, 1, &[untracked, tracked])
            .unwrap();

        // Only the tracked detection made it into aggregation.
        assert_eq!(metrics.vehicles_seen.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.reads_accepted.load(Ordering::Relaxed), 1);

        // The exit sweep finds exactly one record, and it is the tracked one.
        let finalized = processor.process_frame(&frame, 17).unwrap();
        assert_eq!(finalized.len(), 1);
        assert!(finalized.contains_key(&5));
    }
}
