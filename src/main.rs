// src/main.rs

mod cloud_client;
mod config;
mod frame_source;
mod metrics;
mod plate_detection;
mod plate_format;
mod plate_geometry;
mod plate_pipeline;
mod plate_reader;
mod plate_voting;
mod processor;
mod simulation;
mod track_assigner;
mod types;
mod vehicle_detection;
mod vehicle_tracker;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use cloud_client::{CloudClient, Sighting};
use frame_source::{FrameSource, PpmDirectorySource};
use metrics::PipelineMetrics;
use plate_detection::YoloPlateDetector;
use plate_reader::{CtcRecognizer, LogicReader};
use plate_voting::VotingEngine;
use processor::FrameProcessor;
use simulation::MockSightingGenerator;
use tracing::{info, warn};
use types::Config;
use vehicle_detection::YoloVehicleDetector;
use vehicle_tracker::VehicleTracker;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load("config.yaml")?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("anpr_edge={},ort=warn", config.logging.level).into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(location = %config.device.location_id, "ANPR edge device starting");

    let client = CloudClient::new(&config.submission)?;

    if config.simulation.enabled {
        let generator = MockSightingGenerator::new(&config.device, &config.simulation);
        simulation::run(generator, client).await;
        return Ok(());
    }

    run_pipeline(config, client).await
}

async fn run_pipeline(config: Config, client: CloudClient) -> Result<()> {
    let metrics = PipelineMetrics::new();

    let vehicle_detector =
        YoloVehicleDetector::new(&config.model.vehicle_model_path, config.model.num_threads)?;
    let plate_detector =
        YoloPlateDetector::new(&config.model.plate_model_path, config.model.num_threads)?;
    let recognizer = CtcRecognizer::new(&config.model.rec_model_path, config.model.num_threads)?;
    let reader = LogicReader::new(
        recognizer,
        config.ocr.logic_layer,
        config.ocr.min_confidence,
    );
    info!("models loaded");

    let tracker = VehicleTracker::new(VotingEngine::new(config.voting));
    let mut processor = FrameProcessor::new(
        &config,
        Box::new(vehicle_detector),
        Box::new(plate_detector),
        Box::new(reader),
        tracker,
        metrics.clone(),
    );

    let mut source = PpmDirectorySource::new(&config.video.input_dir)?;
    let mut frame_count: u64 = 0;

    while let Some(frame) = source.next_frame()? {
        frame_count += 1;
        let finalized = processor.process_frame(&frame, frame_count)?;

        for (track_id, plate) in finalized {
            info!(
                track_id,
                plate = %plate.best_plate,
                confidence = plate.confidence,
                reads = plate.history.len(),
                "reporting finalized plate"
            );

            if !config.submission.enabled {
                continue;
            }
            let sighting = Sighting {
                plate_number: plate.best_plate.clone(),
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                location_id: simulation::sighting_location(
                    &config.device.location_id,
                    &config.simulation.mock_locations,
                ),
                vehicle_make: None,
                vehicle_model: None,
                vehicle_color: None,
                // The exit sweep is what produced this plate.
                direction: Some("Exiting".to_string()),
            };
            if client.send_sighting(&sighting).await {
                PipelineMetrics::incr(&metrics.api_successes);
            } else {
                PipelineMetrics::incr(&metrics.api_failures);
                warn!(plate = %plate.best_plate, "sighting submission failed");
            }
        }
    }

    info!("end of frame stream");
    metrics.log_summary();
    Ok(())
}
