// src/simulation.rs
//
// Simulation mode: no camera, no models. Generates plausible sightings on
// a randomized interval and pushes them through the same submission path
// as real finalized plates. Used for backend integration work and demos.

use crate::cloud_client::{CloudClient, Sighting};
use crate::types::{DeviceConfig, SimulationConfig};
use chrono::{SecondsFormat, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;
use tracing::info;

const MAKES: [&str; 7] = [
    "Toyota",
    "Honda",
    "Ford",
    "Chevrolet",
    "BMW",
    "Mercedes",
    "Tesla",
];

fn models_for(make: &str) -> [&'static str; 3] {
    match make {
        "Toyota" => ["Camry", "Corolla", "RAV4"],
        "Honda" => ["Civic", "Accord", "CR-V"],
        "Ford" => ["F-150", "Mustang", "Explorer"],
        "Chevrolet" => ["Silverado", "Malibu", "Equinox"],
        "BMW" => ["3 Series", "5 Series", "X5"],
        "Mercedes" => ["C-Class", "E-Class", "GLC"],
        _ => ["Model 3", "Model Y", "Model S"],
    }
}

const COLORS: [&str; 7] = ["White", "Black", "Silver", "Gray", "Red", "Blue", "Green"];

/// Location stamped on outgoing sightings. When mock locations are
/// configured they override the device's own id, spreading reports across
/// several sites; this applies to real finalized plates too, not just the
/// mock generator.
pub fn sighting_location(location_id: &str, mock_locations: &[String]) -> String {
    mock_locations
        .choose(&mut rand::thread_rng())
        .cloned()
        .unwrap_or_else(|| location_id.to_string())
}

pub struct MockSightingGenerator {
    location_id: String,
    mock_plates: Vec<String>,
    mock_locations: Vec<String>,
}

impl MockSightingGenerator {
    pub fn new(device: &DeviceConfig, simulation: &SimulationConfig) -> Self {
        Self {
            location_id: device.location_id.clone(),
            mock_plates: simulation.mock_plates.clone(),
            mock_locations: simulation.mock_locations.clone(),
        }
    }

    fn random_plate(rng: &mut impl Rng) -> String {
        let letters: String = (0..3)
            .map(|_| rng.gen_range(b'A'..=b'Z') as char)
            .collect();
        let numbers: String = (0..3)
            .map(|_| rng.gen_range(b'0'..=b'9') as char)
            .collect();
        format!("{letters}-{numbers}")
    }

    /// Roll one mock sighting, or None when this loop iteration stays quiet.
    pub fn maybe_sighting(&self) -> Option<Sighting> {
        let mut rng = rand::thread_rng();
        if !rng.gen_bool(0.5) {
            return None;
        }

        let plate = self
            .mock_plates
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| Self::random_plate(&mut rng));
        let location = sighting_location(&self.location_id, &self.mock_locations);

        // Make/model/color come through most of the time, like a real
        // classifier; direction almost always.
        let (vehicle_make, vehicle_model, vehicle_color) = if rng.gen_bool(0.8) {
            let make = *MAKES.choose(&mut rng).expect("non-empty");
            let model = *models_for(make).choose(&mut rng).expect("non-empty");
            let color = *COLORS.choose(&mut rng).expect("non-empty");
            (
                Some(make.to_string()),
                Some(model.to_string()),
                Some(color.to_string()),
            )
        } else {
            (None, None, None)
        };

        let direction = rng.gen_bool(0.9).then(|| {
            if rng.gen_bool(0.5) {
                "Entering".to_string()
            } else {
                "Exiting".to_string()
            }
        });

        Some(Sighting {
            plate_number: plate,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            location_id: location,
            vehicle_make,
            vehicle_model,
            vehicle_color,
            direction,
        })
    }
}

/// Run the simulation loop until the task is cancelled.
pub async fn run(generator: MockSightingGenerator, client: CloudClient) {
    info!("starting mock sighting generator");
    loop {
        let pause_ms = rand::thread_rng().gen_range(500..1500);
        tokio::time::sleep(Duration::from_millis(pause_ms)).await;

        if let Some(sighting) = generator.maybe_sighting() {
            info!(
                plate = %sighting.plate_number,
                location = %sighting.location_id,
                "mock sighting"
            );
            client.send_sighting(&sighting).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(plates: Vec<String>, locations: Vec<String>) -> MockSightingGenerator {
        MockSightingGenerator::new(
            &DeviceConfig {
                location_id: "LOC-1".into(),
            },
            &SimulationConfig {
                enabled: true,
                mock_plates: plates,
                mock_locations: locations,
            },
        )
    }

    #[test]
    fn test_configured_plates_and_locations_used() {
        let g = generator(vec!["AB12 CDE".into()], vec!["GATE-2".into()]);
        // Roll until the coin lands on a sighting.
        let sighting = std::iter::repeat_with(|| g.maybe_sighting())
            .flatten()
            .next()
            .unwrap();
        assert_eq!(sighting.plate_number, "AB12 CDE");
        assert_eq!(sighting.location_id, "GATE-2");
        assert!(sighting.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_fallbacks_without_mock_lists() {
        let g = generator(vec![], vec![]);
        let sighting = std::iter::repeat_with(|| g.maybe_sighting())
            .flatten()
            .next()
            .unwrap();
        assert_eq!(sighting.location_id, "LOC-1");
        // Generated plates follow the LLL-NNN shape.
        let bytes = sighting.plate_number.as_bytes();
        assert_eq!(bytes.len(), 7);
        assert!(bytes[..3].iter().all(|b| b.is_ascii_uppercase()));
        assert_eq!(bytes[3], b'-');
        assert!(bytes[4..].iter().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn test_sighting_location_prefers_mock_list() {
        let mocks = vec!["GATE-1".to_string(), "GATE-2".to_string()];
        for _ in 0..10 {
            let picked = sighting_location("LOC-1", &mocks);
            assert!(mocks.contains(&picked));
        }
        assert_eq!(sighting_location("LOC-1", &[]), "LOC-1");
    }
}
