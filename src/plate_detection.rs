// src/plate_detection.rs
//
// ONNX plate detection inside a vehicle crop. Single-class YOLO head:
// output layout [1, 5, 8400] (cx, cy, w, h, confidence). Only the single
// highest-confidence box matters; a vehicle shows at most one plate.

use crate::plate_geometry::PlateBox;
use crate::types::Frame;
use crate::vehicle_detection::letterbox;
use anyhow::Result;
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::info;

const PLATE_INPUT_SIZE: usize = 640;
const PLATE_PREDICTIONS: usize = 8400;
const PLATE_CONFIDENCE_THRESHOLD: f32 = 0.3;

/// Finds the best plate box within a vehicle crop, if any.
pub trait PlateDetector {
    fn detect_plate(&mut self, vehicle_crop: &Frame) -> Result<Option<PlateBox>>;
}

pub struct YoloPlateDetector {
    session: Session,
}

impl YoloPlateDetector {
    pub fn new(model_path: &str, num_threads: usize) -> Result<Self> {
        info!("Loading plate model: {}", model_path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_threads)?
            .commit_from_file(model_path)?;

        Ok(Self { session })
    }
}

impl PlateDetector for YoloPlateDetector {
    fn detect_plate(&mut self, vehicle_crop: &Frame) -> Result<Option<PlateBox>> {
        if vehicle_crop.is_empty() {
            return Ok(None);
        }

        let (input, scale, pad_x, pad_y) = letterbox(vehicle_crop, PLATE_INPUT_SIZE);

        let shape = [1, 3, PLATE_INPUT_SIZE, PLATE_INPUT_SIZE];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;
        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let (_, output) = outputs[0].try_extract_tensor::<f32>()?;

        let mut best: Option<(f32, PlateBox)> = None;
        for i in 0..PLATE_PREDICTIONS {
            let conf = output[PLATE_PREDICTIONS * 4 + i];
            if conf < PLATE_CONFIDENCE_THRESHOLD {
                continue;
            }
            if let Some((best_conf, _)) = best {
                if conf <= best_conf {
                    continue;
                }
            }

            let cx = output[i];
            let cy = output[PLATE_PREDICTIONS + i];
            let w = output[PLATE_PREDICTIONS * 2 + i];
            let h = output[PLATE_PREDICTIONS * 3 + i];

            // Undo the letterbox transform and clamp into the crop.
            let x1 = ((cx - w / 2.0 - pad_x) / scale).max(0.0);
            let y1 = ((cy - h / 2.0 - pad_y) / scale).max(0.0);
            let x2 = ((cx + w / 2.0 - pad_x) / scale).min(vehicle_crop.width as f32);
            let y2 = ((cy + h / 2.0 - pad_y) / scale).min(vehicle_crop.height as f32);

            if x2 <= x1 || y2 <= y1 {
                continue;
            }

            best = Some((
                conf,
                PlateBox {
                    x: x1 as u32,
                    y: y1 as u32,
                    w: (x2 - x1) as u32,
                    h: (y2 - y1) as u32,
                },
            ));
        }

        Ok(best.map(|(_, plate_box)| plate_box))
    }
}
