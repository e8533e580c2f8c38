// src/vehicle_detection.rs
//
// ONNX vehicle detection (YOLOv8-family, 80 COCO classes). Only vehicle
// classes are kept; track ids come later from the associator.

use crate::types::Frame;
use anyhow::Result;
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{debug, info};

const YOLO_INPUT_SIZE: usize = 640;
const YOLO_CLASSES: usize = 80;
const YOLO_PREDICTIONS: usize = 8400;
const NMS_IOU_THRESHOLD: f32 = 0.45;

// COCO class IDs for vehicles: car, motorcycle, bus, truck
pub const VEHICLE_CLASSES: [usize; 4] = [2, 3, 5, 7];

#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in original image coordinates
    pub confidence: f32,
    pub class_id: usize,
}

impl Detection {
    pub fn class_name(&self) -> &'static str {
        match self.class_id {
            2 => "car",
            3 => "motorcycle",
            5 => "bus",
            7 => "truck",
            _ => "unknown",
        }
    }
}

/// Produces per-frame vehicle boxes. The ONNX implementation below is the
/// default; tests and the simulation path substitute their own.
pub trait VehicleDetector {
    fn detect_vehicles(&mut self, frame: &Frame, confidence_threshold: f32)
        -> Result<Vec<Detection>>;
}

pub struct YoloVehicleDetector {
    session: Session,
}

impl YoloVehicleDetector {
    pub fn new(model_path: &str, num_threads: usize) -> Result<Self> {
        info!("Loading vehicle model: {}", model_path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_threads)?
            .commit_from_file(model_path)?;

        Ok(Self { session })
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let shape = [1, 3, YOLO_INPUT_SIZE, YOLO_INPUT_SIZE];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.to_vec().into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
    }
}

impl VehicleDetector for YoloVehicleDetector {
    fn detect_vehicles(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }

        let (input, scale, pad_x, pad_y) = letterbox(frame, YOLO_INPUT_SIZE);
        let output = self.infer(&input)?;

        let mut detections = Vec::new();
        for i in 0..YOLO_PREDICTIONS {
            // Output layout: [1, 84, 8400] — cx, cy, w, h, then class scores.
            let cx = output[i];
            let cy = output[YOLO_PREDICTIONS + i];
            let w = output[YOLO_PREDICTIONS * 2 + i];
            let h = output[YOLO_PREDICTIONS * 3 + i];

            let mut max_conf = 0.0f32;
            let mut best_class = 0;
            for c in 0..YOLO_CLASSES {
                let conf = output[YOLO_PREDICTIONS * (4 + c) + i];
                if conf > max_conf {
                    max_conf = conf;
                    best_class = c;
                }
            }

            if max_conf < confidence_threshold || !VEHICLE_CLASSES.contains(&best_class) {
                continue;
            }

            // Center format -> corners, then undo the letterbox transform.
            let x1 = (cx - w / 2.0 - pad_x) / scale;
            let y1 = (cy - h / 2.0 - pad_y) / scale;
            let x2 = (cx + w / 2.0 - pad_x) / scale;
            let y2 = (cy + h / 2.0 - pad_y) / scale;

            detections.push(Detection {
                bbox: [x1, y1, x2, y2],
                confidence: max_conf,
                class_id: best_class,
            });
        }

        let detections = nms(detections, NMS_IOU_THRESHOLD);
        debug!("detected {} vehicles", detections.len());
        Ok(detections)
    }
}

/// Letterbox an RGB frame into a square CHW float tensor: scale to fit,
/// center on a gray canvas, normalize to [0, 1]. Returns the tensor plus
/// the scale and padding needed to map detections back.
pub(crate) fn letterbox(frame: &Frame, target_size: usize) -> (Vec<f32>, f32, f32, f32) {
    let scale = (target_size as f32 / frame.width as f32)
        .min(target_size as f32 / frame.height as f32);
    let scaled_w = ((frame.width as f32 * scale) as usize).max(1);
    let scaled_h = ((frame.height as f32 * scale) as usize).max(1);

    let pad_x = (target_size - scaled_w) as f32 / 2.0;
    let pad_y = (target_size - scaled_h) as f32 / 2.0;

    let resized = resize_bilinear(frame, scaled_w, scaled_h);

    let mut canvas = vec![114u8; target_size * target_size * 3];
    for y in 0..scaled_h {
        for x in 0..scaled_w {
            let src_idx = (y * scaled_w + x) * 3;
            let dst_idx = ((y + pad_y as usize) * target_size + x + pad_x as usize) * 3;
            canvas[dst_idx..dst_idx + 3].copy_from_slice(&resized[src_idx..src_idx + 3]);
        }
    }

    // HWC -> CHW, [0, 255] -> [0, 1]
    let mut input = vec![0.0f32; 3 * target_size * target_size];
    for c in 0..3 {
        for h in 0..target_size {
            for w in 0..target_size {
                let hwc_idx = (h * target_size + w) * 3 + c;
                let chw_idx = c * target_size * target_size + h * target_size + w;
                input[chw_idx] = canvas[hwc_idx] as f32 / 255.0;
            }
        }
    }

    (input, scale, pad_x, pad_y)
}

pub(crate) fn resize_bilinear(frame: &Frame, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let (src, src_w, src_h) = (&frame.data, frame.width, frame.height);
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;
            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);
            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }
    dst
}

pub(crate) fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    while !detections.is_empty() {
        let current = detections.remove(0);
        detections.retain(|det| calculate_iou(&current.bbox, &det.bbox) < iou_threshold);
        keep.push(current);
    }
    keep
}

pub(crate) fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
