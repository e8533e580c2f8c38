// src/plate_pipeline.rs
//
// Per-vehicle plate read: crop the vehicle, find the plate, pad the crop,
// run OCR, validate every candidate. Everything that can go wrong here is
// a data condition ("no read this frame"), not an error — the frame loop
// just moves on to the next detection.

use crate::plate_detection::PlateDetector;
use crate::plate_format::PlateNormalizer;
use crate::plate_geometry::extract_plate_crop;
use crate::plate_reader::OcrReader;
use crate::types::{Frame, PlateRead};
use anyhow::Result;
use tracing::debug;

/// Attempt one plate read for a vehicle detection. Returns the validated
/// read, or None when there is no plate, no OCR text, or nothing survived
/// validation.
pub fn process_plate_detection(
    frame: &Frame,
    vehicle_bbox: [f32; 4],
    plate_detector: &mut dyn PlateDetector,
    reader: &mut dyn OcrReader,
    normalizer: &PlateNormalizer,
) -> Result<Option<PlateRead>> {
    let x1 = vehicle_bbox[0].max(0.0) as usize;
    let y1 = vehicle_bbox[1].max(0.0) as usize;
    let x2 = (vehicle_bbox[2].max(0.0) as usize).min(frame.width);
    let y2 = (vehicle_bbox[3].max(0.0) as usize).min(frame.height);
    if x2 <= x1 || y2 <= y1 {
        return Ok(None);
    }

    let vehicle_crop = frame.crop(x1, y1, x2 - x1, y2 - y1);
    if vehicle_crop.is_empty() {
        return Ok(None);
    }

    let Some(plate_box) = plate_detector.detect_plate(&vehicle_crop)? else {
        return Ok(None);
    };
    // Voting weighs the unpadded plate area.
    let area = plate_box.area();

    let Some(plate_crop) = extract_plate_crop(&vehicle_crop, plate_box) else {
        return Ok(None);
    };

    let candidates = reader.read_text(&plate_crop)?;
    if candidates.is_empty() {
        return Ok(None);
    }

    let mut valid_texts = Vec::new();
    let mut valid_confs = Vec::new();
    for candidate in &candidates {
        match normalizer.validate_and_clean(&candidate.text) {
            Some(text) => {
                valid_texts.push(text);
                valid_confs.push(candidate.confidence);
            }
            None => debug!(text = %candidate.text, "read rejected by format validation"),
        }
    }

    if valid_texts.is_empty() {
        return Ok(None);
    }

    let confidence = valid_confs.iter().sum::<f32>() / valid_confs.len() as f32;
    Ok(Some(PlateRead {
        text: valid_texts.join(" "),
        confidence,
        area,
    }))
}
