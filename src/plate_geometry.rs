// src/plate_geometry.rs
//
// Geometry for turning a detected plate box into the crop handed to OCR.
// The detector tends to cut plate borders tight, which hurts recognition,
// so the region is padded by 10% of the plate size on every side and then
// clamped back into the vehicle crop.

use crate::types::Frame;

/// Fraction of plate width/height added as padding on each side.
const PLATE_PADDING_RATIO: f32 = 0.1;

/// A plate bounding box in vehicle-crop pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlateBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl PlateBox {
    /// Unpadded plate area, used as the resolution weight for voting.
    pub fn area(&self) -> f32 {
        (self.w * self.h) as f32
    }
}

/// Pad `plate_box` symmetrically and clamp it to a `crop_w` x `crop_h`
/// vehicle crop. Pad first, clamp second. Returns None when the clamped
/// region has zero area.
pub fn padded_plate_region(
    plate_box: PlateBox,
    crop_w: usize,
    crop_h: usize,
) -> Option<PlateBox> {
    let pad_w = (plate_box.w as f32 * PLATE_PADDING_RATIO) as u32;
    let pad_h = (plate_box.h as f32 * PLATE_PADDING_RATIO) as u32;

    let x = plate_box.x.saturating_sub(pad_w);
    let y = plate_box.y.saturating_sub(pad_h);
    let w = (plate_box.w + 2 * pad_w).min((crop_w as u32).saturating_sub(x));
    let h = (plate_box.h + 2 * pad_h).min((crop_h as u32).saturating_sub(y));

    if w == 0 || h == 0 {
        return None;
    }
    Some(PlateBox { x, y, w, h })
}

/// Extract the padded plate sub-image from a vehicle crop, or None when the
/// padded region (or the resulting crop) is degenerate.
pub fn extract_plate_crop(vehicle_crop: &Frame, plate_box: PlateBox) -> Option<Frame> {
    let region = padded_plate_region(plate_box, vehicle_crop.width, vehicle_crop.height)?;
    let crop = vehicle_crop.crop(
        region.x as usize,
        region.y as usize,
        region.w as usize,
        region.h as usize,
    );
    if crop.is_empty() {
        return None;
    }
    Some(crop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interior_box_padded_symmetrically() {
        let region = padded_plate_region(
            PlateBox {
                x: 50,
                y: 50,
                w: 40,
                h: 20,
            },
            200,
            200,
        )
        .unwrap();
        // 10% of 40 = 4, 10% of 20 = 2
        assert_eq!(
            region,
            PlateBox {
                x: 46,
                y: 48,
                w: 48,
                h: 24
            }
        );
    }

    #[test]
    fn test_padding_clamped_at_origin() {
        let region = padded_plate_region(
            PlateBox {
                x: 2,
                y: 1,
                w: 40,
                h: 20,
            },
            200,
            200,
        )
        .unwrap();
        assert_eq!(region.x, 0);
        assert_eq!(region.y, 0);
        assert_eq!(region.w, 48);
        assert_eq!(region.h, 24);
    }

    #[test]
    fn test_padding_clamped_at_far_edge() {
        let region = padded_plate_region(
            PlateBox {
                x: 170,
                y: 185,
                w: 40,
                h: 20,
            },
            200,
            200,
        )
        .unwrap();
        // Origin shifts by the padding, extent is cut at the crop boundary.
        assert_eq!(region.x, 166);
        assert_eq!(region.y, 183);
        assert_eq!(region.w, 200 - 166);
        assert_eq!(region.h, 200 - 183);
    }

    #[test]
    fn test_zero_area_region_rejected() {
        assert_eq!(
            padded_plate_region(
                PlateBox {
                    x: 10,
                    y: 10,
                    w: 0,
                    h: 5
                },
                200,
                200
            ),
            None
        );
        // Box entirely outside the crop clamps to nothing.
        assert_eq!(
            padded_plate_region(
                PlateBox {
                    x: 300,
                    y: 10,
                    w: 20,
                    h: 10
                },
                200,
                200
            ),
            None
        );
    }

    #[test]
    fn test_extract_plate_crop_dimensions() {
        let frame = Frame::new(vec![0; 100 * 60 * 3], 100, 60);
        let crop = extract_plate_crop(
            &frame,
            PlateBox {
                x: 20,
                y: 20,
                w: 30,
                h: 10,
            },
        )
        .unwrap();
        assert_eq!(crop.width, 36);
        assert_eq!(crop.height, 12);
    }
}
