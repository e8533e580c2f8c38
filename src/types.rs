use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    pub video: VideoConfig,
    pub model: ModelConfig,
    pub detection: DetectionConfig,
    pub voting: VotingConfig,
    pub format: FormatConfig,
    pub ocr: OcrConfig,
    pub submission: SubmissionConfig,
    pub simulation: SimulationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub location_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Directory of decoded .ppm frames, walked in name order.
    pub input_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub vehicle_model_path: String,
    pub plate_model_path: String,
    pub rec_model_path: String,
    pub num_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub confidence_threshold: f32,
    /// Process every Nth frame. Higher = faster but fewer reads per vehicle.
    pub frame_skip_rate: u64,
    /// Minimum IoU for the track associator to match a detection to a track.
    pub min_iou: f32,
    /// Frames a track survives without a detection before its id is retired.
    pub max_coast_frames: u32,
}

/// Feature flags for the finalization vote. Handed to the voting engine at
/// construction so engines with different flags can coexist in one process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VotingConfig {
    /// Trust larger plates more (weight = area / 5000.0).
    pub resolution_weighting: bool,
    /// Trust higher-confidence reads more. If false, each read counts as one vote.
    pub confidence_weighting: bool,
    /// Reconstruct a character-by-character consensus across reads.
    pub positional_voting: bool,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            resolution_weighting: true,
            confidence_weighting: true,
            positional_voting: true,
        }
    }
}

/// Feature flags for plate text normalization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FormatConfig {
    /// Fix common OCR confusions (0->O, 1->I, ...) by expected position.
    pub char_correction: bool,
    /// Discard text that does not match the UK plate pattern.
    pub strict_regex: bool,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            char_correction: true,
            strict_regex: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Apply the reader's own positional correction before candidates leave the reader.
    pub logic_layer: bool,
    /// Candidates below this confidence never reach the aggregation core.
    pub min_confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    pub enabled: bool,
    pub api_endpoint: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub enabled: bool,
    #[serde(default)]
    pub mock_plates: Vec<String>,
    #[serde(default)]
    pub mock_locations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// One decoded RGB frame (HWC, 3 bytes per pixel).
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Copy out a sub-image. The requested region is clamped to the frame
    /// bounds; a region that clamps to nothing yields an empty frame.
    pub fn crop(&self, x: usize, y: usize, w: usize, h: usize) -> Frame {
        let x = x.min(self.width);
        let y = y.min(self.height);
        let w = w.min(self.width - x);
        let h = h.min(self.height - y);

        let mut data = Vec::with_capacity(w * h * 3);
        for row in y..y + h {
            let start = (row * self.width + x) * 3;
            data.extend_from_slice(&self.data[start..start + w * 3]);
        }
        Frame::new(data, w, h)
    }
}

/// One OCR observation of a plate at one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateRead {
    pub text: String,
    pub confidence: f32,
    pub area: f32,
}

/// The one-time decision for a vehicle that left the scene.
#[derive(Debug, Clone)]
pub struct FinalizedPlate {
    pub best_plate: String,
    pub confidence: f32,
    /// Positional-consensus reconstruction, reported alongside the winner
    /// when it exists. Does not replace `best_plate`.
    pub consensus: Option<String>,
    pub history: Vec<PlateRead>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_clamps_to_bounds() {
        // 4x2 frame, every channel of a pixel holds its x index
        let mut data = Vec::new();
        for _y in 0..2 {
            for x in 0..4u8 {
                data.extend_from_slice(&[x, x, x]);
            }
        }
        let frame = Frame::new(data, 4, 2);

        let crop = frame.crop(2, 0, 10, 10);
        assert_eq!(crop.width, 2);
        assert_eq!(crop.height, 2);
        assert_eq!(crop.data[0], 2);

        let empty = frame.crop(4, 2, 1, 1);
        assert!(empty.is_empty());
    }
}
