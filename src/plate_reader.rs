// src/plate_reader.rs
//
// OCR over plate crops. The recognizer is a CTC-trained recognition model
// run through ort with greedy decoding. The logic layer on top applies the
// reader's own positional correction (wider confusion maps than the
// normalizer's) and drops low-confidence candidates before anything
// reaches the aggregation core.

use crate::types::Frame;
use crate::vehicle_detection::resize_bilinear;
use anyhow::Result;
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::info;

const REC_INPUT_HEIGHT: usize = 48;
const REC_INPUT_WIDTH: usize = 320;

/// Recognition vocabulary: blank at index 0, then digits and letters.
const REC_CHARSET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// One raw OCR candidate for a plate crop.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrCandidate {
    pub text: String,
    pub confidence: f32,
}

/// Reads text candidates off an already-cropped plate image.
pub trait OcrReader {
    fn read_text(&mut self, plate_crop: &Frame) -> Result<Vec<OcrCandidate>>;
}

// Reader-internal confusion maps. Deliberately wider than the strict
// normalizer maps (G/6, A/4, T/7, J/3 are model-specific confusions).
fn reader_digit_to_letter(c: char) -> Option<char> {
    match c {
        '0' => Some('O'),
        '1' => Some('I'),
        '2' => Some('Z'),
        '3' => Some('J'),
        '4' => Some('A'),
        '5' => Some('S'),
        '6' => Some('G'),
        '8' => Some('B'),
        _ => None,
    }
}

fn reader_letter_to_digit(c: char) -> Option<char> {
    match c {
        'O' => Some('0'),
        'I' => Some('1'),
        'Z' => Some('2'),
        'J' => Some('3'),
        'A' => Some('4'),
        'S' => Some('5'),
        'G' => Some('6'),
        'T' => Some('7'),
        'B' => Some('8'),
        _ => None,
    }
}

/// Reader-side cleanup: drop non-alphanumerics, uppercase, and positionally
/// correct length-7 text against the LLNNLLL layout. Other lengths pass
/// through untouched.
pub fn format_license(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase();

    let mut chars: Vec<char> = cleaned.chars().collect();
    if chars.len() != 7 {
        return cleaned;
    }

    for i in [0usize, 1, 4, 5, 6] {
        if let Some(fixed) = reader_digit_to_letter(chars[i]) {
            chars[i] = fixed;
        }
    }
    for i in [2usize, 3] {
        if let Some(fixed) = reader_letter_to_digit(chars[i]) {
            chars[i] = fixed;
        }
    }
    chars.into_iter().collect()
}

/// Wraps any reader with the confidence gate and the optional logic layer.
pub struct LogicReader<R> {
    inner: R,
    logic_layer: bool,
    min_confidence: f32,
}

impl<R: OcrReader> LogicReader<R> {
    pub fn new(inner: R, logic_layer: bool, min_confidence: f32) -> Self {
        Self {
            inner,
            logic_layer,
            min_confidence,
        }
    }
}

impl<R: OcrReader> OcrReader for LogicReader<R> {
    fn read_text(&mut self, plate_crop: &Frame) -> Result<Vec<OcrCandidate>> {
        let mut candidates = Vec::new();
        for candidate in self.inner.read_text(plate_crop)? {
            if candidate.confidence <= self.min_confidence {
                continue;
            }
            let text = if self.logic_layer {
                format_license(&candidate.text)
            } else {
                candidate.text
            };
            candidates.push(OcrCandidate {
                text,
                confidence: candidate.confidence,
            });
        }
        Ok(candidates)
    }
}

/// CTC recognition model over a fixed-size plate crop.
pub struct CtcRecognizer {
    session: Session,
    charset: Vec<char>,
}

impl CtcRecognizer {
    pub fn new(model_path: &str, num_threads: usize) -> Result<Self> {
        info!("Loading recognition model: {}", model_path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_threads)?
            .commit_from_file(model_path)?;

        Ok(Self {
            session,
            charset: REC_CHARSET.chars().collect(),
        })
    }

    /// Resize to the recognition input size and normalize to [-1, 1], CHW.
    fn preprocess(&self, plate_crop: &Frame) -> Vec<f32> {
        let resized = resize_bilinear(plate_crop, REC_INPUT_WIDTH, REC_INPUT_HEIGHT);
        let mut input = vec![0.0f32; 3 * REC_INPUT_HEIGHT * REC_INPUT_WIDTH];
        for c in 0..3 {
            for h in 0..REC_INPUT_HEIGHT {
                for w in 0..REC_INPUT_WIDTH {
                    let hwc_idx = (h * REC_INPUT_WIDTH + w) * 3 + c;
                    let chw_idx = c * REC_INPUT_HEIGHT * REC_INPUT_WIDTH + h * REC_INPUT_WIDTH + w;
                    input[chw_idx] = (resized[hwc_idx] as f32 / 255.0 - 0.5) / 0.5;
                }
            }
        }
        input
    }
}

impl OcrReader for CtcRecognizer {
    fn read_text(&mut self, plate_crop: &Frame) -> Result<Vec<OcrCandidate>> {
        if plate_crop.is_empty() {
            return Ok(Vec::new());
        }

        let input = self.preprocess(plate_crop);
        let shape = [1, 3, REC_INPUT_HEIGHT, REC_INPUT_WIDTH];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["x" => input_value])?;
        let (tensor_shape, probs) = outputs[0].try_extract_tensor::<f32>()?;

        // Output is [1, T, C] with C = charset length + 1 for the blank.
        let dims: Vec<usize> = tensor_shape.iter().map(|d| *d as usize).collect();
        if dims.len() != 3 {
            anyhow::bail!("unexpected recognition output rank {}", dims.len());
        }
        let (timesteps, classes) = (dims[1], dims[2]);

        Ok(ctc_greedy_decode(probs, timesteps, classes, &self.charset)
            .into_iter()
            .collect())
    }
}

/// Greedy CTC decode: per-timestep argmax, collapse repeats, drop blanks
/// (class 0). Confidence is the mean probability of the emitted characters.
/// Returns None when nothing but blanks was emitted.
pub fn ctc_greedy_decode(
    probs: &[f32],
    timesteps: usize,
    classes: usize,
    charset: &[char],
) -> Option<OcrCandidate> {
    let mut text = String::new();
    let mut confidences = Vec::new();
    let mut prev_class = 0usize;

    for t in 0..timesteps {
        let row = &probs[t * classes..(t + 1) * classes];
        let (best_class, best_prob) = row
            .iter()
            .enumerate()
            .fold((0usize, f32::MIN), |(bi, bp), (i, &p)| {
                if p > bp {
                    (i, p)
                } else {
                    (bi, bp)
                }
            });

        if best_class != 0 && best_class != prev_class {
            if let Some(&c) = charset.get(best_class - 1) {
                text.push(c);
                confidences.push(best_prob);
            }
        }
        prev_class = best_class;
    }

    if text.is_empty() {
        return None;
    }
    let confidence = confidences.iter().sum::<f32>() / confidences.len() as f32;
    Some(OcrCandidate { text, confidence })
}
