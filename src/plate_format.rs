// src/plate_format.rs
//
// Plate text normalization and format validation.
//
// UK plates (2001+ format) are seven characters: two letters, two digits,
// three letters, displayed as "LLNN LLL". OCR engines routinely confuse
// glyphs across the letter/digit boundary (0/O, 1/I, 8/B, 5/S, ...), so the
// normalizer fixes those by expected position before validating.

use crate::types::FormatConfig;
use once_cell::sync::Lazy;
use regex::Regex;

static UK_PLATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z]{2}[0-9]{2}\s?[A-Z]{3}$").expect("invalid UK plate pattern")
});

/// Positions expected to hold letters in the LLNNLLL layout.
const LETTER_POSITIONS: [usize; 5] = [0, 1, 4, 5, 6];
/// Positions expected to hold digits.
const DIGIT_POSITIONS: [usize; 2] = [2, 3];

fn digit_to_letter(c: char) -> Option<char> {
    match c {
        '0' => Some('O'),
        '1' => Some('I'),
        '8' => Some('B'),
        _ => None,
    }
}

fn letter_to_digit(c: char) -> Option<char> {
    match c {
        'O' | 'Q' => Some('0'),
        'I' | 'L' => Some('1'),
        'Z' => Some('2'),
        'B' => Some('8'),
        'S' => Some('5'),
        _ => None,
    }
}

/// Insert the display space after the fourth character: "AB12CDE" -> "AB12 CDE".
fn format_with_space(text: &str) -> String {
    let head: String = text.chars().take(4).collect();
    let tail: String = text.chars().skip(4).collect();
    format!("{head} {tail}")
}

pub struct PlateNormalizer {
    config: FormatConfig,
}

impl PlateNormalizer {
    pub fn new(config: FormatConfig) -> Self {
        Self { config }
    }

    /// Normalize one raw OCR string and decide whether it is a reportable
    /// plate. Returns the canonical text, or `None` when the read is
    /// rejected (only possible with `strict_regex` on).
    ///
    /// Steps: strip whitespace and uppercase; positionally correct confused
    /// glyphs when the result is exactly seven characters; then either
    /// enforce the UK pattern or fall back to format-if-length-7.
    pub fn validate_and_clean(&self, raw: &str) -> Option<String> {
        let mut text: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();

        // Positional correction is a single pass and never changes length.
        // It only applies to text that already has the LLNNLLL shape.
        if self.config.char_correction && text.chars().count() == 7 {
            let mut chars: Vec<char> = text.chars().collect();
            for &i in &LETTER_POSITIONS {
                if let Some(fixed) = digit_to_letter(chars[i]) {
                    chars[i] = fixed;
                }
            }
            for &i in &DIGIT_POSITIONS {
                if let Some(fixed) = letter_to_digit(chars[i]) {
                    chars[i] = fixed;
                }
            }
            text = chars.into_iter().collect();
        }

        if self.config.strict_regex {
            if UK_PLATE_REGEX.is_match(&text) {
                Some(format_with_space(&text))
            } else {
                None
            }
        } else if text.chars().count() == 7 {
            // No validation enforced; still present length-7 text canonically.
            Some(format_with_space(&text))
        } else {
            Some(text)
        }
    }
}
