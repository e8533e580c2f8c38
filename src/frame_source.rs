// src/frame_source.rs
//
// Frame input seam. Decoding video is a collaborator concern; the one
// concrete source here walks a directory of P6 PPM frames (as dumped by
// ffmpeg) in name order, which is enough to run the full pipeline offline.

use crate::types::Frame;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use walkdir::WalkDir;

pub trait FrameSource {
    /// Next frame in the stream, or None when the stream ends.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

pub struct PpmDirectorySource {
    files: Vec<PathBuf>,
    index: usize,
}

impl PpmDirectorySource {
    pub fn new(input_dir: &str) -> Result<Self> {
        let mut files: Vec<PathBuf> = WalkDir::new(input_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("ppm"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            bail!("no .ppm frames found under {input_dir}");
        }
        info!("found {} frames in {}", files.len(), input_dir);
        Ok(Self { files, index: 0 })
    }
}

impl FrameSource for PpmDirectorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.index) else {
            return Ok(None);
        };
        self.index += 1;

        let bytes =
            fs::read(path).with_context(|| format!("reading frame {}", path.display()))?;
        let frame = parse_ppm(&bytes).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(frame))
    }
}

/// Parse a binary (P6) PPM image into an RGB frame. Header comments are
/// skipped; only maxval 255 is supported.
pub fn parse_ppm(bytes: &[u8]) -> Result<Frame> {
    let mut pos = 0usize;

    let mut next_token = |bytes: &[u8]| -> Result<String> {
        // Skip whitespace and '#' comments that run to end of line.
        loop {
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos < bytes.len() && bytes[pos] == b'#' {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
                continue;
            }
            break;
        }
        let start = pos;
        while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if start == pos {
            bail!("truncated PPM header");
        }
        Ok(String::from_utf8_lossy(&bytes[start..pos]).into_owned())
    };

    let magic = next_token(bytes)?;
    if magic != "P6" {
        bail!("unsupported PPM magic {magic:?}");
    }
    let width: usize = next_token(bytes)?.parse().context("PPM width")?;
    let height: usize = next_token(bytes)?.parse().context("PPM height")?;
    let maxval: usize = next_token(bytes)?.parse().context("PPM maxval")?;
    if maxval != 255 {
        bail!("unsupported PPM maxval {maxval}");
    }

    // Exactly one whitespace byte separates the header from pixel data.
    pos += 1;
    let expected = width * height * 3;
    let data = bytes
        .get(pos..pos + expected)
        .context("PPM pixel data shorter than header promises")?;

    Ok(Frame::new(data.to_vec(), width, height))
}
