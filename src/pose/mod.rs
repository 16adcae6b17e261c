pub mod dlc;
pub mod sleap;

use crate::normalize::{NormalizeError, Result, STREAM};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use dlc::DlcAdapter;
pub use sleap::SleapAdapter;

/// Values stored per body part per frame: x, y, confidence.
pub const VALUES_PER_POINT: usize = 3;

/// Keypoint-tracking tool that produced a pose file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoseOrigin {
    Sleap,
    Dlc,
}

impl PoseOrigin {
    pub const ALL: [PoseOrigin; 2] = [Self::Sleap, Self::Dlc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sleap => "SLEAP",
            Self::Dlc => "DLC",
        }
    }

    /// File extensions accepted for this origin during folder import.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Sleap => &["h5", "hdf5", "csv"],
            Self::Dlc => &["csv"],
        }
    }

    fn adapter(&self) -> &'static dyn PoseAdapter {
        match self {
            Self::Sleap => &SleapAdapter,
            Self::Dlc => &DlcAdapter,
        }
    }
}

impl fmt::Display for PoseOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PoseOrigin {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sleap" => Ok(Self::Sleap),
            "dlc" | "deeplabcut" => Ok(Self::Dlc),
            _ => Err(NormalizeError::UnsupportedOrigin(s.to_string())),
        }
    }
}

/// Loads one tracking tool's export into a [`PoseSequence`].
pub trait PoseAdapter {
    fn load(&self, path: &Path) -> Result<PoseSequence>;
}

/// Position and confidence of one body part in one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseFrame {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

impl PoseFrame {
    pub const MISSING: PoseFrame = PoseFrame {
        x: f64::NAN,
        y: f64::NAN,
        confidence: f64::NAN,
    };

    pub fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self { x, y, confidence }
    }
}

/// Pose data for one tracked animal, stored as a row-major (frames, parts, 3) array.
#[derive(Debug, Clone)]
pub struct PoseSequence {
    body_parts: Vec<String>,
    frame_count: usize,
    data: Vec<f64>,
}

/// Joins body-part names in the stored `body_parts` column.
pub const PART_SEPARATOR: &str = ", ";

/// Stored names are split on [`PART_SEPARATOR`], so no name may contain it.
fn check_part_names(body_parts: &[String]) -> Result<()> {
    match body_parts.iter().find(|name| name.contains(PART_SEPARATOR)) {
        Some(name) => Err(NormalizeError::malformed(
            STREAM,
            format!("body part {name:?} contains {PART_SEPARATOR:?}"),
        )),
        None => Ok(()),
    }
}

impl PoseSequence {
    /// Wrap a flat (frames, parts, 3) array.
    pub fn from_flat(body_parts: Vec<String>, frame_count: usize, data: Vec<f64>) -> Result<Self> {
        check_part_names(&body_parts)?;
        let expected = frame_count * body_parts.len() * VALUES_PER_POINT;
        if data.len() != expected {
            return Err(NormalizeError::malformed(
                STREAM,
                format!(
                    "pose array has {} values, expected {frame_count}x{}x{VALUES_PER_POINT} = {expected}",
                    data.len(),
                    body_parts.len()
                ),
            ));
        }
        Ok(Self { body_parts, frame_count, data })
    }

    /// Build from per-frame rows. Every row must have one entry per body part.
    pub fn from_frames(body_parts: Vec<String>, frames: &[Vec<PoseFrame>]) -> Result<Self> {
        check_part_names(&body_parts)?;
        let mut data = Vec::with_capacity(frames.len() * body_parts.len() * VALUES_PER_POINT);
        for (i, frame) in frames.iter().enumerate() {
            if frame.len() != body_parts.len() {
                return Err(NormalizeError::malformed(
                    STREAM,
                    format!("frame {i} has {} body parts, expected {}", frame.len(), body_parts.len()),
                ));
            }
            for p in frame {
                data.extend_from_slice(&[p.x, p.y, p.confidence]);
            }
        }
        Ok(Self {
            body_parts,
            frame_count: frames.len(),
            data,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn body_parts(&self) -> &[String] {
        &self.body_parts
    }

    /// (frames, parts, 3)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.frame_count, self.body_parts.len(), VALUES_PER_POINT)
    }

    pub fn get(&self, frame: usize, part: usize) -> Option<PoseFrame> {
        if frame >= self.frame_count || part >= self.body_parts.len() {
            return None;
        }
        let i = (frame * self.body_parts.len() + part) * VALUES_PER_POINT;
        Some(PoseFrame::new(self.data[i], self.data[i + 1], self.data[i + 2]))
    }

    /// All body parts of one frame, keyed by name in file order.
    pub fn frame(&self, frame: usize) -> Option<Vec<(&str, PoseFrame)>> {
        if frame >= self.frame_count {
            return None;
        }
        Some(
            self.body_parts
                .iter()
                .enumerate()
                .filter_map(|(p, name)| self.get(frame, p).map(|pf| (name.as_str(), pf)))
                .collect(),
        )
    }

    pub fn as_flat(&self) -> &[f64] {
        &self.data
    }

    /// Body-part list joined for storage.
    pub fn body_parts_string(&self) -> String {
        self.body_parts.join(PART_SEPARATOR)
    }

    /// Encode the flat array as little-endian f64 bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.data.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Decode an array written by [`PoseSequence::to_le_bytes`].
    pub fn from_le_bytes(body_parts: Vec<String>, frame_count: usize, bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 8 != 0 {
            return Err(NormalizeError::malformed(
                STREAM,
                format!("pose blob length {} is not a multiple of 8", bytes.len()),
            ));
        }
        let data = bytes
            .chunks_exact(8)
            .map(|c| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(c);
                f64::from_le_bytes(buf)
            })
            .collect();
        Self::from_flat(body_parts, frame_count, data)
    }
}

/// Load a pose file from the given origin.
pub fn normalize_file(path: &Path, origin: PoseOrigin) -> Result<PoseSequence> {
    let pose = origin.adapter().load(path).map_err(|e| e.with_path(path))?;
    log::debug!(
        "{}: {} frames, body parts [{}]",
        path.display(),
        pose.frame_count(),
        pose.body_parts_string()
    );
    Ok(pose)
}

/// Record the column of each coordinate for one body part while reading a header.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PartColumns {
    pub x: Option<usize>,
    pub y: Option<usize>,
    pub confidence: Option<usize>,
}

impl PartColumns {
    pub(crate) fn set(&mut self, coord: Coord, column: usize, part: &str) -> Result<()> {
        let slot = match coord {
            Coord::X => &mut self.x,
            Coord::Y => &mut self.y,
            Coord::Confidence => &mut self.confidence,
        };
        if slot.is_some() {
            return Err(NormalizeError::malformed(
                STREAM,
                format!("body part {part:?} has a duplicate {coord:?} column"),
            ));
        }
        *slot = Some(column);
        Ok(())
    }

    pub(crate) fn complete(&self, part: &str) -> Result<(usize, usize, usize)> {
        match (self.x, self.y, self.confidence) {
            (Some(x), Some(y), Some(c)) => Ok((x, y, c)),
            _ => Err(NormalizeError::malformed(
                STREAM,
                format!("body part {part:?} is missing x, y or confidence columns"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Coord {
    X,
    Y,
    Confidence,
}
