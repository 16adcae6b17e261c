//! Shared error type and CSV helpers for the annotation and pose normalizers.

use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Unsupported origin: {0}")]
    UnsupportedOrigin(String),
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("{path} contains {instances} tracked instances; only single-instance files are supported")]
    MultiInstanceUnsupported { path: String, instances: usize },
    #[error("Malformed file {path}: {message}")]
    MalformedFile { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, NormalizeError>;

impl NormalizeError {
    pub(crate) fn malformed(path: &str, message: impl Into<String>) -> Self {
        Self::MalformedFile {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Attach a path to a malformed-file error raised by a reader that only saw a stream.
    pub(crate) fn with_path(self, path: &Path) -> Self {
        match self {
            Self::MalformedFile { message, .. } => Self::MalformedFile {
                path: path.display().to_string(),
                message,
            },
            Self::MultiInstanceUnsupported { instances, .. } => Self::MultiInstanceUnsupported {
                path: path.display().to_string(),
                instances,
            },
            other => other,
        }
    }
}

/// Name used in errors for readers that are not backed by a file.
pub(crate) const STREAM: &str = "<stream>";

/// Open a file for one of the CSV-based parsers.
pub(crate) fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| NormalizeError::malformed(&path.display().to_string(), e.to_string()))
}

/// Build a CSV reader that tolerates ragged rows; width checks are done by the parsers.
pub(crate) fn csv_reader<R: std::io::Read>(reader: R, has_headers: bool) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

pub(crate) fn csv_error(e: csv::Error) -> NormalizeError {
    let message = match e.position() {
        Some(pos) => format!("line {}: {}", pos.line(), e),
        None => e.to_string(),
    };
    NormalizeError::malformed(STREAM, message)
}

/// Parse a numeric cell. Empty cells and `nan` map to NaN.
pub(crate) fn parse_f64(cell: &str, line: u64, column: &str) -> Result<f64> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>().map_err(|_| {
        NormalizeError::malformed(
            STREAM,
            format!("line {line}: column {column:?} has non-numeric value {cell:?}"),
        )
    })
}

/// Largest frame index or frame count a session may have; about 25 days at 30 fps.
pub const MAX_FRAMES: usize = 1 << 26;

/// Reject a frame index or count past [`MAX_FRAMES`].
pub(crate) fn check_frame(frame: usize, line: u64, column: &str) -> Result<usize> {
    if frame > MAX_FRAMES {
        return Err(NormalizeError::malformed(
            STREAM,
            format!("line {line}: column {column:?} is past the {MAX_FRAMES}-frame limit"),
        ));
    }
    Ok(frame)
}

// Float-to-int casts saturate, so infinities land past the limit
fn frames_from(frames: f64, line: u64, column: &str) -> Result<usize> {
    check_frame(frames.max(0.0) as usize, line, column)
}

/// Convert a time in seconds to the nearest frame index.
pub(crate) fn seconds_to_frame(seconds: f64, fps: u32, line: u64, column: &str) -> Result<usize> {
    frames_from((seconds * fps as f64).round(), line, column)
}

/// Number of frames needed to cover a duration in seconds.
pub(crate) fn duration_to_frames(seconds: f64, fps: u32, line: u64, column: &str) -> Result<usize> {
    frames_from((seconds * fps as f64).ceil(), line, column)
}
