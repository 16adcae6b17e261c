pub mod asoid;
pub mod boris;

use crate::normalize::{self, NormalizeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

pub use asoid::AsoidAdapter;
pub use boris::BorisAdapter;

/// Label given to frames that no annotated interval covers.
pub const DEFAULT_BACKGROUND_LABEL: &str = "none";

/// Labeling tool that produced an annotation file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationOrigin {
    Boris,
    Asoid,
}

impl AnnotationOrigin {
    pub const ALL: [AnnotationOrigin; 2] = [Self::Boris, Self::Asoid];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boris => "BORIS",
            Self::Asoid => "A-SOiD",
        }
    }

    fn adapter(&self) -> &'static dyn AnnotationAdapter {
        match self {
            Self::Boris => &BorisAdapter,
            Self::Asoid => &AsoidAdapter,
        }
    }
}

impl fmt::Display for AnnotationOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AnnotationOrigin {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "boris" => Ok(Self::Boris),
            "a-soid" | "asoid" => Ok(Self::Asoid),
            _ => Err(NormalizeError::UnsupportedOrigin(s.to_string())),
        }
    }
}

/// A labeled run of frames, `start..end` (end exclusive).
#[derive(Debug, Clone, PartialEq)]
pub struct LabelInterval {
    pub label: String,
    pub start: usize,
    pub end: usize,
}

/// Intermediate form produced by an origin adapter before densification.
#[derive(Debug, Default)]
pub struct ParsedAnnotation {
    /// Intervals in source-file order.
    pub intervals: Vec<LabelInterval>,
    /// Total frame count of the session.
    pub frame_count: usize,
}

/// Parses one labeling tool's export into frame intervals.
pub trait AnnotationAdapter {
    fn parse(&self, reader: &mut dyn Read, fps: u32) -> Result<ParsedAnnotation>;
}

/// Dense per-frame behavior labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSequence {
    labels: Vec<String>,
}

impl LabelSequence {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Expand intervals over `frame_count` frames. Later intervals overwrite earlier
    /// ones where they overlap; uncovered frames get `background`.
    pub fn from_intervals(intervals: &[LabelInterval], frame_count: usize, background: &str) -> Self {
        let mut labels = vec![background.to_string(); frame_count];
        for iv in intervals {
            let end = iv.end.min(frame_count);
            if iv.start >= end {
                log::debug!(
                    "Dropping interval {:?} [{}, {}) outside {} frames",
                    iv.label, iv.start, iv.end, frame_count
                );
                continue;
            }
            for slot in &mut labels[iv.start..end] {
                slot.clone_from(&iv.label);
            }
        }
        Self { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Distinct labels, sorted.
    pub fn label_set(&self) -> BTreeSet<String> {
        self.labels.iter().cloned().collect()
    }

    /// Frame count per label, sorted by label.
    pub fn counts(&self) -> BTreeMap<&str, u64> {
        let mut counts = BTreeMap::new();
        for label in &self.labels {
            *counts.entry(label.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// Normalized output of one annotation file.
#[derive(Debug, Clone)]
pub struct NormalizedAnnotation {
    pub sequence: LabelSequence,
    pub label_set: BTreeSet<String>,
}

impl NormalizedAnnotation {
    /// Label set joined for storage.
    pub fn unique_labels_string(&self) -> String {
        join_labels(&self.label_set)
    }
}

pub fn join_labels<'a>(labels: impl IntoIterator<Item = &'a String>) -> String {
    labels.into_iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Parse an annotation stream from the given origin.
pub fn normalize_reader(
    reader: &mut dyn Read,
    origin: AnnotationOrigin,
    fps: u32,
    background: &str,
) -> Result<NormalizedAnnotation> {
    if fps == 0 {
        return Err(NormalizeError::MissingParameter("fps"));
    }
    let parsed = origin.adapter().parse(reader, fps)?;
    let sequence = LabelSequence::from_intervals(&parsed.intervals, parsed.frame_count, background);
    let label_set = sequence.label_set();
    Ok(NormalizedAnnotation { sequence, label_set })
}

/// Parse an annotation file from the given origin.
pub fn normalize_file(
    path: &Path,
    origin: AnnotationOrigin,
    fps: u32,
    background: &str,
) -> Result<NormalizedAnnotation> {
    if fps == 0 {
        return Err(NormalizeError::MissingParameter("fps"));
    }
    let mut file = normalize::open(path)?;
    let annotation = normalize_reader(&mut file, origin, fps, background).map_err(|e| e.with_path(path))?;
    log::debug!(
        "{}: {} frames, labels [{}]",
        path.display(),
        annotation.sequence.len(),
        annotation.unique_labels_string()
    );
    Ok(annotation)
}

/// Find a header column by name, ignoring case.
pub(crate) fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
}
