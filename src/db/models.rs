use crate::annotation::LabelSequence;
use crate::pose::PoseSequence;
use crate::stats::BehaviorStat;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Storage format for `sessions.session_time`.
pub const SESSION_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Storage format for date columns.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for Sex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "M" | "m" => Ok(Self::Male),
            "F" | "f" => Ok(Self::Female),
            "unknown" | "" => Ok(Self::Unknown),
            other => Err(format!("invalid sex {other:?} (expected M, F or unknown)")),
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Experimental animal.
#[derive(Debug, Clone, PartialEq)]
pub struct Mouse {
    pub mouse_id: i64,
    pub dob: Option<NaiveDate>,
    pub sex: Sex,
    pub genotype: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Experimenter {
    pub experimenter_id: i64,
    pub name: Option<String>,
    pub sex: Sex,
}

/// Pose-estimation model; its `origin` decides how a session's pose file is read.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub model_id: i64,
    pub name: String,
    /// Model architecture, e.g. `SingleInstance`.
    pub model_type: String,
    pub origin: String,
    pub training_date: NaiveDate,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub mouse_id: i64,
    pub session_id: i64,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mouse {} session {}", self.mouse_id, self.session_id)
    }
}

/// One recording: links a mouse, experimenter, model and the two source files.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub key: SessionKey,
    pub session_time: NaiveDateTime,
    pub experimenter_id: i64,
    pub video_path: Option<String>,
    pub video_fps: u32,
    pub pose_path: String,
    pub pose_model_id: i64,
    pub annotation_path: String,
    pub annotation_origin: String,
}

/// Everything inserted before a session's files are imported.
#[derive(Debug, Clone)]
pub struct SessionMetadata {
    pub mouse: Mouse,
    pub experimenter: Experimenter,
    pub session: Session,
}

/// A session row joined with its import state.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub session: Session,
    pub has_annotation: bool,
    pub has_pose: bool,
}

/// Annotation row read back from the database.
#[derive(Debug, Clone)]
pub struct StoredAnnotation {
    pub key: SessionKey,
    pub experimenter_id: i64,
    pub sequence: LabelSequence,
    pub unique_labels: String,
}

/// Pose row read back from the database.
#[derive(Debug, Clone)]
pub struct StoredPose {
    pub key: SessionKey,
    pub experimenter_id: i64,
    pub model_id: i64,
    pub keypoints: String,
    pub pose: PoseSequence,
}

/// Behavior stat joined with its session.
#[derive(Debug, Clone)]
pub struct SessionBehaviorStat {
    pub key: SessionKey,
    pub stat: BehaviorStat,
}
