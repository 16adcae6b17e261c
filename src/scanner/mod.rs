pub mod filename;

use crate::annotation::AnnotationOrigin;
use crate::db::models::{Experimenter, Mouse, Session, SessionKey, SessionMetadata, Sex};
use crate::db::{Database, DbError, InsertMode, Persistence};
use crate::pose::PoseOrigin;
use filename::{parse_session_name, ParsedName};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Cannot read directory {path}: {message}")]
    Walk { path: String, message: String },
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Model {0} is not registered")]
    UnknownModel(i64),
}

/// A label file and a pose file recorded in the same session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionFiles {
    pub name: ParsedName,
    pub label_path: PathBuf,
    pub pose_path: PathBuf,
}

/// Outcome of matching label files to pose files by mouse and session time.
#[derive(Debug, Default)]
pub struct Pairing {
    pub pairs: Vec<SessionFiles>,
    pub unmatched_labels: Vec<PathBuf>,
    pub unmatched_poses: Vec<PathBuf>,
    /// Files whose names do not follow the session naming pattern.
    pub unparsed: Vec<PathBuf>,
}

/// Defaults applied to every session planned in one import.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub label_origin: AnnotationOrigin,
    pub fps: u32,
    pub experimenter: Experimenter,
    pub model_id: i64,
    pub genotype: String,
    pub sex: Sex,
}

/// Sessions ready to insert, plus pairs that already have a session row.
#[derive(Debug, Default)]
pub struct SessionPlan {
    pub sessions: Vec<SessionMetadata>,
    pub existing: Vec<(SessionFiles, SessionKey)>,
}

pub struct RegisterResult {
    pub inserted: u64,
    pub failed: u64,
}

/// Collect files under `dir` with one of `extensions`, sorted by path.
pub fn collect_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, ScanError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| ScanError::Walk {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        if extensions.contains(&ext.as_str()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Match label and pose files by the mouse id and session time in their names.
pub fn pair_files(labels: &[PathBuf], poses: &[PathBuf]) -> Pairing {
    let mut pairing = Pairing::default();

    let mut pose_by_name: HashMap<ParsedName, PathBuf> = HashMap::new();
    for path in poses {
        match parse_session_name(path) {
            Some(name) => {
                if let Some(prev) = pose_by_name.insert(name, path.clone()) {
                    log::warn!("Two pose files for one session: {} and {}", prev.display(), path.display());
                    pairing.unmatched_poses.push(prev);
                }
            }
            None => pairing.unparsed.push(path.clone()),
        }
    }

    let mut seen: HashMap<ParsedName, PathBuf> = HashMap::new();
    for path in labels {
        let Some(name) = parse_session_name(path) else {
            pairing.unparsed.push(path.clone());
            continue;
        };
        if let Some(prev) = seen.get(&name) {
            log::warn!("Two label files for one session: {} and {}", prev.display(), path.display());
            pairing.unmatched_labels.push(path.clone());
            continue;
        }
        match pose_by_name.remove(&name) {
            Some(pose_path) => {
                seen.insert(name.clone(), path.clone());
                pairing.pairs.push(SessionFiles {
                    name,
                    label_path: path.clone(),
                    pose_path,
                });
            }
            None => pairing.unmatched_labels.push(path.clone()),
        }
    }

    pairing.unmatched_poses.extend(pose_by_name.into_values());
    pairing.unmatched_poses.sort();
    pairing.pairs.sort_by(|a, b| a.name.cmp(&b.name));
    pairing
}

/// Walk both directories and pair their files. The pose origin decides which
/// pose file extensions are picked up.
pub fn scan_directories(label_dir: &Path, pose_dir: &Path, pose_origin: PoseOrigin) -> Result<Pairing, ScanError> {
    let labels = collect_files(label_dir, crate::LABEL_EXTENSIONS)?;
    let poses = collect_files(pose_dir, pose_origin.extensions())?;
    log::info!(
        "Found {} label files in {} and {} pose files in {}",
        labels.len(),
        label_dir.display(),
        poses.len(),
        pose_dir.display()
    );
    Ok(pair_files(&labels, &poses))
}

/// Assign session ids to paired files. Ids continue after the largest id already stored
/// for each mouse, in chronological order. Pairs that already have a session row at the
/// same time are listed in `existing` and not planned again.
pub fn plan_sessions(db: &Database, pairs: &[SessionFiles], opts: &ImportOptions) -> Result<SessionPlan, ScanError> {
    if db.get_model(opts.model_id)?.is_none() {
        return Err(ScanError::UnknownModel(opts.model_id));
    }

    let mut plan = SessionPlan::default();
    let mut next_ids: BTreeMap<i64, i64> = BTreeMap::new();

    let mut sorted: Vec<&SessionFiles> = pairs.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    for files in sorted {
        let mouse_id = files.name.mouse_id;
        if let Some(key) = db.find_session_at(mouse_id, files.name.session_time)? {
            plan.existing.push((files.clone(), key));
            continue;
        }

        let session_id = match next_ids.entry(mouse_id) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(db.next_session_id(mouse_id)?),
        };
        let key = SessionKey {
            mouse_id,
            session_id: *session_id,
        };
        *session_id += 1;

        plan.sessions.push(SessionMetadata {
            mouse: Mouse {
                mouse_id,
                dob: None,
                sex: opts.sex,
                genotype: opts.genotype.clone(),
            },
            experimenter: opts.experimenter.clone(),
            session: Session {
                key,
                session_time: files.name.session_time,
                experimenter_id: opts.experimenter.experimenter_id,
                video_path: None,
                video_fps: opts.fps,
                pose_path: files.pose_path.to_string_lossy().to_string(),
                pose_model_id: opts.model_id,
                annotation_path: files.label_path.to_string_lossy().to_string(),
                annotation_origin: opts.label_origin.to_string(),
            },
        });
    }

    Ok(plan)
}

/// Insert planned sessions. A failing session is logged and does not stop the rest.
pub fn register_sessions<P: Persistence>(db: &P, sessions: &[SessionMetadata], mode: InsertMode) -> RegisterResult {
    let mut result = RegisterResult { inserted: 0, failed: 0 };
    for meta in sessions {
        match db.insert_session_metadata(meta, mode) {
            Ok(()) => {
                log::info!("Registered {} ({})", meta.session.key, meta.session.session_time);
                result.inserted += 1;
            }
            Err(e) => {
                log::warn!("Failed to register {}: {}", meta.session.key, e);
                result.failed += 1;
            }
        }
    }
    result
}
