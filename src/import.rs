use crate::annotation::{self, AnnotationOrigin, NormalizedAnnotation};
use crate::db::models::{Model, SessionKey, SessionStatus};
use crate::db::{DbError, InsertMode, Persistence};
use crate::normalize::NormalizeError;
use crate::pose::{self, PoseOrigin, PoseSequence};
use crate::stats::{self, BehaviorStat, StatsError};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("Model {model_id} used by {key} is not registered")]
    UnknownModel { key: SessionKey, model_id: i64 },
}

/// Options shared by every session in one populate run.
#[derive(Debug, Clone)]
pub struct PopulateOptions {
    pub background_label: String,
    pub mode: InsertMode,
}

impl Default for PopulateOptions {
    fn default() -> Self {
        Self {
            background_label: annotation::DEFAULT_BACKGROUND_LABEL.to_string(),
            mode: InsertMode::Strict,
        }
    }
}

pub struct PopulateResult {
    pub imported: u64,
    pub failed: u64,
}

/// Parsed contents of one session, ready to store.
#[derive(Debug)]
pub struct PreparedSession {
    pub key: SessionKey,
    pub experimenter_id: i64,
    pub annotation: Option<(NormalizedAnnotation, Vec<BehaviorStat>)>,
    pub pose: Option<(i64, PoseSequence)>,
}

/// Normalize a session's annotation file and compute its stats.
///
/// An annotation with no frames is kept with zero stats rows.
pub fn prepare_annotation(
    path: &Path,
    origin: &str,
    fps: u32,
    background: &str,
) -> Result<(NormalizedAnnotation, Vec<BehaviorStat>), ImportError> {
    let origin: AnnotationOrigin = origin.parse()?;
    let annotation = annotation::normalize_file(path, origin, fps, background)?;
    let rows = match stats::compute_stats(&annotation.sequence, fps) {
        Ok(rows) => rows,
        Err(StatsError::DivisionGuard) => {
            log::warn!("{} has no frames; storing it without behavior stats", path.display());
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };
    Ok((annotation, rows))
}

/// Read whatever the session is still missing. Nothing is written here.
pub fn prepare_session(
    status: &SessionStatus,
    model: Option<&Model>,
    background: &str,
) -> Result<PreparedSession, ImportError> {
    let session = &status.session;

    let annotation = if status.has_annotation {
        None
    } else {
        Some(prepare_annotation(
            Path::new(&session.annotation_path),
            &session.annotation_origin,
            session.video_fps,
            background,
        )?)
    };

    let pose = if status.has_pose {
        None
    } else {
        let model = model.ok_or(ImportError::UnknownModel {
            key: session.key,
            model_id: session.pose_model_id,
        })?;
        let origin: PoseOrigin = model.origin.parse()?;
        let pose = pose::normalize_file(Path::new(&session.pose_path), origin)?;
        Some((model.model_id, pose))
    };

    Ok(PreparedSession {
        key: session.key,
        experimenter_id: session.experimenter_id,
        annotation,
        pose,
    })
}

/// Write a prepared session. The annotation and its stats go in together.
pub fn store_session<P: Persistence>(db: &P, prepared: &PreparedSession, mode: InsertMode) -> Result<(), ImportError> {
    if let Some((annotation, rows)) = &prepared.annotation {
        db.store_annotation(&prepared.key, prepared.experimenter_id, annotation, rows, mode)?;
    }
    if let Some((model_id, pose)) = &prepared.pose {
        db.insert_pose(&prepared.key, prepared.experimenter_id, *model_id, pose, mode)?;
    }
    Ok(())
}

/// Import annotation and pose data for every session still missing one of them.
///
/// Sessions are handled one at a time. A session that fails is logged and counted;
/// the batch keeps going.
pub fn populate<P: Persistence>(db: &P, opts: &PopulateOptions) -> Result<PopulateResult, ImportError> {
    let pending = db.pending_sessions()?;
    if pending.is_empty() {
        log::info!("No sessions waiting for import");
        return Ok(PopulateResult { imported: 0, failed: 0 });
    }

    log::info!("Importing {} sessions", pending.len());

    let pb = ProgressBar::new(pending.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut models: HashMap<i64, Option<Model>> = HashMap::new();
    let mut imported: u64 = 0;
    let mut failed: u64 = 0;

    for status in &pending {
        let key = status.session.key;
        let model_id = status.session.pose_model_id;
        if !models.contains_key(&model_id) {
            models.insert(model_id, db.get_model(model_id)?);
        }
        let model = models.get(&model_id).and_then(Option::as_ref);

        let result = prepare_session(status, model, &opts.background_label)
            .and_then(|prepared| store_session(db, &prepared, opts.mode));
        match result {
            Ok(()) => {
                log::debug!("Imported {}", key);
                imported += 1;
            }
            Err(e) => {
                log::warn!("Import failed for {}: {}", key, e);
                failed += 1;
            }
        }

        pb.inc(1);
        pb.set_message(format!("{} imported, {} failed", imported, failed));
    }

    pb.finish_with_message(format!("{} imported, {} failed", imported, failed));
    Ok(PopulateResult { imported, failed })
}
