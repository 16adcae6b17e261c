use super::models::{
    Experimenter, Model, Mouse, Session, SessionBehaviorStat, SessionKey, SessionMetadata,
    SessionStatus, StoredAnnotation, StoredPose, DATE_FORMAT, SESSION_TIME_FORMAT,
};
use super::{map_duplicate, Database, DbError, InsertMode, Persistence, Result};
use crate::annotation::{LabelSequence, NormalizedAnnotation};
use crate::pose::{PoseSequence, PART_SEPARATOR};
use crate::stats::BehaviorStat;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

const SESSION_COLUMNS: &str = "s.mouse_id, s.session_id, s.session_time, s.experimenter_id, s.video_path,
     s.video_fps, s.pose_path, s.pose_model_id, s.annotation_path, s.annotation_origin";

impl Persistence for Database {
    fn insert_session_metadata(&self, meta: &SessionMetadata, mode: InsertMode) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        insert_mouse(&tx, &meta.mouse)?;
        if let Some(stored) = insert_experimenter(&tx, &meta.experimenter)? {
            log::warn!(
                "Experimenter {} is already stored as {:?}; keeping it instead of {:?}",
                stored.experimenter_id,
                stored.name.as_deref().unwrap_or(""),
                meta.experimenter.name.as_deref().unwrap_or(""),
            );
        }
        insert_session(&tx, &meta.session, mode)?;
        tx.commit()?;
        Ok(())
    }

    fn insert_model(&self, model: &Model, mode: InsertMode) -> Result<()> {
        let sql = format!(
            "INSERT INTO models (model_id, name, type, origin, training_date, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6){}",
            mode.conflict_clause()
        );
        self.conn
            .execute(
                &sql,
                params![
                    model.model_id,
                    model.name,
                    model.model_type,
                    model.origin,
                    model.training_date.format(DATE_FORMAT).to_string(),
                    model.description,
                ],
            )
            .map_err(|e| map_duplicate(e, "models", || format!("model {}", model.model_id)))?;
        Ok(())
    }

    fn insert_annotation(
        &self,
        key: &SessionKey,
        experimenter_id: i64,
        annotation: &NormalizedAnnotation,
        mode: InsertMode,
    ) -> Result<()> {
        insert_annotation_row(&self.conn, key, experimenter_id, annotation, mode)
    }

    fn insert_behavior_stats(&self, key: &SessionKey, rows: &[BehaviorStat], mode: InsertMode) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        insert_stat_rows(&tx, key, rows, mode)?;
        tx.commit()?;
        Ok(())
    }

    fn insert_pose(
        &self,
        key: &SessionKey,
        experimenter_id: i64,
        model_id: i64,
        pose: &PoseSequence,
        mode: InsertMode,
    ) -> Result<()> {
        let (frames, parts, _) = pose.shape();
        let sql = format!(
            "INSERT INTO poses (
                mouse_id, session_id, experimenter_id, model_id,
                keypoints, n_frames, n_parts, pose
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8){}",
            mode.conflict_clause()
        );
        self.conn
            .execute(
                &sql,
                params![
                    key.mouse_id,
                    key.session_id,
                    experimenter_id,
                    model_id,
                    pose.body_parts_string(),
                    frames as i64,
                    parts as i64,
                    pose.to_le_bytes(),
                ],
            )
            .map_err(|e| map_duplicate(e, "poses", || key.to_string()))?;
        Ok(())
    }

    /// Annotation and stats rows go in one transaction so a failed stats insert
    /// leaves no annotation behind.
    fn store_annotation(
        &self,
        key: &SessionKey,
        experimenter_id: i64,
        annotation: &NormalizedAnnotation,
        rows: &[BehaviorStat],
        mode: InsertMode,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        insert_annotation_row(&tx, key, experimenter_id, annotation, mode)?;
        insert_stat_rows(&tx, key, rows, mode)?;
        tx.commit()?;
        Ok(())
    }

    fn pending_sessions(&self) -> Result<Vec<SessionStatus>> {
        Ok(self
            .list_sessions()?
            .into_iter()
            .filter(|s| !s.has_annotation || !s.has_pose)
            .collect())
    }

    fn get_model(&self, model_id: i64) -> Result<Option<Model>> {
        let model = self
            .conn
            .query_row(
                "SELECT model_id, name, type, origin, training_date, description
                 FROM models WHERE model_id = ?1",
                params![model_id],
                model_from_row,
            )
            .optional()?;
        Ok(model)
    }
}

impl Database {
    /// Next free session id for a mouse (0 for a new mouse).
    pub fn next_session_id(&self, mouse_id: i64) -> Result<i64> {
        let id: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(session_id) + 1, 0) FROM sessions WHERE mouse_id = ?1",
            params![mouse_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Find an existing session recorded at the given time.
    pub fn find_session_at(&self, mouse_id: i64, session_time: NaiveDateTime) -> Result<Option<SessionKey>> {
        let key = self
            .conn
            .query_row(
                "SELECT mouse_id, session_id FROM sessions
                 WHERE mouse_id = ?1 AND session_time = ?2",
                params![mouse_id, session_time.format(SESSION_TIME_FORMAT).to_string()],
                |row| {
                    Ok(SessionKey {
                        mouse_id: row.get(0)?,
                        session_id: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(key)
    }

    /// All sessions with their import state, ordered by key.
    pub fn list_sessions(&self) -> Result<Vec<SessionStatus>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS},
                    a.mouse_id IS NOT NULL,
                    p.mouse_id IS NOT NULL
             FROM sessions s
             LEFT JOIN annotations a ON a.mouse_id = s.mouse_id AND a.session_id = s.session_id
             LEFT JOIN poses p ON p.mouse_id = s.mouse_id AND p.session_id = s.session_id
             ORDER BY s.mouse_id, s.session_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let sessions = stmt
            .query_map([], |row| {
                Ok(SessionStatus {
                    session: session_from_row(row)?,
                    has_annotation: row.get(10)?,
                    has_pose: row.get(11)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    pub fn get_session(&self, key: &SessionKey) -> Result<Option<Session>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions s WHERE s.mouse_id = ?1 AND s.session_id = ?2"
        );
        let session = self
            .conn
            .query_row(&sql, params![key.mouse_id, key.session_id], session_from_row)
            .optional()?;
        Ok(session)
    }

    pub fn get_experimenter(&self, experimenter_id: i64) -> Result<Option<Experimenter>> {
        select_experimenter(&self.conn, experimenter_id)
    }

    pub fn list_models(&self) -> Result<Vec<Model>> {
        let mut stmt = self.conn.prepare(
            "SELECT model_id, name, type, origin, training_date, description
             FROM models ORDER BY model_id",
        )?;
        let models = stmt
            .query_map([], model_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(models)
    }

    pub fn get_annotation(&self, key: &SessionKey) -> Result<Option<StoredAnnotation>> {
        let row: Option<(i64, String, String)> = self
            .conn
            .query_row(
                "SELECT experimenter_id, annotations, unique_labels
                 FROM annotations WHERE mouse_id = ?1 AND session_id = ?2",
                params![key.mouse_id, key.session_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((experimenter_id, json, unique_labels)) = row else {
            return Ok(None);
        };
        let sequence: LabelSequence = serde_json::from_str(&json).map_err(|e| DbError::Corrupt {
            table: "annotations",
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(StoredAnnotation {
            key: *key,
            experimenter_id,
            sequence,
            unique_labels,
        }))
    }

    pub fn get_pose(&self, key: &SessionKey) -> Result<Option<StoredPose>> {
        let row: Option<(i64, i64, String, i64, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT experimenter_id, model_id, keypoints, n_frames, pose
                 FROM poses WHERE mouse_id = ?1 AND session_id = ?2",
                params![key.mouse_id, key.session_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        let Some((experimenter_id, model_id, keypoints, n_frames, blob)) = row else {
            return Ok(None);
        };
        let body_parts = split_labels(&keypoints);
        let pose = PoseSequence::from_le_bytes(body_parts, n_frames as usize, &blob).map_err(|e| {
            DbError::Corrupt {
                table: "poses",
                key: key.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Some(StoredPose {
            key: *key,
            experimenter_id,
            model_id,
            keypoints,
            pose,
        }))
    }

    /// Behavior stats, optionally restricted to one mouse and/or session.
    pub fn query_behavior_stats(
        &self,
        mouse_id: Option<i64>,
        session_id: Option<i64>,
    ) -> Result<Vec<SessionBehaviorStat>> {
        let mut stmt = self.conn.prepare(
            "SELECT mouse_id, session_id, behavior_id, total_frames, total_perc, total_time
             FROM behavior_stats
             WHERE (?1 IS NULL OR mouse_id = ?1) AND (?2 IS NULL OR session_id = ?2)
             ORDER BY mouse_id, session_id, behavior_id",
        )?;
        let rows = stmt
            .query_map(params![mouse_id, session_id], |row| {
                let frames: i64 = row.get(3)?;
                Ok(SessionBehaviorStat {
                    key: SessionKey {
                        mouse_id: row.get(0)?,
                        session_id: row.get(1)?,
                    },
                    stat: BehaviorStat {
                        behavior_id: row.get(2)?,
                        total_frames: frames as u64,
                        total_perc: row.get(4)?,
                        total_time: row.get(5)?,
                    },
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn insert_mouse(conn: &Connection, mouse: &Mouse) -> Result<()> {
    conn.execute(
        "INSERT INTO mice (mouse_id, dob, sex, genotype) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT DO NOTHING",
        params![
            mouse.mouse_id,
            mouse.dob.map(|d| d.format(DATE_FORMAT).to_string()),
            mouse.sex.as_str(),
            mouse.genotype,
        ],
    )?;
    Ok(())
}

/// Existing experimenter rows are never overwritten. Returns the stored row when it
/// carries a different name than `e`.
fn insert_experimenter(conn: &Connection, e: &Experimenter) -> Result<Option<Experimenter>> {
    let inserted = conn.execute(
        "INSERT INTO experimenters (experimenter_id, name, sex) VALUES (?1, ?2, ?3)
         ON CONFLICT DO NOTHING",
        params![e.experimenter_id, e.name, e.sex.as_str()],
    )?;
    if inserted > 0 || e.name.is_none() {
        return Ok(None);
    }
    let stored = select_experimenter(conn, e.experimenter_id)?;
    Ok(stored.filter(|s| s.name != e.name))
}

fn select_experimenter(conn: &Connection, experimenter_id: i64) -> Result<Option<Experimenter>> {
    let experimenter = conn
        .query_row(
            "SELECT experimenter_id, name, sex FROM experimenters WHERE experimenter_id = ?1",
            params![experimenter_id],
            experimenter_from_row,
        )
        .optional()?;
    Ok(experimenter)
}

fn insert_session(conn: &Connection, s: &Session, mode: InsertMode) -> Result<()> {
    let sql = format!(
        "INSERT INTO sessions (
            mouse_id, session_id, session_time, experimenter_id, video_path,
            video_fps, pose_path, pose_model_id, annotation_path, annotation_origin
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10){}",
        mode.conflict_clause()
    );
    conn.execute(
        &sql,
        params![
            s.key.mouse_id,
            s.key.session_id,
            s.session_time.format(SESSION_TIME_FORMAT).to_string(),
            s.experimenter_id,
            s.video_path,
            s.video_fps,
            s.pose_path,
            s.pose_model_id,
            s.annotation_path,
            s.annotation_origin,
        ],
    )
    .map_err(|e| map_duplicate(e, "sessions", || s.key.to_string()))?;
    Ok(())
}

fn insert_annotation_row(
    conn: &Connection,
    key: &SessionKey,
    experimenter_id: i64,
    annotation: &NormalizedAnnotation,
    mode: InsertMode,
) -> Result<()> {
    let json = serde_json::to_string(&annotation.sequence).map_err(|e| DbError::Encode("annotations", e))?;
    let sql = format!(
        "INSERT INTO annotations (
            mouse_id, session_id, experimenter_id, annotations, unique_labels, n_frames
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6){}",
        mode.conflict_clause()
    );
    conn.execute(
        &sql,
        params![
            key.mouse_id,
            key.session_id,
            experimenter_id,
            json,
            annotation.unique_labels_string(),
            annotation.sequence.len() as i64,
        ],
    )
    .map_err(|e| map_duplicate(e, "annotations", || key.to_string()))?;
    Ok(())
}

fn insert_stat_rows(conn: &Connection, key: &SessionKey, rows: &[BehaviorStat], mode: InsertMode) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let sql = format!(
        "INSERT INTO behavior_stats (
            mouse_id, session_id, behavior_id, total_frames, total_perc, total_time
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6){}",
        mode.conflict_clause()
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    for r in rows {
        stmt.execute(params![
            key.mouse_id,
            key.session_id,
            r.behavior_id,
            r.total_frames as i64,
            r.total_perc,
            r.total_time,
        ])
        .map_err(|e| map_duplicate(e, "behavior_stats", || format!("{key} behavior {}", r.behavior_id)))?;
    }
    Ok(())
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    let time: String = row.get(2)?;
    Ok(Session {
        key: SessionKey {
            mouse_id: row.get(0)?,
            session_id: row.get(1)?,
        },
        session_time: NaiveDateTime::parse_from_str(&time, SESSION_TIME_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
        experimenter_id: row.get(3)?,
        video_path: row.get(4)?,
        video_fps: row.get(5)?,
        pose_path: row.get(6)?,
        pose_model_id: row.get(7)?,
        annotation_path: row.get(8)?,
        annotation_origin: row.get(9)?,
    })
}

fn experimenter_from_row(row: &Row<'_>) -> rusqlite::Result<Experimenter> {
    let sex: String = row.get(2)?;
    Ok(Experimenter {
        experimenter_id: row.get(0)?,
        name: row.get(1)?,
        sex: sex
            .parse()
            .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?,
    })
}

fn model_from_row(row: &Row<'_>) -> rusqlite::Result<Model> {
    let date: String = row.get(4)?;
    Ok(Model {
        model_id: row.get(0)?,
        name: row.get(1)?,
        model_type: row.get(2)?,
        origin: row.get(3)?,
        training_date: NaiveDate::parse_from_str(&date, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
        description: row.get(5)?,
    })
}

fn split_labels(joined: &str) -> Vec<String> {
    if joined.is_empty() {
        return Vec::new();
    }
    joined.split(PART_SEPARATOR).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationOrigin, LabelInterval};
    use crate::db::models::Sex;
    use crate::pose::PoseFrame;
    use crate::stats::compute_stats;

    fn test_model() -> Model {
        Model {
            model_id: 0,
            name: "TestModelName".to_string(),
            model_type: "SingleInstance".to_string(),
            origin: "SLEAP".to_string(),
            training_date: NaiveDate::from_ymd_opt(2022, 10, 20).unwrap(),
            description: "Test entry for model description.".to_string(),
        }
    }

    fn test_metadata(mouse_id: i64, session_id: i64) -> SessionMetadata {
        SessionMetadata {
            mouse: Mouse {
                mouse_id,
                dob: None,
                sex: Sex::Male,
                genotype: "C57BL/6J".to_string(),
            },
            experimenter: Experimenter {
                experimenter_id: 0,
                name: Some("TestExperimenter".to_string()),
                sex: Sex::Unknown,
            },
            session: Session {
                key: SessionKey { mouse_id, session_id },
                session_time: NaiveDate::from_ymd_opt(2023, 1, 15)
                    .unwrap()
                    .and_hms_opt(14, 30, 0)
                    .unwrap(),
                experimenter_id: 0,
                video_path: None,
                video_fps: 30,
                pose_path: "/data/T12-15012023-143000_pose.csv".to_string(),
                pose_model_id: 0,
                annotation_path: "/data/T12-15012023-143000_labels.csv".to_string(),
                annotation_origin: AnnotationOrigin::Boris.to_string(),
            },
        }
    }

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.insert_model(&test_model(), InsertMode::Strict).unwrap();
        db
    }

    fn test_annotation() -> NormalizedAnnotation {
        let intervals = [
            LabelInterval { label: "rest".into(), start: 0, end: 6 },
            LabelInterval { label: "walk".into(), start: 6, end: 10 },
        ];
        let sequence = LabelSequence::from_intervals(&intervals, 10, "none");
        let label_set = sequence.label_set();
        NormalizedAnnotation { sequence, label_set }
    }

    fn test_pose() -> PoseSequence {
        let rows = vec![vec![PoseFrame::new(1.0, 2.0, 0.5), PoseFrame::new(3.0, 4.0, 0.25)]; 3];
        PoseSequence::from_frames(vec!["nose".into(), "tail".into()], &rows).unwrap()
    }

    #[test]
    fn test_insert_and_list_session() {
        let db = test_db();
        db.insert_session_metadata(&test_metadata(12, 0), InsertMode::Strict).unwrap();

        let sessions = db.list_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(!sessions[0].has_annotation);
        assert!(!sessions[0].has_pose);
        assert_eq!(sessions[0].session, test_metadata(12, 0).session);
        assert_eq!(db.pending_sessions().unwrap().len(), 1);
        assert_eq!(db.next_session_id(12).unwrap(), 1);
        assert_eq!(db.next_session_id(99).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_session_strict() {
        let db = test_db();
        db.insert_session_metadata(&test_metadata(12, 0), InsertMode::Strict).unwrap();
        let err = db
            .insert_session_metadata(&test_metadata(12, 0), InsertMode::Strict)
            .unwrap_err();
        assert!(matches!(err, DbError::DuplicateKey { table: "sessions", .. }), "{err}");
    }

    #[test]
    fn test_duplicate_session_skipped() {
        let db = test_db();
        db.insert_session_metadata(&test_metadata(12, 0), InsertMode::Strict).unwrap();
        db.insert_session_metadata(&test_metadata(12, 0), InsertMode::SkipDuplicates)
            .unwrap();
        assert_eq!(db.list_sessions().unwrap().len(), 1);
    }

    #[test]
    fn test_session_requires_model() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .insert_session_metadata(&test_metadata(12, 0), InsertMode::Strict)
            .unwrap_err();
        assert!(matches!(err, DbError::Sqlite(_)), "{err}");
        assert!(db.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_annotation_round_trip() {
        let db = test_db();
        let meta = test_metadata(12, 0);
        let key = meta.session.key;
        db.insert_session_metadata(&meta, InsertMode::Strict).unwrap();

        let ann = test_annotation();
        let rows = compute_stats(&ann.sequence, 30).unwrap();
        db.store_annotation(&key, 0, &ann, &rows, InsertMode::Strict).unwrap();

        let stored = db.get_annotation(&key).unwrap().unwrap();
        assert_eq!(stored.sequence, ann.sequence);
        assert_eq!(stored.unique_labels, "rest, walk");

        let stats = db.query_behavior_stats(Some(12), None).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].stat.behavior_id, "rest");
        assert_eq!(stats[0].stat.total_frames, 6);
        assert_eq!(stats[1].stat.total_time, 4.0 / 30.0);
        assert!(db.query_behavior_stats(Some(13), None).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_annotation_rolls_back_stats() {
        let db = test_db();
        let meta = test_metadata(12, 0);
        let key = meta.session.key;
        db.insert_session_metadata(&meta, InsertMode::Strict).unwrap();

        let ann = test_annotation();
        let rows = compute_stats(&ann.sequence, 30).unwrap();
        db.store_annotation(&key, 0, &ann, &rows, InsertMode::Strict).unwrap();
        let err = db
            .store_annotation(&key, 0, &ann, &rows, InsertMode::Strict)
            .unwrap_err();
        assert!(matches!(err, DbError::DuplicateKey { table: "annotations", .. }));

        db.store_annotation(&key, 0, &ann, &rows, InsertMode::SkipDuplicates)
            .unwrap();
        assert_eq!(db.query_behavior_stats(None, None).unwrap().len(), 2);
    }

    #[test]
    fn test_pose_round_trip() {
        let db = test_db();
        let meta = test_metadata(12, 0);
        let key = meta.session.key;
        db.insert_session_metadata(&meta, InsertMode::Strict).unwrap();

        let pose = test_pose();
        db.insert_pose(&key, 0, 0, &pose, InsertMode::Strict).unwrap();

        let stored = db.get_pose(&key).unwrap().unwrap();
        assert_eq!(stored.keypoints, "nose, tail");
        assert_eq!(stored.pose.shape(), (3, 2, 3));
        assert_eq!(stored.pose.as_flat(), pose.as_flat());

        let status = &db.list_sessions().unwrap()[0];
        assert!(status.has_pose);
        assert!(!status.has_annotation);

        let err = db.insert_pose(&key, 0, 0, &pose, InsertMode::Strict).unwrap_err();
        assert!(matches!(err, DbError::DuplicateKey { table: "poses", .. }));
    }

    #[test]
    fn test_pending_excludes_complete_sessions() {
        let db = test_db();
        let meta = test_metadata(12, 0);
        let key = meta.session.key;
        db.insert_session_metadata(&meta, InsertMode::Strict).unwrap();
        db.insert_session_metadata(&test_metadata(12, 1), InsertMode::Strict).unwrap();

        let ann = test_annotation();
        db.store_annotation(&key, 0, &ann, &[], InsertMode::Strict).unwrap();
        db.insert_pose(&key, 0, 0, &test_pose(), InsertMode::Strict).unwrap();

        let pending = db.pending_sessions().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].session.key.session_id, 1);
    }

    #[test]
    fn test_find_session_at() {
        let db = test_db();
        let meta = test_metadata(12, 0);
        db.insert_session_metadata(&meta, InsertMode::Strict).unwrap();
        let found = db.find_session_at(12, meta.session.session_time).unwrap();
        assert_eq!(found, Some(meta.session.key));
        assert_eq!(db.find_session_at(13, meta.session.session_time).unwrap(), None);
    }

    #[test]
    fn test_model_lookup() {
        let db = test_db();
        let model = db.get_model(0).unwrap().unwrap();
        assert_eq!(model, test_model());
        assert!(db.get_model(7).unwrap().is_none());
        assert_eq!(db.list_models().unwrap().len(), 1);
        let err = db.insert_model(&test_model(), InsertMode::Strict).unwrap_err();
        assert!(matches!(err, DbError::DuplicateKey { table: "models", .. }));
    }

    #[test]
    fn test_experimenter_name_is_not_overwritten() {
        let db = test_db();
        db.insert_session_metadata(&test_metadata(12, 0), InsertMode::Strict).unwrap();

        let mut meta = test_metadata(12, 1);
        meta.experimenter.name = Some("Renamed".to_string());
        db.insert_session_metadata(&meta, InsertMode::Strict).unwrap();
        let stored = db.get_experimenter(0).unwrap().unwrap();
        assert_eq!(stored.name.as_deref(), Some("TestExperimenter"));

        // The conflicting stored row is reported back
        let conflict = insert_experimenter(&db.conn, &meta.experimenter).unwrap().unwrap();
        assert_eq!(conflict, stored);
        assert!(insert_experimenter(&db.conn, &test_metadata(12, 0).experimenter)
            .unwrap()
            .is_none());
        meta.experimenter.name = None;
        assert!(insert_experimenter(&db.conn, &meta.experimenter).unwrap().is_none());
        assert!(db.get_experimenter(9).unwrap().is_none());
    }

    #[test]
    fn test_split_labels() {
        assert_eq!(split_labels("nose, tail"), ["nose", "tail"]);
        assert!(split_labels("").is_empty());
        // Commas without the trailing space survive
        assert_eq!(split_labels("ear,left, tail"), ["ear,left", "tail"]);
    }
}
