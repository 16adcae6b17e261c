pub mod models;
pub mod queries;

use crate::annotation::NormalizedAnnotation;
use crate::pose::PoseSequence;
use crate::stats::BehaviorStat;
use models::{Model, SessionKey, SessionMetadata, SessionStatus};
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Duplicate key in {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },
    #[error("Corrupt {table} row for {key}: {message}")]
    Corrupt {
        table: &'static str,
        key: String,
        message: String,
    },
    #[error("Failed to encode {0}: {1}")]
    Encode(&'static str, #[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// How inserts treat a row whose key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// Fail with [`DbError::DuplicateKey`].
    #[default]
    Strict,
    /// Leave the existing row and carry on.
    SkipDuplicates,
}

impl InsertMode {
    pub fn from_flag(skip_duplicates: bool) -> Self {
        if skip_duplicates { Self::SkipDuplicates } else { Self::Strict }
    }

    pub(crate) fn conflict_clause(&self) -> &'static str {
        match self {
            Self::Strict => "",
            Self::SkipDuplicates => " ON CONFLICT DO NOTHING",
        }
    }
}

/// Storage for session metadata and normalized import results.
pub trait Persistence {
    /// Insert the session plus its mouse and experimenter. Mouse and experimenter rows
    /// that already exist are kept as they are.
    fn insert_session_metadata(&self, meta: &SessionMetadata, mode: InsertMode) -> Result<()>;

    fn insert_model(&self, model: &Model, mode: InsertMode) -> Result<()>;

    fn insert_annotation(
        &self,
        key: &SessionKey,
        experimenter_id: i64,
        annotation: &NormalizedAnnotation,
        mode: InsertMode,
    ) -> Result<()>;

    fn insert_behavior_stats(&self, key: &SessionKey, rows: &[BehaviorStat], mode: InsertMode) -> Result<()>;

    fn insert_pose(
        &self,
        key: &SessionKey,
        experimenter_id: i64,
        model_id: i64,
        pose: &PoseSequence,
        mode: InsertMode,
    ) -> Result<()>;

    /// Store an annotation together with its stats rows.
    fn store_annotation(
        &self,
        key: &SessionKey,
        experimenter_id: i64,
        annotation: &NormalizedAnnotation,
        rows: &[BehaviorStat],
        mode: InsertMode,
    ) -> Result<()> {
        self.insert_annotation(key, experimenter_id, annotation, mode)?;
        self.insert_behavior_stats(key, rows, mode)
    }

    /// Sessions still missing an annotation or pose row.
    fn pending_sessions(&self) -> Result<Vec<SessionStatus>>;

    fn get_model(&self, model_id: i64) -> Result<Option<Model>>;
}

/// Explicitly opened SQLite handle. Close it with [`Database::close`].
pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| DbError::from(e))
    }

    fn init(&self) -> Result<()> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.create_schema()?;
        Ok(())
    }

    fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            -- Manual entry tables
            CREATE TABLE IF NOT EXISTS mice (
                mouse_id        INTEGER PRIMARY KEY,
                dob             TEXT,
                sex             TEXT NOT NULL DEFAULT 'unknown' CHECK (sex IN ('M', 'F', 'unknown')),
                genotype        TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS experimenters (
                experimenter_id INTEGER PRIMARY KEY,
                name            TEXT,
                sex             TEXT NOT NULL DEFAULT 'unknown' CHECK (sex IN ('M', 'F', 'unknown'))
            );

            CREATE TABLE IF NOT EXISTS models (
                model_id        INTEGER PRIMARY KEY,
                name            TEXT NOT NULL,
                type            TEXT NOT NULL,
                origin          TEXT NOT NULL,
                training_date   TEXT NOT NULL,
                description     TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS sessions (
                mouse_id            INTEGER NOT NULL REFERENCES mice(mouse_id),
                session_id          INTEGER NOT NULL,
                session_time        TEXT NOT NULL,
                experimenter_id     INTEGER NOT NULL REFERENCES experimenters(experimenter_id),
                video_path          TEXT,
                video_fps           INTEGER NOT NULL,
                pose_path           TEXT NOT NULL,
                pose_model_id       INTEGER NOT NULL REFERENCES models(model_id),
                annotation_path     TEXT NOT NULL,
                annotation_origin   TEXT NOT NULL,
                PRIMARY KEY (mouse_id, session_id)
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_time ON sessions(mouse_id, session_time);

            -- Imported tables
            CREATE TABLE IF NOT EXISTS annotations (
                mouse_id        INTEGER NOT NULL,
                session_id      INTEGER NOT NULL,
                experimenter_id INTEGER NOT NULL REFERENCES experimenters(experimenter_id),
                annotations     TEXT NOT NULL,   -- JSON array, one label per frame
                unique_labels   TEXT NOT NULL,
                n_frames        INTEGER NOT NULL,
                imported_at     TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (mouse_id, session_id),
                FOREIGN KEY (mouse_id, session_id) REFERENCES sessions(mouse_id, session_id)
            );

            CREATE TABLE IF NOT EXISTS behavior_stats (
                mouse_id        INTEGER NOT NULL,
                session_id      INTEGER NOT NULL,
                behavior_id     TEXT NOT NULL,
                total_frames    INTEGER NOT NULL,
                total_perc      REAL NOT NULL,
                total_time      REAL NOT NULL,
                PRIMARY KEY (mouse_id, session_id, behavior_id),
                FOREIGN KEY (mouse_id, session_id) REFERENCES annotations(mouse_id, session_id)
            );

            CREATE TABLE IF NOT EXISTS poses (
                mouse_id        INTEGER NOT NULL,
                session_id      INTEGER NOT NULL,
                experimenter_id INTEGER NOT NULL REFERENCES experimenters(experimenter_id),
                model_id        INTEGER NOT NULL REFERENCES models(model_id),
                keypoints       TEXT NOT NULL,
                n_frames        INTEGER NOT NULL,
                n_parts         INTEGER NOT NULL,
                pose            BLOB NOT NULL,   -- little-endian f64, (frames, parts, 3)
                imported_at     TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (mouse_id, session_id),
                FOREIGN KEY (mouse_id, session_id) REFERENCES sessions(mouse_id, session_id)
            );
            ",
        )?;
        Ok(())
    }
}

/// Turn a primary-key or unique violation into [`DbError::DuplicateKey`].
pub(crate) fn map_duplicate(e: rusqlite::Error, table: &'static str, key: impl FnOnce() -> String) -> DbError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            DbError::DuplicateKey { table, key: key() }
        }
        _ => DbError::Sqlite(e),
    }
}
