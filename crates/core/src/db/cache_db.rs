use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::db::{CacheEntry, JobRunRecord, JobRunStatus};
use crate::model::{JobKey, OutputSet, DEFAULT_OUTPUT};

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Error type for cache index operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// Outcome of a validated cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// The job completed before and every recorded artifact is still on disk.
    Hit(OutputSet),
    /// No entries for this key.
    Miss,
    /// Entries exist but cannot be trusted.
    Corrupt { reason: String },
}

/// SQLite-backed job cache for one staging area.
///
/// Maps a job key to the named outputs it produced. Writes are upserts: all
/// rows for a key are replaced in one transaction, so re-running a job can
/// never leave duplicate or mixed rows behind.
#[derive(Debug)]
pub struct CacheIndex {
    conn: Connection,
}

impl CacheIndex {
    /// Open (or create) the cache index at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Expose a reference to the underlying connection for advanced callers.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// True if at least one entry is recorded for `key`.
    pub fn has(&self, key: &JobKey) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE job_key = ?1",
            params![key.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Recorded outputs for `key`; empty if the job never completed.
    pub fn get(&self, key: &JobKey) -> DbResult<OutputSet> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT output_name, path
            FROM cache_entries
            WHERE job_key = ?1
            ORDER BY output_name
            "#,
        )?;
        let rows = stmt.query_map(params![key.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, PathBuf::from(row.get::<_, String>(1)?)))
        })?;

        let mut out = OutputSet::new();
        for row in rows {
            let (name, path) = row?;
            out.insert(name, path);
        }
        Ok(out)
    }

    /// Replace every entry for `key` with `outputs`.
    pub fn put(&self, key: &JobKey, outputs: &OutputSet) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM cache_entries WHERE job_key = ?1", params![key.as_str()])?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO cache_entries (job_key, output_name, path)
                VALUES (?1, ?2, ?3)
                "#,
            )?;
            for (name, path) in outputs.iter() {
                stmt.execute(params![key.as_str(), name, path.to_string_lossy()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Forget a job. Returns the number of rows removed.
    pub fn remove(&self, key: &JobKey) -> DbResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM cache_entries WHERE job_key = ?1", params![key.as_str()])?)
    }

    /// Forget every job other than `keep` that recorded an output at any of
    /// `paths`. Returns the number of rows removed.
    pub fn invalidate_paths(&self, paths: &[PathBuf], keep: &JobKey) -> DbResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                DELETE FROM cache_entries
                WHERE job_key != ?2
                  AND job_key IN (SELECT job_key FROM cache_entries WHERE path = ?1)
                "#,
            )?;
            for path in paths {
                removed += stmt.execute(params![path.to_string_lossy(), keep.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Forget every job (the audit log is kept).
    pub fn clear(&self) -> DbResult<usize> {
        Ok(self.conn.execute("DELETE FROM cache_entries", [])?)
    }

    /// All job keys with at least one entry, sorted.
    pub fn job_keys(&self) -> DbResult<Vec<JobKey>> {
        let mut stmt =
            self.conn.prepare("SELECT DISTINCT job_key FROM cache_entries ORDER BY job_key")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(JobKey::from_raw(row?));
        }
        Ok(out)
    }

    /// Every raw row in the lookup table, ordered by key then output name.
    pub fn entries(&self) -> DbResult<Vec<CacheEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT job_key, output_name, path
            FROM cache_entries
            ORDER BY job_key, output_name
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CacheEntry { job_key: row.get(0)?, output_name: row.get(1)?, path: row.get(2)? })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Look up `key` and check that the recorded set is still usable.
    pub fn lookup(&self, key: &JobKey) -> DbResult<CacheLookup> {
        let outputs = self.get(key)?;
        if outputs.is_empty() {
            return Ok(CacheLookup::Miss);
        }
        if !outputs.contains(DEFAULT_OUTPUT) {
            return Ok(CacheLookup::Corrupt { reason: "no default output recorded".to_string() });
        }
        if let Some((name, path)) = outputs.iter().find(|(_, path)| !path.exists()) {
            return Ok(CacheLookup::Corrupt {
                reason: format!("output '{}' missing at {}", name, path.display()),
            });
        }
        Ok(CacheLookup::Hit(outputs))
    }

    /// Append a record to the job audit log and return its row id.
    pub fn record_run(&self, record: &JobRunRecord) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO job_runs (job_key, stage, status, exit_code, started_at, finished_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.job_key,
                record.stage,
                record.status.as_str(),
                record.exit_code,
                record.started_at,
                record.finished_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// List audit log records in insertion order, optionally filtered by stage.
    pub fn list_job_runs(&self, stage: Option<&str>) -> DbResult<Vec<JobRunRecord>> {
        fn map_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRunRecord> {
            let status: String = row.get(2)?;
            Ok(JobRunRecord {
                job_key: row.get(0)?,
                stage: row.get(1)?,
                status: status.parse::<JobRunStatus>().map_err(|_| rusqlite::Error::InvalidQuery)?,
                exit_code: row.get(3)?,
                started_at: row.get(4)?,
                finished_at: row.get(5)?,
            })
        }

        let mut stmt = if stage.is_some() {
            self.conn.prepare(
                r#"
                SELECT job_key, stage, status, exit_code, started_at, finished_at
                FROM job_runs
                WHERE stage = ?1
                ORDER BY id
                "#,
            )?
        } else {
            self.conn.prepare(
                r#"
                SELECT job_key, stage, status, exit_code, started_at, finished_at
                FROM job_runs
                ORDER BY id
                "#,
            )?
        };

        let rows = if let Some(stage) = stage {
            stmt.query_map(params![stage], map_run)?
        } else {
            stmt.query_map([], map_run)?
        };

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// Apply schema migrations to bring the database to the latest version.
///
/// We use `PRAGMA user_version` as the schema version indicator.
///
/// Version map:
/// - 0: no schema
/// - 1: cache_entries lookup table keyed by (job_key, output_name)
/// - 2: job_runs audit log
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS cache_entries (
                job_key     TEXT NOT NULL,
                output_name TEXT NOT NULL,
                path        TEXT NOT NULL,
                PRIMARY KEY(job_key, output_name)
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS job_runs (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                job_key     TEXT NOT NULL,
                stage       TEXT NOT NULL,
                status      TEXT NOT NULL,
                exit_code   INTEGER,
                started_at  TEXT NOT NULL,
                finished_at TEXT NOT NULL
            );

            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
