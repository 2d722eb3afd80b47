//! SQLite-backed artifact store.
//!
//! Layout:
//! - `artifacts`: one row per artifact key
//! - `canonical_hashes`: content hash -> canonical key. The primary key on
//!   `content_hash` is what makes a canonical claim first-writer-wins, also
//!   across processes sharing the file.
//! - `artifact_references`: referrer -> canonical key, written in the same
//!   transaction as the reference row

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, info};

use super::{
    promoted_payload, retargeted_payload, ArtifactStore, CanonicalClaim, StoreError, StoreResult,
    StoreStats,
};
use crate::config::StoreSettings;
use crate::domain::ArtifactEntity;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS artifacts (
    key TEXT PRIMARY KEY,
    parent_key TEXT,
    execution_key TEXT NOT NULL,
    artifact_type TEXT NOT NULL,
    content_hash TEXT,
    payload TEXT,
    depth INTEGER NOT NULL CHECK (depth >= 1),
    template_name TEXT,
    is_canonical INTEGER NOT NULL DEFAULT 0,
    schema_version INTEGER NOT NULL,
    child_keys TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    CHECK ((parent_key IS NULL) = (depth = 1))
);
CREATE INDEX IF NOT EXISTS idx_artifacts_execution ON artifacts(execution_key, key);
CREATE INDEX IF NOT EXISTS idx_artifacts_type ON artifacts(execution_key, artifact_type);
CREATE INDEX IF NOT EXISTS idx_artifacts_hash ON artifacts(content_hash);
CREATE INDEX IF NOT EXISTS idx_artifacts_template ON artifacts(template_name, created_at);
CREATE INDEX IF NOT EXISTS idx_artifacts_roots ON artifacts(depth, created_at);

CREATE TABLE IF NOT EXISTS canonical_hashes (
    content_hash TEXT PRIMARY KEY,
    artifact_key TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS artifact_references (
    referrer_key TEXT PRIMARY KEY,
    canonical_key TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_references_canonical ON artifact_references(canonical_key);
";

const COLUMNS: &str = "a.key, a.parent_key, a.execution_key, a.artifact_type, a.content_hash, \
     a.payload, a.depth, a.template_name, a.is_canonical, a.schema_version, a.child_keys, \
     a.created_at, \
     (SELECT json_group_array(r.referrer_key) FROM artifact_references r \
      WHERE r.canonical_key = a.key)";

/// Artifact store persisted in a single SQLite database file
pub struct SqliteArtifactStore {
    conn: Mutex<Connection>,
}

impl SqliteArtifactStore {
    /// Open (or create) a store at `path`
    pub fn open(path: &Path, settings: &StoreSettings) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        if settings.wal {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        }
        let store = Self::init(conn, settings)?;

        info!("Opened artifact store at {}", path.display());
        Ok(store)
    }

    /// Open a private in-memory database (tests, scratch runs)
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, &StoreSettings::default())
    }

    fn init(conn: Connection, settings: &StoreSettings) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_millis(settings.busy_timeout_ms))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn query(&self, clause: &str, params: impl rusqlite::Params) -> StoreResult<Vec<ArtifactEntity>> {
        select(&self.conn(), clause, params)
    }
}

fn select(
    conn: &Connection,
    clause: &str,
    params: impl rusqlite::Params,
) -> StoreResult<Vec<ArtifactEntity>> {
    let sql = format!("SELECT {} FROM artifacts a {}", COLUMNS, clause);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, row_to_entity)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Move every canonical claim held inside `execution_key` that is still
/// referenced from outside it to the first outside referrer. Returns the
/// number of rows promoted.
fn hand_over_claims(conn: &Connection, execution_key: &str) -> StoreResult<usize> {
    let holders = select(
        conn,
        "JOIN canonical_hashes c ON c.artifact_key = a.key
         WHERE a.execution_key = ?1 ORDER BY a.key",
        params![execution_key],
    )?;

    let mut promoted = 0;
    for holder in holders {
        let survivors = select(
            conn,
            "JOIN artifact_references l ON l.referrer_key = a.key
             WHERE l.canonical_key = ?1 AND a.execution_key <> ?2
             ORDER BY l.rowid",
            params![holder.key, execution_key],
        )?;
        let Some((heir, rest)) = survivors.split_first() else {
            continue;
        };

        conn.execute(
            "UPDATE artifacts SET payload = ?1, is_canonical = 1 WHERE key = ?2",
            params![promoted_payload(&holder, heir)?, heir.key],
        )?;
        conn.execute(
            "UPDATE canonical_hashes SET artifact_key = ?1 WHERE artifact_key = ?2",
            params![heir.key, holder.key],
        )?;
        conn.execute(
            "DELETE FROM artifact_references WHERE referrer_key = ?1",
            params![heir.key],
        )?;

        for referrer in rest {
            conn.execute(
                "UPDATE artifacts SET payload = ?1 WHERE key = ?2",
                params![retargeted_payload(referrer, &heir.key)?, referrer.key],
            )?;
            conn.execute(
                "UPDATE artifact_references SET canonical_key = ?1 WHERE referrer_key = ?2",
                params![heir.key, referrer.key],
            )?;
        }
        promoted += 1;
    }

    Ok(promoted)
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    // Fixed-width so text comparison matches time order
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<ArtifactEntity> {
    let child_keys: String = row.get(10)?;
    let created_at: String = row.get(11)?;
    let referenced_by: String = row.get(12)?;

    Ok(ArtifactEntity {
        key: row.get(0)?,
        parent_key: row.get(1)?,
        execution_key: row.get(2)?,
        artifact_type: row.get(3)?,
        content_hash: row.get(4)?,
        payload: row.get(5)?,
        depth: row.get(6)?,
        template_name: row.get(7)?,
        is_canonical: row.get(8)?,
        schema_version: row.get(9)?,
        child_keys: serde_json::from_str(&child_keys).map_err(|e| conversion_error(10, e))?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| conversion_error(11, e))?
            .with_timezone(&Utc),
        referenced_by: serde_json::from_str(&referenced_by).map_err(|e| conversion_error(12, e))?,
    })
}

fn insert_row(conn: &Connection, entity: &ArtifactEntity) -> StoreResult<()> {
    let child_keys = serde_json::to_string(&entity.child_keys)?;
    let result = conn.execute(
        "INSERT INTO artifacts
         (key, parent_key, execution_key, artifact_type, content_hash, payload, depth,
          template_name, is_canonical, schema_version, child_keys, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            entity.key,
            entity.parent_key,
            entity.execution_key,
            entity.artifact_type,
            entity.content_hash,
            entity.payload,
            entity.depth,
            entity.template_name,
            entity.is_canonical,
            entity.schema_version,
            child_keys,
            timestamp(&entity.created_at),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            Err(StoreError::AlreadyExists(entity.key.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

impl ArtifactStore for SqliteArtifactStore {
    fn find_by_key(&self, key: &str) -> StoreResult<Option<ArtifactEntity>> {
        let conn = self.conn();
        let sql = format!("SELECT {} FROM artifacts a WHERE a.key = ?1", COLUMNS);
        let entity = conn.query_row(&sql, params![key], row_to_entity).optional()?;
        Ok(entity)
    }

    fn exists_by_key(&self, key: &str) -> StoreResult<bool> {
        let exists = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM artifacts WHERE key = ?1)",
            params![key],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn find_canonical_key(&self, hash: &str) -> StoreResult<Option<String>> {
        let key = self
            .conn()
            .query_row(
                "SELECT artifact_key FROM canonical_hashes WHERE content_hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(key)
    }

    fn insert(&self, entity: &ArtifactEntity) -> StoreResult<()> {
        insert_row(&self.conn(), entity)
    }

    fn insert_canonical(&self, entity: &ArtifactEntity) -> StoreResult<CanonicalClaim> {
        let hash = entity.content_hash.as_deref().ok_or_else(|| StoreError::Corrupt {
            key: entity.key.clone(),
            reason: "canonical row without content hash".to_string(),
        })?;

        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let claimed = tx.execute(
            "INSERT OR IGNORE INTO canonical_hashes (content_hash, artifact_key) VALUES (?1, ?2)",
            params![hash, entity.key],
        )?;

        if claimed == 0 {
            let holder: String = tx.query_row(
                "SELECT artifact_key FROM canonical_hashes WHERE content_hash = ?1",
                params![hash],
                |row| row.get(0),
            )?;
            tx.commit()?;
            debug!(hash, holder = %holder, "Canonical claim lost");
            return Ok(CanonicalClaim::Existing(holder));
        }

        insert_row(&tx, entity)?;
        tx.commit()?;
        Ok(CanonicalClaim::Claimed)
    }

    fn insert_reference(&self, entity: &ArtifactEntity, canonical_key: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_row(&tx, entity)?;
        tx.execute(
            "INSERT INTO artifact_references (referrer_key, canonical_key) VALUES (?1, ?2)",
            params![entity.key, canonical_key],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn list_by_execution(&self, execution_key: &str) -> StoreResult<Vec<ArtifactEntity>> {
        self.query("WHERE a.execution_key = ?1 ORDER BY a.key", params![execution_key])
    }

    fn list_descendants(&self, key: &str) -> StoreResult<Vec<ArtifactEntity>> {
        // '0' is the byte after '/', so [key/, key0) covers exactly the descendants
        let lower = format!("{}/", key);
        let upper = format!("{}0", key);
        self.query(
            "WHERE a.key >= ?1 AND a.key < ?2 ORDER BY a.key",
            params![lower, upper],
        )
    }

    fn list_by_execution_and_type(
        &self,
        execution_key: &str,
        artifact_type: &str,
    ) -> StoreResult<Vec<ArtifactEntity>> {
        self.query(
            "WHERE a.execution_key = ?1 AND a.artifact_type = ?2 ORDER BY a.key",
            params![execution_key, artifact_type],
        )
    }

    fn template_history(&self, name: &str) -> StoreResult<Vec<ArtifactEntity>> {
        self.query(
            "WHERE a.template_name = ?1 ORDER BY a.created_at DESC, a.key DESC",
            params![name],
        )
    }

    fn list_template_family(&self, prefix: &str) -> StoreResult<Vec<ArtifactEntity>> {
        self.query(
            "WHERE a.template_name IS NOT NULL
               AND substr(a.template_name, 1, length(?1)) = ?1
             ORDER BY a.template_name, a.created_at DESC, a.key DESC",
            params![prefix],
        )
    }

    fn list_execution_roots(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<ArtifactEntity>> {
        self.query(
            "WHERE a.depth = 1 AND a.created_at >= ?1 AND a.created_at <= ?2
             ORDER BY a.created_at, a.key",
            params![timestamp(&from), timestamp(&to)],
        )
    }

    fn list_template_names(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT template_name FROM artifacts
             WHERE template_name IS NOT NULL ORDER BY template_name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn delete_execution(&self, execution_key: &str) -> StoreResult<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let promoted = hand_over_claims(&tx, execution_key)?;
        if promoted > 0 {
            debug!(execution_key, promoted, "Handed canonical content to surviving referrers");
        }

        tx.execute(
            "DELETE FROM canonical_hashes WHERE artifact_key IN
             (SELECT key FROM artifacts WHERE execution_key = ?1)",
            params![execution_key],
        )?;
        tx.execute(
            "DELETE FROM artifact_references WHERE referrer_key IN
             (SELECT key FROM artifacts WHERE execution_key = ?1)
             OR canonical_key IN (SELECT key FROM artifacts WHERE execution_key = ?1)",
            params![execution_key],
        )?;
        let removed = tx.execute(
            "DELETE FROM artifacts WHERE execution_key = ?1",
            params![execution_key],
        )?;

        tx.commit()?;
        Ok(removed)
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        let conn = self.conn();
        let (total_rows, executions, reference_rows, payload_bytes): (i64, i64, i64, i64) =
            conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(depth = 1), 0),
                        COALESCE(SUM(CASE WHEN json_valid(payload)
                            THEN json_extract(payload, '$.type') IN ('reference', 'template_reference')
                            ELSE 0 END), 0),
                        COALESCE(SUM(length(CAST(payload AS BLOB))), 0)
                 FROM artifacts",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;
        let canonical_rows: i64 =
            conn.query_row("SELECT COUNT(*) FROM canonical_hashes", [], |row| row.get(0))?;

        Ok(StoreStats {
            total_rows: total_rows as usize,
            canonical_rows: canonical_rows as usize,
            reference_rows: reference_rows as usize,
            executions: executions as usize,
            payload_bytes: payload_bytes as usize,
        })
    }
}
