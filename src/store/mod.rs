//! Storage boundary for artifact rows.
//!
//! The core never talks to a database directly; it drives an `ArtifactStore`.
//! Two implementations ship with the crate:
//! - `InMemoryArtifactStore`: process-local, used by tests and embedders
//! - `SqliteArtifactStore`: durable, one SQLite file per store

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::{Artifact, ArtifactEntity, ArtifactKey, KeyError};

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryArtifactStore;
pub use sqlite::SqliteArtifactStore;

/// Errors raised at the storage boundary
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid artifact key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Row already exists: {0}")]
    AlreadyExists(String),

    #[error("Corrupt row {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of an atomic canonical claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalClaim {
    /// This row is now the canonical holder and was written in full
    Claimed,

    /// Another row already holds the hash; nothing was written
    Existing(String),
}

/// Row counts and payload sizes across the whole store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_rows: usize,
    pub canonical_rows: usize,
    pub reference_rows: usize,
    pub executions: usize,
    pub payload_bytes: usize,
}

/// Keyed, queryable record store for artifact rows.
///
/// Implementations must make `insert_canonical` an atomic
/// claim-if-absent: when two writers race on the same brand-new hash,
/// exactly one gets `Claimed`.
pub trait ArtifactStore: Send + Sync {
    /// Exact-key lookup (with `referenced_by` materialized)
    fn find_by_key(&self, key: &str) -> StoreResult<Option<ArtifactEntity>>;

    fn exists_by_key(&self, key: &str) -> StoreResult<bool>;

    /// Key of the canonical row holding `hash`, if any
    fn find_canonical_key(&self, hash: &str) -> StoreResult<Option<String>>;

    /// Write a row that takes no part in deduplication
    fn insert(&self, entity: &ArtifactEntity) -> StoreResult<()>;

    /// Claim `entity.content_hash` for `entity` and write it, or report the
    /// current holder without writing anything
    fn insert_canonical(&self, entity: &ArtifactEntity) -> StoreResult<CanonicalClaim>;

    /// Write a reference row and record it on `canonical_key` in one step
    fn insert_reference(&self, entity: &ArtifactEntity, canonical_key: &str) -> StoreResult<()>;

    /// Rows of one execution, ordered by key
    fn list_by_execution(&self, execution_key: &str) -> StoreResult<Vec<ArtifactEntity>>;

    /// Rows strictly below `key`, ordered by key
    fn list_descendants(&self, key: &str) -> StoreResult<Vec<ArtifactEntity>>;

    fn list_by_execution_and_type(
        &self,
        execution_key: &str,
        artifact_type: &str,
    ) -> StoreResult<Vec<ArtifactEntity>>;

    /// Rows carrying template `name`, newest first
    fn template_history(&self, name: &str) -> StoreResult<Vec<ArtifactEntity>>;

    /// Template rows whose name starts with `prefix`, ordered by name then
    /// newest first
    fn list_template_family(&self, prefix: &str) -> StoreResult<Vec<ArtifactEntity>>;

    /// Depth-1 rows created within `[from, to]`, oldest first
    fn list_execution_roots(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<ArtifactEntity>>;

    /// Distinct template names, sorted
    fn list_template_names(&self) -> StoreResult<Vec<String>>;

    /// Remove every row of an execution along with the canonical claims and
    /// reference links those rows held. Returns the number of rows removed.
    ///
    /// A canonical row that is still referenced from another execution hands
    /// its content to the first surviving referrer, which becomes the new
    /// holder; the remaining referrers are re-pointed at it.
    fn delete_execution(&self, execution_key: &str) -> StoreResult<usize>;

    fn stats(&self) -> StoreResult<StoreStats>;
}

fn payload_artifact(entity: &ArtifactEntity) -> StoreResult<Artifact> {
    let payload = entity.payload.as_deref().ok_or_else(|| StoreError::Corrupt {
        key: entity.key.clone(),
        reason: "row has no payload".to_string(),
    })?;
    Ok(serde_json::from_str(payload)?)
}

/// Full-content payload for `heir` when it takes over the content of `holder`
pub(crate) fn promoted_payload(holder: &ArtifactEntity, heir: &ArtifactEntity) -> StoreResult<String> {
    let content = payload_artifact(holder)?;
    let pointer = payload_artifact(heir)?;

    let mut full = content.in_place_of(&pointer).ok_or_else(|| StoreError::Corrupt {
        key: heir.key.clone(),
        reason: format!("cannot take over the content of {}", holder.key),
    })?;
    let children = heir
        .child_keys
        .iter()
        .map(ArtifactKey::parse)
        .collect::<Result<Vec<_>, _>>()?;
    full.set_children(children);

    Ok(serde_json::to_string(&full)?)
}

/// Pointer payload of `referrer` aimed at `canonical_key`
pub(crate) fn retargeted_payload(referrer: &ArtifactEntity, canonical_key: &str) -> StoreResult<String> {
    let mut pointer = payload_artifact(referrer)?;
    pointer.retarget(ArtifactKey::parse(canonical_key)?);
    Ok(serde_json::to_string(&pointer)?)
}
