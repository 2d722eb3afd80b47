//! JSONL export and import of stored rows.
//!
//! One `ArtifactEntity` per line, ordered by key. Import replays a file into
//! any store and re-establishes canonical claims and reference links.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, instrument};

use super::service::ArtifactService;
use crate::domain::{ArtifactEntity, ArtifactKey};
use crate::store::{retargeted_payload, CanonicalClaim};

/// Outcome of an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Rows written
    pub imported: usize,

    /// Rows whose key was already present
    pub skipped: usize,

    /// Canonical rows written as references because the target store
    /// already held their hash
    pub demoted: usize,
}

/// Write every row of an execution to `path`, replacing the file.
/// Returns the number of rows written.
#[instrument(skip(service, path), fields(execution_key = %execution_key, path = %path.display()))]
pub async fn export_execution(
    service: &ArtifactService,
    execution_key: &ArtifactKey,
    path: &Path,
) -> Result<usize> {
    let rows = service
        .store()
        .list_by_execution(execution_key.as_str())
        .with_context(|| format!("Failed to list rows of execution {}", execution_key))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let mut file = File::create(path)
        .await
        .with_context(|| format!("Failed to create export file: {}", path.display()))?;

    for row in &rows {
        let json = serde_json::to_string(row).context("Failed to serialize row")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write row")?;
    }
    file.flush().await.context("Failed to flush export file")?;

    info!(rows = rows.len(), "Exported execution");
    Ok(rows.len())
}

/// Read every row from a JSONL export
pub async fn read_entities(path: &Path) -> Result<Vec<ArtifactEntity>> {
    let file = File::open(path)
        .await
        .with_context(|| format!("Failed to open export file: {}", path.display()))?;

    let reader = BufReader::new(file);
    let mut lines = reader.lines();
    let mut entities = Vec::new();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let entity: ArtifactEntity = serde_json::from_str(&line)
            .with_context(|| format!("Failed to parse row on line {}", line_no))?;
        entities.push(entity);
    }

    Ok(entities)
}

/// Replay a JSONL export into the service's store.
///
/// Canonical rows whose hash the store already holds are demoted to
/// references, and rows of the file that pointed at a demoted row are
/// pointed at the existing holder instead.
#[instrument(skip(service, path), fields(path = %path.display()))]
pub async fn import_entities(service: &ArtifactService, path: &Path) -> Result<ImportReport> {
    let entities = read_entities(path).await?;
    let store = service.store();
    let mut report = ImportReport::default();

    // demoted row key -> key of the row that already held its content
    let mut demoted: HashMap<String, String> = HashMap::new();

    for mut entity in entities {
        if store.exists_by_key(&entity.key)? {
            report.skipped += 1;
            continue;
        }
        entity.referenced_by.clear();

        if entity.is_reference_row() {
            let pointer = ArtifactService::deserialize_artifact(Some(&entity))
                .with_context(|| format!("Unreadable reference row {}", entity.key))?;
            let target = pointer
                .canonical_key()
                .with_context(|| format!("Reference row {} has no target", entity.key))?;

            let canonical_key = match demoted.get(target.as_str()) {
                Some(holder) => {
                    entity.payload = Some(retargeted_payload(&entity, holder)?);
                    holder.clone()
                }
                None => target.to_string(),
            };
            store.insert_reference(&entity, &canonical_key)?;
        } else if entity.is_canonical {
            match store.insert_canonical(&entity)? {
                CanonicalClaim::Claimed => {}
                CanonicalClaim::Existing(holder) => {
                    let artifact = ArtifactService::deserialize_artifact(Some(&entity))
                        .with_context(|| format!("Unreadable canonical row {}", entity.key))?;
                    let hash = entity.content_hash.clone().unwrap_or_default();
                    debug!(key = %entity.key, %holder, "Content already stored, importing as reference");
                    demoted.insert(entity.key.clone(), holder.clone());
                    service.write_reference(&artifact, entity, &holder, &hash)?;
                    report.demoted += 1;
                }
            }
        } else {
            store.insert(&entity)?;
        }
        report.imported += 1;
    }

    info!(
        imported = report.imported,
        skipped = report.skipped,
        demoted = report.demoted,
        "Imported rows"
    );
    Ok(report)
}
