//! Artifact persistence service.
//!
//! Maps artifacts to rows and back, and owns the store-wide dedup decision:
//! for every content hash at most one row carries the full payload, every
//! other occurrence is written as a pointer row.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::hashing::{is_blank, short_hash, synthesize_hash};
use super::node::{ArtifactNode, ArtifactTree};
use crate::domain::{Artifact, ArtifactEntity, ArtifactKey, ArtifactType, SCHEMA_VERSION};
use crate::store::{ArtifactStore, CanonicalClaim, StoreResult, StoreStats};

/// What one `do_persist` pass wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistReport {
    /// Rows written with the full payload as the holder of their hash
    pub canonical: usize,

    /// Rows written as pointers to a canonical row
    pub references: usize,

    /// Rows without a usable hash, written in full under a synthesized hash
    pub unique: usize,

    /// Artifacts whose key was already stored
    pub skipped: usize,

    /// Canonical claims lost to a concurrent writer (included in `references`)
    pub lost_claims: usize,
}

impl PersistReport {
    /// Number of rows written by the pass
    pub fn written(&self) -> usize {
        self.canonical + self.references + self.unique
    }
}

/// Entity mapping, dedup and read paths over an `ArtifactStore`
#[derive(Clone)]
pub struct ArtifactService {
    store: Arc<dyn ArtifactStore>,
}

impl ArtifactService {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Build the row projection of `artifact`.
    ///
    /// `artifact_type` is the logical type, so a reference to a tool call is
    /// still listed as `tool_call`.
    pub fn to_entity(
        &self,
        execution_key: &ArtifactKey,
        artifact: &Artifact,
    ) -> StoreResult<ArtifactEntity> {
        let key = artifact.key();
        let created_at = match artifact {
            Artifact::Execution(e) => e.started_at,
            _ => Utc::now(),
        };

        Ok(ArtifactEntity {
            key: key.to_string(),
            parent_key: key.parent().map(String::from),
            execution_key: execution_key.to_string(),
            artifact_type: artifact.logical_type().as_str().to_string(),
            content_hash: artifact
                .content_hash()
                .filter(|h| !is_blank(Some(*h)))
                .map(str::to_string),
            payload: Some(serde_json::to_string(artifact)?),
            depth: key.depth() as u32,
            template_name: artifact.template_name().map(str::to_string),
            is_canonical: false,
            schema_version: SCHEMA_VERSION,
            child_keys: artifact.children().iter().map(ToString::to_string).collect(),
            referenced_by: Vec::new(),
            created_at,
        })
    }

    /// Persist every artifact of one execution tree.
    ///
    /// Keys that are already stored are skipped, so calling this again after
    /// more artifacts were added writes only the new ones.
    #[instrument(skip(self, root), fields(execution_key = %execution_key))]
    pub fn do_persist(
        &self,
        execution_key: &ArtifactKey,
        root: &ArtifactNode,
    ) -> StoreResult<PersistReport> {
        let mut report = PersistReport::default();

        let mut nodes = Vec::with_capacity(root.size());
        root.walk(&mut |node| nodes.push(node));

        // hash -> members in pre-order
        let mut groups: BTreeMap<String, Vec<(&Artifact, ArtifactEntity)>> = BTreeMap::new();

        for node in nodes {
            let artifact = node.artifact();
            if self.store.exists_by_key(artifact.key().as_str())? {
                report.skipped += 1;
                continue;
            }

            let mut entity = self.to_entity(execution_key, artifact)?;
            entity.child_keys = node.child_keys().iter().map(ToString::to_string).collect();

            if let Some(canonical_key) = artifact.canonical_key() {
                self.store.insert_reference(&entity, canonical_key.as_str())?;
                report.references += 1;
                continue;
            }

            match entity.content_hash.clone() {
                Some(hash) => groups.entry(hash).or_default().push((artifact, entity)),
                None => {
                    entity.content_hash = Some(synthesize_hash(&entity.key));
                    self.store.insert(&entity)?;
                    report.unique += 1;
                }
            }
        }

        for (hash, members) in groups {
            let mut members = members.into_iter();

            let canonical_key = match self.store.find_canonical_key(&hash)? {
                Some(existing) => existing,
                None => {
                    let Some((artifact, mut entity)) = members.next() else {
                        continue;
                    };
                    entity.is_canonical = true;

                    match self.store.insert_canonical(&entity)? {
                        CanonicalClaim::Claimed => {
                            debug!(hash = short_hash(&hash), key = %entity.key, "Claimed canonical");
                            report.canonical += 1;
                            entity.key
                        }
                        CanonicalClaim::Existing(holder) => {
                            debug!(hash = short_hash(&hash), %holder, "Lost canonical claim");
                            self.write_reference(artifact, entity, &holder, &hash)?;
                            report.references += 1;
                            report.lost_claims += 1;
                            holder
                        }
                    }
                }
            };

            for (artifact, entity) in members {
                self.write_reference(artifact, entity, &canonical_key, &hash)?;
                report.references += 1;
            }
        }

        info!(
            canonical = report.canonical,
            references = report.references,
            unique = report.unique,
            skipped = report.skipped,
            "Persisted execution"
        );
        Ok(report)
    }

    /// Write `entity` with its payload swapped for a pointer at `canonical_key`
    pub(crate) fn write_reference(
        &self,
        artifact: &Artifact,
        mut entity: ArtifactEntity,
        canonical_key: &str,
        hash: &str,
    ) -> StoreResult<()> {
        let pointer = artifact.to_reference(
            artifact.key().clone(),
            ArtifactKey::parse(canonical_key)?,
            hash,
        );
        entity.payload = Some(serde_json::to_string(&pointer)?);
        entity.is_canonical = false;
        self.store.insert_reference(&entity, canonical_key)
    }

    /// Reference artifact at `new_key` for content already stored under
    /// `hash`, or `None` when no canonical row holds it yet
    pub fn decorate_duplicate(
        &self,
        hash: &str,
        new_key: ArtifactKey,
    ) -> StoreResult<Option<Artifact>> {
        let Some(canonical_key) = self.store.find_canonical_key(hash)? else {
            return Ok(None);
        };

        let entity = self.store.find_by_key(&canonical_key)?;
        let Some(canonical) = Self::deserialize_artifact(entity.as_ref()) else {
            return Ok(None);
        };

        Ok(Some(canonical.to_reference(
            new_key,
            ArtifactKey::parse(canonical_key)?,
            hash,
        )))
    }

    /// Parse a stored row back into an artifact.
    ///
    /// Never fails: a missing row, missing payload or unparsable payload
    /// yields `None`.
    pub fn deserialize_artifact(entity: Option<&ArtifactEntity>) -> Option<Artifact> {
        let entity = entity?;

        let Some(payload) = entity.payload.as_deref() else {
            warn!(key = %entity.key, "Artifact row has no payload");
            return None;
        };

        let artifact: Artifact = match serde_json::from_str(payload) {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(key = %entity.key, error = %e, "Skipping unreadable artifact row");
                return None;
            }
        };

        if artifact.key().as_str() != entity.key {
            warn!(
                key = %entity.key,
                payload_key = %artifact.key(),
                "Artifact payload does not match its row key"
            );
            return None;
        }

        Some(artifact)
    }

    /// Load the artifact stored at `key` as written (pointer rows stay pointers)
    pub fn load_artifact(&self, key: &ArtifactKey) -> StoreResult<Option<Artifact>> {
        let entity = self.store.find_by_key(key.as_str())?;
        Ok(Self::deserialize_artifact(entity.as_ref()))
    }

    /// Load the content stored at `key`, following a pointer row to its
    /// canonical row
    pub fn resolve(&self, key: &ArtifactKey) -> StoreResult<Option<Artifact>> {
        match self.load_artifact(key)? {
            Some(artifact) => match artifact.canonical_key() {
                Some(canonical_key) => self.load_artifact(canonical_key),
                None => Ok(Some(artifact)),
            },
            None => Ok(None),
        }
    }

    /// Keys of every pointer row that reuses the content held at `key`
    pub fn usages(&self, key: &ArtifactKey) -> StoreResult<Vec<ArtifactKey>> {
        let Some(entity) = self.store.find_by_key(key.as_str())? else {
            return Ok(Vec::new());
        };

        let keys = entity
            .referenced_by
            .into_iter()
            .map(ArtifactKey::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Rebuild the nested tree of a persisted execution.
    ///
    /// Returns `None` when the execution root is missing or unreadable.
    /// Unreadable rows below the root are left out, and so is everything
    /// beneath them.
    #[instrument(skip(self), fields(execution_key = %execution_key))]
    pub fn load_execution_tree(
        &self,
        execution_key: &ArtifactKey,
    ) -> StoreResult<Option<ArtifactTree>> {
        let rows = self.store.list_by_execution(execution_key.as_str())?;

        let root_row = rows.iter().find(|row| row.key == execution_key.as_str());
        let Some(root_artifact) = Self::deserialize_artifact(root_row) else {
            return Ok(None);
        };
        let root = match ArtifactNode::create_root(root_artifact) {
            Ok(root) => root,
            Err(e) => {
                warn!(error = %e, "Stored execution root is not at a root key");
                return Ok(None);
            }
        };

        let below = rows.iter().filter(|row| row.key != execution_key.as_str());
        Ok(Some(Self::rebuild(root, below)))
    }

    /// Rebuild the branch rooted at `key` from a descendant range scan.
    ///
    /// Works at any depth; at a root key it yields the whole execution.
    #[instrument(skip(self), fields(key = %key, execution_key = %key.root()))]
    pub fn load_subtree(&self, key: &ArtifactKey) -> StoreResult<Option<ArtifactTree>> {
        let entity = self.store.find_by_key(key.as_str())?;
        let Some(top) = Self::deserialize_artifact(entity.as_ref()) else {
            return Ok(None);
        };

        let rows = self.store.list_descendants(key.as_str())?;
        Ok(Some(Self::rebuild(ArtifactNode::create_subtree(top), rows.iter())))
    }

    fn rebuild<'a>(
        mut top: ArtifactNode,
        rows: impl Iterator<Item = &'a ArtifactEntity>,
    ) -> ArtifactTree {
        // Rows come back in key order, so parents precede their children
        for row in rows {
            let Some(artifact) = Self::deserialize_artifact(Some(row)) else {
                continue;
            };
            let result = top.add_artifact(artifact);
            if !result.is_added() {
                debug!(key = %row.key, ?result, "Row not attached to rebuilt tree");
            }
        }

        ArtifactTree::from_node(&top)
    }

    /// Execution roots started within `[from, to]`, oldest first
    pub fn list_executions(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Artifact>> {
        let rows = self.store.list_execution_roots(from, to)?;
        Ok(rows
            .iter()
            .filter_map(|row| Self::deserialize_artifact(Some(row)))
            .collect())
    }

    /// Artifacts of one logical type within an execution, pointer rows included
    pub fn list_by_type(
        &self,
        execution_key: &ArtifactKey,
        artifact_type: ArtifactType,
    ) -> StoreResult<Vec<Artifact>> {
        let rows = self
            .store
            .list_by_execution_and_type(execution_key.as_str(), artifact_type.as_str())?;
        Ok(rows
            .iter()
            .filter_map(|row| Self::deserialize_artifact(Some(row)))
            .collect())
    }

    /// Every stored occurrence of template `name`, newest first
    pub fn template_history(&self, name: &str) -> StoreResult<Vec<Artifact>> {
        let rows = self.store.template_history(name)?;
        Ok(rows
            .iter()
            .filter_map(|row| Self::deserialize_artifact(Some(row)))
            .collect())
    }

    pub fn template_names(&self) -> StoreResult<Vec<String>> {
        self.store.list_template_names()
    }

    /// Drop every row of an execution.
    ///
    /// Content still referenced from other executions survives: the first
    /// referrer becomes its canonical holder and the rest point there.
    #[instrument(skip(self), fields(execution_key = %execution_key))]
    pub fn delete_execution(&self, execution_key: &ArtifactKey) -> StoreResult<usize> {
        let removed = self.store.delete_execution(execution_key.as_str())?;
        info!(removed, "Deleted execution");
        Ok(removed)
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        self.store.stats()
    }
}
