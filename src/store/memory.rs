//! Process-local artifact store.
//!
//! All state sits behind one `RwLock`, which makes `insert_canonical` a
//! trivially atomic claim-if-absent.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use super::{
    promoted_payload, retargeted_payload, ArtifactStore, CanonicalClaim, StoreError, StoreResult,
    StoreStats,
};
use crate::domain::ArtifactEntity;

#[derive(Debug, Default)]
struct State {
    /// Rows by key; `BTreeMap` keeps key order for listings and prefix scans
    rows: BTreeMap<String, ArtifactEntity>,

    /// content hash -> canonical row key
    canonical: HashMap<String, String>,

    /// canonical row key -> referring row keys, in insertion order
    references: HashMap<String, Vec<String>>,
}

impl State {
    fn materialize(&self, row: &ArtifactEntity) -> ArtifactEntity {
        let mut row = row.clone();
        row.referenced_by = self.references.get(&row.key).cloned().unwrap_or_default();
        row
    }

    fn collect<'a>(&self, rows: impl Iterator<Item = &'a ArtifactEntity>) -> Vec<ArtifactEntity> {
        rows.map(|row| self.materialize(row)).collect()
    }

    fn row(&self, key: &str) -> StoreResult<&ArtifactEntity> {
        self.rows.get(key).ok_or_else(|| StoreError::Corrupt {
            key: key.to_string(),
            reason: "linked row is missing".to_string(),
        })
    }

    fn put(&mut self, entity: &ArtifactEntity) -> StoreResult<()> {
        if self.rows.contains_key(&entity.key) {
            return Err(StoreError::AlreadyExists(entity.key.clone()));
        }
        let mut row = entity.clone();
        row.referenced_by.clear();
        self.rows.insert(row.key.clone(), row);
        Ok(())
    }
}

/// Artifact store held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    state: RwLock<State>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn find_by_key(&self, key: &str) -> StoreResult<Option<ArtifactEntity>> {
        let state = self.read();
        Ok(state.rows.get(key).map(|row| state.materialize(row)))
    }

    fn exists_by_key(&self, key: &str) -> StoreResult<bool> {
        Ok(self.read().rows.contains_key(key))
    }

    fn find_canonical_key(&self, hash: &str) -> StoreResult<Option<String>> {
        Ok(self.read().canonical.get(hash).cloned())
    }

    fn insert(&self, entity: &ArtifactEntity) -> StoreResult<()> {
        self.write().put(entity)
    }

    fn insert_canonical(&self, entity: &ArtifactEntity) -> StoreResult<CanonicalClaim> {
        let hash = entity.content_hash.clone().ok_or_else(|| StoreError::Corrupt {
            key: entity.key.clone(),
            reason: "canonical row without content hash".to_string(),
        })?;

        let mut state = self.write();
        if let Some(existing) = state.canonical.get(&hash) {
            return Ok(CanonicalClaim::Existing(existing.clone()));
        }

        state.put(entity)?;
        state.canonical.insert(hash, entity.key.clone());
        Ok(CanonicalClaim::Claimed)
    }

    fn insert_reference(&self, entity: &ArtifactEntity, canonical_key: &str) -> StoreResult<()> {
        let mut state = self.write();
        state.put(entity)?;
        state
            .references
            .entry(canonical_key.to_string())
            .or_default()
            .push(entity.key.clone());
        Ok(())
    }

    fn list_by_execution(&self, execution_key: &str) -> StoreResult<Vec<ArtifactEntity>> {
        let state = self.read();
        Ok(state.collect(
            state
                .rows
                .values()
                .filter(|row| row.execution_key == execution_key),
        ))
    }

    fn list_descendants(&self, key: &str) -> StoreResult<Vec<ArtifactEntity>> {
        let prefix = format!("{}/", key);
        let state = self.read();
        Ok(state.collect(
            state
                .rows
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(_, row)| row),
        ))
    }

    fn list_by_execution_and_type(
        &self,
        execution_key: &str,
        artifact_type: &str,
    ) -> StoreResult<Vec<ArtifactEntity>> {
        let state = self.read();
        Ok(state.collect(state.rows.values().filter(|row| {
            row.execution_key == execution_key && row.artifact_type == artifact_type
        })))
    }

    fn template_history(&self, name: &str) -> StoreResult<Vec<ArtifactEntity>> {
        let state = self.read();
        let mut rows = state.collect(
            state
                .rows
                .values()
                .filter(|row| row.template_name.as_deref() == Some(name)),
        );
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.key.cmp(&a.key)));
        Ok(rows)
    }

    fn list_template_family(&self, prefix: &str) -> StoreResult<Vec<ArtifactEntity>> {
        let state = self.read();
        let mut rows = state.collect(state.rows.values().filter(|row| {
            row.template_name
                .as_deref()
                .map_or(false, |name| name.starts_with(prefix))
        }));
        rows.sort_by(|a, b| {
            a.template_name
                .cmp(&b.template_name)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.key.cmp(&a.key))
        });
        Ok(rows)
    }

    fn list_execution_roots(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<ArtifactEntity>> {
        let state = self.read();
        let mut rows = state.collect(
            state
                .rows
                .values()
                .filter(|row| row.depth == 1 && row.created_at >= from && row.created_at <= to),
        );
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
        Ok(rows)
    }

    fn list_template_names(&self) -> StoreResult<Vec<String>> {
        let state = self.read();
        let mut names: Vec<String> = state
            .rows
            .values()
            .filter_map(|row| row.template_name.clone())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn delete_execution(&self, execution_key: &str) -> StoreResult<usize> {
        let mut guard = self.write();
        let state = &mut *guard;

        let doomed: HashSet<String> = state
            .rows
            .values()
            .filter(|row| row.execution_key == execution_key)
            .map(|row| row.key.clone())
            .collect();

        // Work out every hand-over before touching state, so a corrupt row
        // leaves the store as it was
        let mut handovers = Vec::new();
        for (hash, holder_key) in &state.canonical {
            if !doomed.contains(holder_key) {
                continue;
            }
            let mut survivors = state
                .references
                .get(holder_key)
                .into_iter()
                .flatten()
                .filter(|r| !doomed.contains(*r));
            let Some(heir_key) = survivors.next() else {
                continue;
            };

            let holder = state.row(holder_key)?;
            let heir = state.row(heir_key)?;
            let mut rewrites = vec![(heir_key.clone(), promoted_payload(holder, heir)?)];
            let mut referrers = Vec::new();
            for referrer_key in survivors {
                let referrer = state.row(referrer_key)?;
                rewrites.push((referrer_key.clone(), retargeted_payload(referrer, heir_key)?));
                referrers.push(referrer_key.clone());
            }
            handovers.push((hash.clone(), heir_key.clone(), rewrites, referrers));
        }

        for (hash, heir_key, rewrites, referrers) in handovers {
            for (key, payload) in rewrites {
                if let Some(row) = state.rows.get_mut(&key) {
                    row.payload = Some(payload);
                }
            }
            if let Some(heir) = state.rows.get_mut(&heir_key) {
                heir.is_canonical = true;
            }
            state.canonical.insert(hash, heir_key.clone());
            state.references.insert(heir_key, referrers);
        }

        for key in &doomed {
            state.rows.remove(key);
            state.references.remove(key);
        }
        state.canonical.retain(|_, holder| !doomed.contains(holder));
        for referrers in state.references.values_mut() {
            referrers.retain(|r| !doomed.contains(r));
        }
        state.references.retain(|_, referrers| !referrers.is_empty());

        Ok(doomed.len())
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        let state = self.read();
        let mut stats = StoreStats {
            total_rows: state.rows.len(),
            canonical_rows: state.canonical.len(),
            ..StoreStats::default()
        };

        for row in state.rows.values() {
            if row.depth == 1 {
                stats.executions += 1;
            }
            if row.is_reference_row() {
                stats.reference_rows += 1;
            }
            stats.payload_bytes += row.payload_bytes();
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Artifact, ArtifactKey, PromptRole, SCHEMA_VERSION};

    fn row(key: &str, hash: Option<&str>) -> ArtifactEntity {
        let depth = key.matches('/').count() as u32 + 1;
        ArtifactEntity {
            key: key.to_string(),
            parent_key: key.rfind('/').map(|i| key[..i].to_string()),
            execution_key: key.split('/').next().unwrap().to_string(),
            artifact_type: "prompt".to_string(),
            content_hash: hash.map(str::to_string),
            payload: Some(r#"{"type":"prompt"}"#.to_string()),
            depth,
            template_name: None,
            is_canonical: false,
            schema_version: SCHEMA_VERSION,
            child_keys: Vec::new(),
            referenced_by: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_canonical_claim_is_first_writer_wins() {
        let store = InMemoryArtifactStore::new();

        assert_eq!(
            store.insert_canonical(&row("a/1", Some("h"))).unwrap(),
            CanonicalClaim::Claimed
        );
        assert_eq!(
            store.insert_canonical(&row("b/1", Some("h"))).unwrap(),
            CanonicalClaim::Existing("a/1".to_string())
        );
        assert!(!store.exists_by_key("b/1").unwrap());
        assert_eq!(store.find_canonical_key("h").unwrap(), Some("a/1".to_string()));
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let store = InMemoryArtifactStore::new();
        store.insert(&row("a", None)).unwrap();
        assert!(matches!(
            store.insert(&row("a", None)),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_reference_links_are_materialized() {
        let store = InMemoryArtifactStore::new();
        store.insert_canonical(&row("a/1", Some("h"))).unwrap();
        store.insert_reference(&row("a/2", Some("h")), "a/1").unwrap();

        let canonical = store.find_by_key("a/1").unwrap().unwrap();
        assert_eq!(canonical.referenced_by, vec!["a/2".to_string()]);
    }

    #[test]
    fn test_descendant_prefix_scan() {
        let store = InMemoryArtifactStore::new();
        for key in ["a", "a/1", "a/1/x", "a/2", "ab", "ab/1"] {
            store.insert(&row(key, None)).unwrap();
        }

        let keys: Vec<String> = store
            .list_descendants("a")
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys, vec!["a/1", "a/1/x", "a/2"]);
    }

    fn prompt_row(key: &str, canonical_key: Option<&str>) -> ArtifactEntity {
        let artifact = Artifact::prompt(ArtifactKey::parse(key).unwrap(), PromptRole::User, "shared");
        let hash = artifact.content_hash().unwrap().to_string();
        let payload = match canonical_key {
            Some(target) => {
                let target = ArtifactKey::parse(target).unwrap();
                serde_json::to_string(&artifact.to_reference(artifact.key().clone(), target, &hash))
            }
            None => serde_json::to_string(&artifact),
        };

        let mut entity = row(key, Some(&hash));
        entity.payload = Some(payload.unwrap());
        entity.is_canonical = canonical_key.is_none();
        entity
    }

    fn pointer_target(store: &InMemoryArtifactStore, key: &str) -> Option<String> {
        let payload = store.find_by_key(key).unwrap().unwrap().payload.unwrap();
        let artifact: Artifact = serde_json::from_str(&payload).unwrap();
        artifact.canonical_key().map(ToString::to_string)
    }

    #[test]
    fn test_delete_execution_releases_unreferenced_claims() {
        let store = InMemoryArtifactStore::new();
        store.insert(&row("a", None)).unwrap();
        let canonical = prompt_row("a/1", None);
        let hash = canonical.content_hash.clone().unwrap();
        store.insert_canonical(&canonical).unwrap();
        store.insert_reference(&prompt_row("a/2", Some("a/1")), "a/1").unwrap();
        store.insert(&row("b", None)).unwrap();

        assert_eq!(store.delete_execution("a").unwrap(), 3);
        assert_eq!(store.find_canonical_key(&hash).unwrap(), None);
        assert!(store.read().references.is_empty());
        assert_eq!(store.stats().unwrap().total_rows, 1);
    }

    #[test]
    fn test_delete_execution_hands_content_to_surviving_referrer() {
        let store = InMemoryArtifactStore::new();
        let canonical = prompt_row("a/1", None);
        let hash = canonical.content_hash.clone().unwrap();
        store.insert_canonical(&canonical).unwrap();
        store.insert_reference(&prompt_row("a/2", Some("a/1")), "a/1").unwrap();
        store.insert_reference(&prompt_row("b/1", Some("a/1")), "a/1").unwrap();
        store.insert_reference(&prompt_row("c/1", Some("a/1")), "a/1").unwrap();

        assert_eq!(store.delete_execution("a").unwrap(), 2);

        assert_eq!(store.find_canonical_key(&hash).unwrap(), Some("b/1".to_string()));
        let heir = store.find_by_key("b/1").unwrap().unwrap();
        assert!(heir.is_canonical);
        assert!(!heir.is_reference_row());
        assert_eq!(heir.referenced_by, vec!["c/1".to_string()]);
        assert_eq!(pointer_target(&store, "b/1"), None);
        assert_eq!(pointer_target(&store, "c/1"), Some("b/1".to_string()));
        assert_eq!(store.stats().unwrap().canonical_rows, 1);
    }

    #[test]
    fn test_unreadable_holder_aborts_delete() {
        let store = InMemoryArtifactStore::new();
        store.insert_canonical(&row("a/1", Some("h"))).unwrap();
        store.insert_reference(&row("b/1", Some("h")), "a/1").unwrap();

        assert!(matches!(
            store.delete_execution("a"),
            Err(StoreError::Serialization(_))
        ));
        assert!(store.exists_by_key("a/1").unwrap());
        assert_eq!(store.find_canonical_key("h").unwrap(), Some("a/1".to_string()));
    }
}
