//! Per-execution tree builder.
//!
//! Holds one in-memory trie per execution key. Each trie sits behind its own
//! `RwLock`, so unrelated executions never contend; the registry lock is held
//! only long enough to look up or insert a trie handle.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, instrument, warn};

use super::node::{AddResult, ArtifactNode, ArtifactTree};
use super::service::{ArtifactService, PersistReport};
use crate::domain::{Artifact, ArtifactKey};
use crate::store::StoreResult;

type TreeHandle = Arc<RwLock<ArtifactNode>>;

/// Session façade producers feed artifacts into
pub struct ArtifactTreeBuilder {
    service: ArtifactService,
    trees: RwLock<HashMap<ArtifactKey, TreeHandle>>,
}

impl ArtifactTreeBuilder {
    pub fn new(service: ArtifactService) -> Self {
        Self {
            service,
            trees: RwLock::new(HashMap::new()),
        }
    }

    pub fn service(&self) -> &ArtifactService {
        &self.service
    }

    fn tree(&self, execution_key: &ArtifactKey) -> Option<TreeHandle> {
        self.trees
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(execution_key)
            .cloned()
    }

    /// Add an artifact to an execution's tree; `true` only when attached
    pub fn add_artifact(&self, execution_key: &ArtifactKey, artifact: Artifact) -> bool {
        self.try_add_artifact(execution_key, artifact).is_added()
    }

    /// Add an artifact and report exactly what happened.
    ///
    /// The first root artifact for an unseen execution key starts its tree.
    /// Anything else against an unseen key is `ParentNotFound`.
    pub fn try_add_artifact(&self, execution_key: &ArtifactKey, artifact: Artifact) -> AddResult {
        let handle = match self.tree(execution_key) {
            Some(handle) => handle,
            None => {
                if artifact.key() != execution_key {
                    debug!(%execution_key, key = %artifact.key(), "No tree for execution");
                    return AddResult::ParentNotFound;
                }

                let mut trees = self.trees.write().unwrap_or_else(PoisonError::into_inner);
                if trees.contains_key(execution_key) {
                    // Another producer started the tree in the meantime
                    return AddResult::DuplicateKey;
                }

                let root = match ArtifactNode::create_root(artifact) {
                    Ok(root) => root,
                    Err(e) => {
                        warn!(error = %e, "Rejected execution root");
                        return AddResult::ParentNotFound;
                    }
                };
                trees.insert(execution_key.clone(), Arc::new(RwLock::new(root)));
                debug!(%execution_key, "Started execution tree");
                return AddResult::Added;
            }
        };

        let mut tree = handle.write().unwrap_or_else(PoisonError::into_inner);
        let result = tree.add_artifact(artifact);
        if result == AddResult::ParentNotFound {
            debug!(%execution_key, "Artifact parent not in tree");
        }
        result
    }

    /// Clone of the artifact at `key`, if the execution's tree holds it
    pub fn get_artifact(&self, execution_key: &ArtifactKey, key: &ArtifactKey) -> Option<Artifact> {
        let handle = self.tree(execution_key)?;
        let tree = handle.read().unwrap_or_else(PoisonError::into_inner);
        tree.find_node(key).map(|node| node.artifact().clone())
    }

    /// Every artifact of an execution, pre-order
    pub fn get_execution_artifacts(&self, execution_key: &ArtifactKey) -> Vec<Artifact> {
        let Some(handle) = self.tree(execution_key) else {
            return Vec::new();
        };
        let tree = handle.read().unwrap_or_else(PoisonError::into_inner);
        let artifacts = tree.collect_all().into_iter().cloned().collect();
        artifacts
    }

    /// Whether a direct child of `parent_key` already carries `hash`
    pub fn has_sibling_with_hash(
        &self,
        execution_key: &ArtifactKey,
        parent_key: &ArtifactKey,
        hash: &str,
    ) -> bool {
        let Some(handle) = self.tree(execution_key) else {
            return false;
        };
        let tree = handle.read().unwrap_or_else(PoisonError::into_inner);
        tree.find_node(parent_key)
            .map_or(false, |parent| parent.has_sibling_with_hash(hash))
    }

    /// Nested view of an execution's tree
    pub fn build_artifact_tree(&self, execution_key: &ArtifactKey) -> Option<ArtifactTree> {
        let handle = self.tree(execution_key)?;
        let tree = handle.read().unwrap_or_else(PoisonError::into_inner);
        Some(ArtifactTree::from_node(&tree))
    }

    /// Write the execution's tree to the store.
    ///
    /// The tree stays in memory; call `clear_execution` to release it.
    /// Unknown executions persist nothing.
    #[instrument(skip(self), fields(execution_key = %execution_key))]
    pub fn persist_execution(&self, execution_key: &ArtifactKey) -> StoreResult<PersistReport> {
        let Some(handle) = self.tree(execution_key) else {
            warn!("No tree to persist");
            return Ok(PersistReport::default());
        };

        // Exclusive for the whole pass so no artifact lands mid-grouping
        let tree = handle.write().unwrap_or_else(PoisonError::into_inner);
        self.service.do_persist(execution_key, &tree)
    }

    /// Drop an execution's in-memory tree; `false` if there was none
    pub fn clear_execution(&self, execution_key: &ArtifactKey) -> bool {
        let removed = self
            .trees
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(execution_key)
            .is_some();
        if removed {
            info!(%execution_key, "Cleared execution tree");
        }
        removed
    }

    /// Executions currently held in memory
    pub fn execution_keys(&self) -> Vec<ArtifactKey> {
        let mut keys: Vec<ArtifactKey> = self
            .trees
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Number of artifacts in an execution's tree (0 when unknown)
    pub fn tree_size(&self, execution_key: &ArtifactKey) -> usize {
        let Some(handle) = self.tree(execution_key) else {
            return 0;
        };
        let size = handle.read().unwrap_or_else(PoisonError::into_inner).size();
        size
    }
}
