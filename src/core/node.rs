//! In-memory artifact trie.
//!
//! Each node owns its children in a map keyed by `ArtifactKey`. Lookup walks
//! the key's ancestor chain from the root, so a node can only ever be
//! attached below a parent that is already present.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::domain::{Artifact, ArtifactKey};

/// Outcome of inserting an artifact into a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    /// Attached under its parent
    Added,

    /// An artifact with this key is already present (safe to ignore)
    DuplicateKey,

    /// The parent chain is incomplete; nothing was attached
    ParentNotFound,
}

impl AddResult {
    pub fn is_added(&self) -> bool {
        matches!(self, Self::Added)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("Tree root must have a root key, got {0}")]
    NotARootKey(ArtifactKey),
}

/// One artifact plus the subtree below it
#[derive(Debug, Clone)]
pub struct ArtifactNode {
    artifact: Artifact,
    children: BTreeMap<ArtifactKey, ArtifactNode>,
}

impl ArtifactNode {
    /// Start a new tree at a root-form key
    pub fn create_root(artifact: Artifact) -> Result<Self, NodeError> {
        if !artifact.key().is_root() {
            return Err(NodeError::NotARootKey(artifact.key().clone()));
        }
        Ok(Self::leaf(artifact))
    }

    /// Start a tree at any key, for rebuilding one branch of an execution
    pub fn create_subtree(artifact: Artifact) -> Self {
        Self::leaf(artifact)
    }

    fn leaf(artifact: Artifact) -> Self {
        Self {
            artifact,
            children: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &ArtifactKey {
        self.artifact.key()
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Direct children in key order
    pub fn children(&self) -> impl Iterator<Item = &ArtifactNode> {
        self.children.values()
    }

    /// Keys of the direct children in key order
    pub fn child_keys(&self) -> Vec<ArtifactKey> {
        self.children.keys().cloned().collect()
    }

    /// Insert an artifact somewhere below this node
    pub fn add_artifact(&mut self, artifact: Artifact) -> AddResult {
        let key = artifact.key().clone();
        if &key == self.key() {
            return AddResult::DuplicateKey;
        }

        let Some(parent_key) = key.parent() else {
            return AddResult::ParentNotFound;
        };

        let Some(parent) = self.find_node_mut(&parent_key) else {
            return AddResult::ParentNotFound;
        };

        if parent.children.contains_key(&key) {
            return AddResult::DuplicateKey;
        }

        parent.children.insert(key, Self::leaf(artifact));
        AddResult::Added
    }

    /// Whether any direct child of this node carries `hash`.
    ///
    /// Only this node's children are checked; identical content in another
    /// branch is not a sibling.
    pub fn has_sibling_with_hash(&self, hash: &str) -> bool {
        self.children
            .values()
            .any(|child| child.artifact.content_hash() == Some(hash))
    }

    /// Find the node at `key` within this subtree
    pub fn find_node(&self, key: &ArtifactKey) -> Option<&ArtifactNode> {
        if key == self.key() {
            return Some(self);
        }

        let mut node = self;
        for step in key.path_from(self.key())? {
            node = node.children.get(&step)?;
        }
        Some(node)
    }

    fn find_node_mut(&mut self, key: &ArtifactKey) -> Option<&mut ArtifactNode> {
        if key == self.key() {
            return Some(self);
        }

        let path = key.path_from(self.key())?;
        let mut node = self;
        for step in path {
            node = node.children.get_mut(&step)?;
        }
        Some(node)
    }

    /// All artifacts in this subtree, pre-order
    pub fn collect_all(&self) -> Vec<&Artifact> {
        let mut out = Vec::with_capacity(self.size());
        self.walk(&mut |node| out.push(&node.artifact));
        out
    }

    /// Visit every node in this subtree, pre-order
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a ArtifactNode)) {
        visit(self);
        for child in self.children.values() {
            child.walk(visit);
        }
    }

    /// Number of artifacts in this subtree, including this node
    pub fn size(&self) -> usize {
        1 + self.children.values().map(ArtifactNode::size).sum::<usize>()
    }
}

/// Nested artifact graph with children populated.
///
/// Structural variants also get their inline child list filled from the
/// tree shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactTree {
    pub artifact: Artifact,
    pub children: Vec<ArtifactTree>,
}

impl ArtifactTree {
    pub fn from_node(node: &ArtifactNode) -> Self {
        let mut artifact = node.artifact.clone();
        if !node.children.is_empty() {
            artifact.set_children(node.child_keys());
        }

        Self {
            artifact,
            children: node.children.values().map(Self::from_node).collect(),
        }
    }

    /// Number of artifacts in this graph
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(ArtifactTree::size).sum::<usize>()
    }

    /// Depth-first search by key
    pub fn find(&self, key: &ArtifactKey) -> Option<&ArtifactTree> {
        if self.artifact.key() == key {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(key))
    }
}
