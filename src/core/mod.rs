//! Core artifact store logic.
//!
//! This module contains:
//! - Hashing: content hashes and synthesized hashes
//! - Node: the in-memory artifact trie
//! - Service: entity mapping, dedup decision, read paths
//! - Builder: per-execution session façade
//! - Export: JSONL export/import

pub mod builder;
pub mod export;
pub mod hashing;
pub mod node;
pub mod service;

// Re-export commonly used types
pub use builder::ArtifactTreeBuilder;
pub use export::{export_execution, import_entities, ImportReport};
pub use hashing::{hash_content, synthesize_hash};
pub use node::{AddResult, ArtifactNode, ArtifactTree, NodeError};
pub use service::{ArtifactService, PersistReport};
