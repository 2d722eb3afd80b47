//! strata - Content-deduplicating provenance store for agent runs
//!
//! Records the full provenance tree of an orchestration run (prompts, tool
//! calls, agent results, templates, configuration snapshots) and stores each
//! distinct piece of content at most once, across every run in the store.
//!
//! # Architecture
//!
//! - Artifacts are placed in a per-execution trie by hierarchical key; a
//!   child can only be attached below a parent that already exists
//! - Persisting a trie groups artifacts by content hash: the first holder of
//!   a hash gets the full payload, every other occurrence becomes a pointer
//! - Pointer rows keep the logical type of the content they stand in for
//!
//! # Modules
//!
//! - `domain`: Data structures (ArtifactKey, Artifact, ArtifactEntity)
//! - `core`: Trie, persistence service, tree builder, JSONL export
//! - `store`: Storage boundary (in-memory and SQLite)
//! - `config`: Configuration discovery
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # List recent executions
//! strata executions
//!
//! # Print one execution's provenance tree
//! strata tree <execution-key>
//!
//! # Show an artifact, following a reference to its content
//! strata show <key> --resolve
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod store;

// Re-export main types at crate root for convenience
pub use crate::core::{AddResult, ArtifactNode, ArtifactService, ArtifactTree, ArtifactTreeBuilder, PersistReport};
pub use domain::{Artifact, ArtifactEntity, ArtifactKey, ArtifactType};
pub use store::{ArtifactStore, InMemoryArtifactStore, SqliteArtifactStore, StoreError};
