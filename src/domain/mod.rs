//! Domain types for the artifact store.
//!
//! - Key: hierarchical artifact identifiers
//! - Artifact: the closed set of provenance variants
//! - Entity: the persisted row projection

pub mod artifact;
pub mod entity;
pub mod key;

pub use artifact::{
    AgentResultArtifact, Artifact, ArtifactType, ConfigSnapshotArtifact, EventArtifact,
    EvidenceArtifact, ExecutionArtifact, ExecutionStatus, GroupArtifact, GroupKind, Metadata,
    PromptArtifact, PromptRole, ReferenceArtifact, TemplateArtifact, TemplateReferenceArtifact,
    ToolCallArtifact,
};
pub use entity::{ArtifactEntity, SCHEMA_VERSION};
pub use key::{ArtifactKey, KeyError};
