//! Persisted projection of an artifact.
//!
//! One entity is one row at the storage boundary. `artifact_type` always holds
//! the logical type name, even when `payload` is a reference pointer rather
//! than the full content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current row layout version
pub const SCHEMA_VERSION: u32 = 1;

/// A stored artifact row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEntity {
    /// Unique artifact key
    pub key: String,

    /// Parent key (None only at depth 1)
    pub parent_key: Option<String>,

    /// Execution (root key) this row belongs to
    pub execution_key: String,

    /// Logical type name, stable across canonical/reference transformation
    pub artifact_type: String,

    /// Content hash (synthesized for content-less artifacts)
    pub content_hash: Option<String>,

    /// Serialized artifact JSON: full content, or a reference pointer
    pub payload: Option<String>,

    /// Number of key segments
    pub depth: u32,

    /// Logical template name for templated content
    pub template_name: Option<String>,

    /// Whether this row is the single full-payload holder for its hash
    pub is_canonical: bool,

    /// Row layout version
    pub schema_version: u32,

    /// Direct child keys, in key order
    #[serde(default)]
    pub child_keys: Vec<String>,

    /// Keys of reference rows pointing at this one
    #[serde(default)]
    pub referenced_by: Vec<String>,

    /// When the row was produced
    pub created_at: DateTime<Utc>,
}

impl ArtifactEntity {
    /// Whether the payload is a pointer to another row
    pub fn is_reference_row(&self) -> bool {
        self.payload
            .as_deref()
            .and_then(|p| serde_json::from_str::<serde_json::Value>(p).ok())
            .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
            .map_or(false, |tag| tag == "reference" || tag == "template_reference")
    }

    /// Size of the stored payload in bytes
    pub fn payload_bytes(&self) -> usize {
        self.payload.as_ref().map_or(0, String::len)
    }
}
