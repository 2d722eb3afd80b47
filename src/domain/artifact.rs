//! Artifacts recorded during an orchestration run.
//!
//! An artifact is one immutable, typed unit of provenance data. The set of
//! variants is closed; the serde tag (`type`) is the discriminant persisted
//! alongside every row, and deserialization dispatches on it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::key::ArtifactKey;
use crate::core::hashing::hash_content;

/// Free-form annotations; never part of the content hash
pub type Metadata = BTreeMap<String, Value>;

/// Logical artifact type names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Execution,
    Group,
    Prompt,
    ToolCall,
    AgentResult,
    Event,
    Evidence,
    ConfigSnapshot,
    Template,
    Reference,
    TemplateReference,
}

impl ArtifactType {
    /// Stable name persisted in the `artifact_type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Execution => "execution",
            Self::Group => "group",
            Self::Prompt => "prompt",
            Self::ToolCall => "tool_call",
            Self::AgentResult => "agent_result",
            Self::Event => "event",
            Self::Evidence => "evidence",
            Self::ConfigSnapshot => "config_snapshot",
            Self::Template => "template",
            Self::Reference => "reference",
            Self::TemplateReference => "template_reference",
        }
    }

    /// Whether this type stands in for a canonical row stored elsewhere
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference | Self::TemplateReference)
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s {
            "execution" => Self::Execution,
            "group" => Self::Group,
            "prompt" => Self::Prompt,
            "tool_call" => Self::ToolCall,
            "agent_result" => Self::AgentResult,
            "event" => Self::Event,
            "evidence" => Self::Evidence,
            "config_snapshot" => Self::ConfigSnapshot,
            "template" => Self::Template,
            "reference" => Self::Reference,
            "template_reference" => Self::TemplateReference,
            other => return Err(format!("unknown artifact type: {}", other)),
        };
        Ok(parsed)
    }
}

/// Status of an execution root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl Default for ExecutionStatus {
    fn default() -> Self {
        Self::Running
    }
}

/// Kind of structural grouping node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Agent,
    Step,
    Phase,
    Branch,
    Custom(String),
}

/// Speaker of a rendered prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

/// One orchestration run; always at a root key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionArtifact {
    pub key: ArtifactKey,
    pub run_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ArtifactKey>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

/// Grouping node without an independently hashable payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupArtifact {
    pub key: ArtifactKey,
    pub kind: GroupKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ArtifactKey>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptArtifact {
    pub key: ArtifactKey,
    pub role: PromptRole,
    pub text: String,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallArtifact {
    pub key: ArtifactKey,
    pub tool_name: String,
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResultArtifact {
    pub key: ArtifactKey,
    pub agent: String,
    pub output: String,
    pub success: bool,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventArtifact {
    pub key: ArtifactKey,
    pub name: String,
    pub payload: Value,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceArtifact {
    pub key: ArtifactKey,
    pub source: String,
    pub excerpt: String,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshotArtifact {
    pub key: ArtifactKey,
    pub name: String,
    pub config: Value,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

/// Named, versioned content such as a prompt template.
///
/// The content hash covers only `content`; `name` and `version` identify the
/// template independently of what it contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateArtifact {
    pub key: ArtifactKey,
    pub name: String,
    pub version: u32,
    pub content: String,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

/// Pointer to a canonical row holding the full payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceArtifact {
    pub key: ArtifactKey,
    pub target_type: ArtifactType,
    pub canonical_key: ArtifactKey,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

/// Pointer to a canonical template row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateReferenceArtifact {
    pub key: ArtifactKey,
    pub name: String,
    pub version: u32,
    pub canonical_key: ArtifactKey,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

/// An artifact of any variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Artifact {
    Execution(ExecutionArtifact),
    Group(GroupArtifact),
    Prompt(PromptArtifact),
    ToolCall(ToolCallArtifact),
    AgentResult(AgentResultArtifact),
    Event(EventArtifact),
    Evidence(EvidenceArtifact),
    ConfigSnapshot(ConfigSnapshotArtifact),
    Template(TemplateArtifact),
    Reference(ReferenceArtifact),
    TemplateReference(TemplateReferenceArtifact),
}

// Applies the same expression to whichever variant struct is present.
macro_rules! each_variant {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            Artifact::Execution($inner) => $body,
            Artifact::Group($inner) => $body,
            Artifact::Prompt($inner) => $body,
            Artifact::ToolCall($inner) => $body,
            Artifact::AgentResult($inner) => $body,
            Artifact::Event($inner) => $body,
            Artifact::Evidence($inner) => $body,
            Artifact::ConfigSnapshot($inner) => $body,
            Artifact::Template($inner) => $body,
            Artifact::Reference($inner) => $body,
            Artifact::TemplateReference($inner) => $body,
        }
    };
}

impl Artifact {
    /// Create an execution root
    pub fn execution(key: ArtifactKey, run_id: impl Into<String>) -> Self {
        Self::Execution(ExecutionArtifact {
            key,
            run_id: run_id.into(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            children: Vec::new(),
            metadata: Metadata::new(),
        })
    }

    /// Create a structural group
    pub fn group(key: ArtifactKey, kind: GroupKind, name: impl Into<String>) -> Self {
        Self::Group(GroupArtifact {
            key,
            kind,
            name: name.into(),
            content_hash: None,
            children: Vec::new(),
            metadata: Metadata::new(),
        })
    }

    /// Create a rendered prompt
    pub fn prompt(key: ArtifactKey, role: PromptRole, text: impl Into<String>) -> Self {
        let text = text.into();
        let content_hash = hash_content(
            ArtifactType::Prompt.as_str(),
            &json!({ "role": role, "text": text }),
        );
        Self::Prompt(PromptArtifact {
            key,
            role,
            text,
            content_hash,
            metadata: Metadata::new(),
        })
    }

    /// Create a tool call record
    pub fn tool_call(
        key: ArtifactKey,
        tool_name: impl Into<String>,
        arguments: Value,
        output: Option<Value>,
    ) -> Self {
        let tool_name = tool_name.into();
        let content_hash = hash_content(
            ArtifactType::ToolCall.as_str(),
            &json!({ "tool_name": tool_name, "arguments": arguments, "output": output }),
        );
        Self::ToolCall(ToolCallArtifact {
            key,
            tool_name,
            arguments,
            output,
            content_hash,
            metadata: Metadata::new(),
        })
    }

    /// Create an agent result
    pub fn agent_result(
        key: ArtifactKey,
        agent: impl Into<String>,
        output: impl Into<String>,
        success: bool,
    ) -> Self {
        let agent = agent.into();
        let output = output.into();
        let content_hash = hash_content(
            ArtifactType::AgentResult.as_str(),
            &json!({ "agent": agent, "output": output, "success": success }),
        );
        Self::AgentResult(AgentResultArtifact {
            key,
            agent,
            output,
            success,
            content_hash,
            metadata: Metadata::new(),
        })
    }

    /// Create an event record
    pub fn event(key: ArtifactKey, name: impl Into<String>, payload: Value) -> Self {
        let name = name.into();
        let content_hash = hash_content(
            ArtifactType::Event.as_str(),
            &json!({ "name": name, "payload": payload }),
        );
        Self::Event(EventArtifact {
            key,
            name,
            payload,
            content_hash,
            metadata: Metadata::new(),
        })
    }

    /// Create an evidence excerpt
    pub fn evidence(key: ArtifactKey, source: impl Into<String>, excerpt: impl Into<String>) -> Self {
        let source = source.into();
        let excerpt = excerpt.into();
        let content_hash = hash_content(
            ArtifactType::Evidence.as_str(),
            &json!({ "source": source, "excerpt": excerpt }),
        );
        Self::Evidence(EvidenceArtifact {
            key,
            source,
            excerpt,
            content_hash,
            metadata: Metadata::new(),
        })
    }

    /// Create a configuration snapshot
    pub fn config_snapshot(key: ArtifactKey, name: impl Into<String>, config: Value) -> Self {
        let name = name.into();
        let content_hash = hash_content(
            ArtifactType::ConfigSnapshot.as_str(),
            &json!({ "name": name, "config": config }),
        );
        Self::ConfigSnapshot(ConfigSnapshotArtifact {
            key,
            name,
            config,
            content_hash,
            metadata: Metadata::new(),
        })
    }

    /// Create a versioned template
    pub fn template(
        key: ArtifactKey,
        name: impl Into<String>,
        version: u32,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let content_hash = hash_content(
            ArtifactType::Template.as_str(),
            &json!({ "content": content }),
        );
        Self::Template(TemplateArtifact {
            key,
            name: name.into(),
            version,
            content,
            content_hash,
            metadata: Metadata::new(),
        })
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, name: impl Into<String>, value: Value) -> Self {
        self.metadata_mut().insert(name.into(), value);
        self
    }

    /// Replace the computed content hash (for producers that hash upstream).
    ///
    /// Has no effect on execution roots, which never carry a hash.
    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        let hash = hash.into();
        match &mut self {
            Self::Execution(_) => {}
            Self::Group(g) => g.content_hash = Some(hash),
            Self::Prompt(a) => a.content_hash = hash,
            Self::ToolCall(a) => a.content_hash = hash,
            Self::AgentResult(a) => a.content_hash = hash,
            Self::Event(a) => a.content_hash = hash,
            Self::Evidence(a) => a.content_hash = hash,
            Self::ConfigSnapshot(a) => a.content_hash = hash,
            Self::Template(a) => a.content_hash = hash,
            Self::Reference(a) => a.content_hash = hash,
            Self::TemplateReference(a) => a.content_hash = hash,
        }
        self
    }

    pub fn key(&self) -> &ArtifactKey {
        each_variant!(self, a => &a.key)
    }

    /// Content hash, if this variant has one
    pub fn content_hash(&self) -> Option<&str> {
        match self {
            Self::Execution(_) => None,
            Self::Group(g) => g.content_hash.as_deref(),
            Self::Prompt(a) => Some(&a.content_hash),
            Self::ToolCall(a) => Some(&a.content_hash),
            Self::AgentResult(a) => Some(&a.content_hash),
            Self::Event(a) => Some(&a.content_hash),
            Self::Evidence(a) => Some(&a.content_hash),
            Self::ConfigSnapshot(a) => Some(&a.content_hash),
            Self::Template(a) => Some(&a.content_hash),
            Self::Reference(a) => Some(&a.content_hash),
            Self::TemplateReference(a) => Some(&a.content_hash),
        }
    }

    pub fn metadata(&self) -> &Metadata {
        each_variant!(self, a => &a.metadata)
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        each_variant!(self, a => &mut a.metadata)
    }

    /// Physical variant type
    pub fn artifact_type(&self) -> ArtifactType {
        match self {
            Self::Execution(_) => ArtifactType::Execution,
            Self::Group(_) => ArtifactType::Group,
            Self::Prompt(_) => ArtifactType::Prompt,
            Self::ToolCall(_) => ArtifactType::ToolCall,
            Self::AgentResult(_) => ArtifactType::AgentResult,
            Self::Event(_) => ArtifactType::Event,
            Self::Evidence(_) => ArtifactType::Evidence,
            Self::ConfigSnapshot(_) => ArtifactType::ConfigSnapshot,
            Self::Template(_) => ArtifactType::Template,
            Self::Reference(_) => ArtifactType::Reference,
            Self::TemplateReference(_) => ArtifactType::TemplateReference,
        }
    }

    /// Type name this artifact is queried by.
    ///
    /// Equal to `artifact_type()` except for references, which report the
    /// type of the content they point at.
    pub fn logical_type(&self) -> ArtifactType {
        match self {
            Self::Reference(r) => r.target_type,
            Self::TemplateReference(_) => ArtifactType::Template,
            other => other.artifact_type(),
        }
    }

    /// Inline child keys carried by structural variants
    pub fn children(&self) -> &[ArtifactKey] {
        match self {
            Self::Execution(e) => &e.children,
            Self::Group(g) => &g.children,
            _ => &[],
        }
    }

    /// Replace the inline child list; ignored by non-structural variants
    pub fn set_children(&mut self, children: Vec<ArtifactKey>) {
        match self {
            Self::Execution(e) => e.children = children,
            Self::Group(g) => g.children = children,
            _ => {}
        }
    }

    /// Logical template name for templated content and template references
    pub fn template_name(&self) -> Option<&str> {
        match self {
            Self::Template(t) => Some(&t.name),
            Self::TemplateReference(t) => Some(&t.name),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        self.artifact_type().is_reference()
    }

    /// Canonical key a reference points at
    pub fn canonical_key(&self) -> Option<&ArtifactKey> {
        match self {
            Self::Reference(r) => Some(&r.canonical_key),
            Self::TemplateReference(t) => Some(&t.canonical_key),
            _ => None,
        }
    }

    /// Point a reference at a different canonical row; no effect on
    /// non-reference variants
    pub fn retarget(&mut self, canonical_key: ArtifactKey) {
        match self {
            Self::Reference(r) => r.canonical_key = canonical_key,
            Self::TemplateReference(t) => t.canonical_key = canonical_key,
            _ => {}
        }
    }

    /// Full copy of this content standing where `pointer` stood.
    ///
    /// Keeps the pointer's key and metadata (and name and version for
    /// templates). `None` when `self` is itself a pointer or `pointer` is not.
    pub fn in_place_of(&self, pointer: &Artifact) -> Option<Artifact> {
        if self.is_reference() || !pointer.is_reference() {
            return None;
        }

        let mut full = self.clone();
        let key = pointer.key().clone();
        each_variant!(&mut full, a => a.key = key);
        *full.metadata_mut() = pointer.metadata().clone();
        full.set_children(Vec::new());

        if let (Self::Template(t), Self::TemplateReference(p)) = (&mut full, pointer) {
            t.name = p.name.clone();
            t.version = p.version;
        }
        Some(full)
    }

    /// Build the pointer that replaces `self` at `new_key` once its content
    /// is stored canonically at `canonical_key`.
    pub fn to_reference(&self, new_key: ArtifactKey, canonical_key: ArtifactKey, content_hash: &str) -> Artifact {
        match self {
            Self::Template(t) => Self::TemplateReference(TemplateReferenceArtifact {
                key: new_key,
                name: t.name.clone(),
                version: t.version,
                canonical_key,
                content_hash: content_hash.to_string(),
                metadata: t.metadata.clone(),
            }),
            Self::TemplateReference(t) => Self::TemplateReference(TemplateReferenceArtifact {
                key: new_key,
                canonical_key,
                content_hash: content_hash.to_string(),
                ..t.clone()
            }),
            other => Self::Reference(ReferenceArtifact {
                key: new_key,
                target_type: other.logical_type(),
                canonical_key,
                content_hash: content_hash.to_string(),
                metadata: other.metadata().clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_ignores_key_and_metadata() {
        let root = ArtifactKey::create_root();
        let a = Artifact::prompt(root.create_child(), PromptRole::User, "summarize this");
        let b = Artifact::prompt(root.create_child(), PromptRole::User, "summarize this")
            .with_metadata("agent", json!("planner"));

        assert_ne!(a.key(), b.key());
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_content_hash_tracks_payload() {
        let root = ArtifactKey::create_root();
        let a = Artifact::prompt(root.create_child(), PromptRole::User, "one");
        let b = Artifact::prompt(root.create_child(), PromptRole::System, "one");
        let c = Artifact::prompt(root.create_child(), PromptRole::User, "two");

        assert_ne!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn test_structural_variants_have_no_hash() {
        let root = ArtifactKey::create_root();
        let exec = Artifact::execution(root.clone(), "run-1");
        let group = Artifact::group(root.create_child(), GroupKind::Agent, "planner");

        assert_eq!(exec.content_hash(), None);
        assert_eq!(group.content_hash(), None);
        assert_eq!(exec.artifact_type(), ArtifactType::Execution);
    }

    #[test]
    fn test_template_hash_is_name_independent() {
        let root = ArtifactKey::create_root();
        let a = Artifact::template(root.create_child(), "summarize", 1, "Summarize: {{input}}");
        let b = Artifact::template(root.create_child(), "digest", 3, "Summarize: {{input}}");

        assert_eq!(a.content_hash(), b.content_hash());
        assert_eq!(a.template_name(), Some("summarize"));
    }

    #[test]
    fn test_reference_keeps_logical_type() {
        let root = ArtifactKey::create_root();
        let canonical = Artifact::tool_call(root.create_child(), "grep", json!({"q": "x"}), None);
        let hash = canonical.content_hash().unwrap().to_string();
        let reference = canonical.to_reference(root.create_child(), canonical.key().clone(), &hash);

        assert_eq!(reference.artifact_type(), ArtifactType::Reference);
        assert_eq!(reference.logical_type(), ArtifactType::ToolCall);
        assert_eq!(reference.canonical_key(), Some(canonical.key()));
        assert_eq!(reference.content_hash(), Some(hash.as_str()));
        assert!(reference.is_reference());
    }

    #[test]
    fn test_template_reference_keeps_name() {
        let root = ArtifactKey::create_root();
        let template = Artifact::template(root.create_child(), "plan", 2, "Plan the work");
        let hash = template.content_hash().unwrap().to_string();
        let reference = template.to_reference(root.create_child(), template.key().clone(), &hash);

        assert_eq!(reference.artifact_type(), ArtifactType::TemplateReference);
        assert_eq!(reference.logical_type(), ArtifactType::Template);
        assert_eq!(reference.template_name(), Some("plan"));
    }

    #[test]
    fn test_content_takes_the_place_of_a_pointer() {
        let root = ArtifactKey::create_root();
        let template = Artifact::template(root.create_child(), "plan", 1, "Plan the work");
        let hash = template.content_hash().unwrap().to_string();
        let pointer = Artifact::template(root.create_child(), "planner", 4, "Plan the work")
            .with_metadata("agent", json!("lead"))
            .to_reference(root.create_child(), template.key().clone(), &hash);

        let full = template.in_place_of(&pointer).unwrap();
        assert_eq!(full.key(), pointer.key());
        assert_eq!(full.content_hash(), Some(hash.as_str()));
        assert_eq!(full.metadata().get("agent"), Some(&json!("lead")));
        match &full {
            Artifact::Template(t) => {
                assert_eq!(t.name, "planner");
                assert_eq!(t.version, 4);
                assert_eq!(t.content, "Plan the work");
            }
            other => panic!("expected a template, got {:?}", other),
        }

        assert_eq!(pointer.in_place_of(&pointer), None);
        assert_eq!(template.in_place_of(&template), None);
    }

    #[test]
    fn test_retarget_moves_only_pointers() {
        let root = ArtifactKey::create_root();
        let prompt = Artifact::prompt(root.create_child(), PromptRole::User, "hi");
        let hash = prompt.content_hash().unwrap().to_string();
        let mut pointer = prompt.to_reference(root.create_child(), prompt.key().clone(), &hash);

        let heir = root.create_child();
        pointer.retarget(heir.clone());
        assert_eq!(pointer.canonical_key(), Some(&heir));

        let mut unchanged = prompt.clone();
        unchanged.retarget(heir);
        assert_eq!(unchanged, prompt);
    }

    #[test]
    fn test_serialization_uses_type_tag() {
        let root = ArtifactKey::create_root();
        let artifact = Artifact::evidence(root.create_child(), "README.md", "line 3");

        let value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(value["type"], "evidence");

        let parsed: Artifact = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, artifact);
    }

    #[test]
    fn test_artifact_type_names_round_trip() {
        for ty in [
            ArtifactType::Execution,
            ArtifactType::Group,
            ArtifactType::Prompt,
            ArtifactType::ToolCall,
            ArtifactType::AgentResult,
            ArtifactType::Event,
            ArtifactType::Evidence,
            ArtifactType::ConfigSnapshot,
            ArtifactType::Template,
            ArtifactType::Reference,
            ArtifactType::TemplateReference,
        ] {
            assert_eq!(ty.as_str().parse::<ArtifactType>(), Ok(ty));
            // serde name and column name agree
            assert_eq!(serde_json::to_value(ty).unwrap(), json!(ty.as_str()));
        }
        assert!("bogus".parse::<ArtifactType>().is_err());
    }
}
