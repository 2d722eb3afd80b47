//! Tree Builder Integration Tests
//!
//! Structural placement rules of the per-execution trie, driven through the
//! public builder API.

use std::sync::Arc;

use serde_json::json;
use strata::core::{AddResult, ArtifactService, ArtifactTreeBuilder};
use strata::domain::{Artifact, ArtifactKey, GroupKind, PromptRole};
use strata::store::InMemoryArtifactStore;

fn builder() -> ArtifactTreeBuilder {
    ArtifactTreeBuilder::new(ArtifactService::new(Arc::new(InMemoryArtifactStore::new())))
}

fn start(builder: &ArtifactTreeBuilder) -> ArtifactKey {
    let key = ArtifactKey::create_root();
    assert!(builder.add_artifact(&key, Artifact::execution(key.clone(), "run")));
    key
}

#[test]
fn test_size_counts_added_insertions() {
    let builder = builder();
    let exec = start(&builder);

    let phase = exec.create_child();
    let agent = phase.create_child();
    let attempts = vec![
        Artifact::group(phase.clone(), GroupKind::Phase, "plan"),
        Artifact::group(agent.clone(), GroupKind::Agent, "planner"),
        Artifact::prompt(agent.create_child(), PromptRole::System, "You plan."),
        Artifact::group(phase.clone(), GroupKind::Phase, "plan"),
        Artifact::evidence(exec.create_child().create_child(), "x", "y"),
        Artifact::tool_call(agent.create_child(), "read_file", json!({"path": "a"}), None),
    ];

    let mut added = 0;
    for artifact in attempts {
        let key = artifact.key().clone();
        let result = builder.try_add_artifact(&exec, artifact.clone());
        if result.is_added() {
            added += 1;
            assert_eq!(builder.get_artifact(&exec, &key), Some(artifact));
        }
    }

    assert_eq!(added, 4);
    assert_eq!(builder.tree_size(&exec), 1 + added);
}

#[test]
fn test_same_hash_under_same_parent() {
    let builder = builder();
    let root = start(&builder);

    let a = Artifact::prompt(root.create_child(), PromptRole::User, "h1");
    let b = Artifact::prompt(root.create_child(), PromptRole::User, "h1");
    let hash = a.content_hash().unwrap().to_string();

    assert!(!builder.has_sibling_with_hash(&root, &root, &hash));
    assert!(builder.add_artifact(&root, a));
    assert!(builder.has_sibling_with_hash(&root, &root, &hash));
    assert!(builder.add_artifact(&root, b));
    assert_eq!(builder.tree_size(&root), 3);
}

#[test]
fn test_same_hash_in_different_branches_is_not_a_sibling() {
    let builder = builder();
    let root = start(&builder);
    let left = root.create_child();
    let right = root.create_child();
    builder.add_artifact(&root, Artifact::group(left.clone(), GroupKind::Branch, "left"));
    builder.add_artifact(&root, Artifact::group(right.clone(), GroupKind::Branch, "right"));

    let deep = Artifact::evidence(left.create_child(), "lib.rs", "fn a()");
    let hash = deep.content_hash().unwrap().to_string();
    assert!(builder.add_artifact(&root, deep));
    assert!(builder.has_sibling_with_hash(&root, &left, &hash));
    assert!(!builder.has_sibling_with_hash(&root, &right, &hash));

    let twin = Artifact::evidence(right.create_child(), "lib.rs", "fn a()");
    assert!(builder.add_artifact(&root, twin));
    assert!(builder.has_sibling_with_hash(&root, &right, &hash));
    assert!(!builder.has_sibling_with_hash(&root, &root, &hash));

    let shallow = Artifact::evidence(root.create_child(), "lib.rs", "fn a()");
    assert!(builder.add_artifact(&root, shallow));
    assert!(builder.has_sibling_with_hash(&root, &root, &hash));
}

#[test]
fn test_grandchild_without_parent() {
    let builder = builder();
    let root = start(&builder);
    let missing_parent = root.create_child();
    let grandchild = Artifact::event(missing_parent.create_child(), "tick", json!(1));

    assert_eq!(
        builder.try_add_artifact(&root, grandchild),
        AddResult::ParentNotFound
    );
    assert_eq!(builder.tree_size(&root), 1);
}

#[test]
fn test_redelivered_artifacts_are_duplicates() {
    let builder = builder();
    let root = start(&builder);
    let event = Artifact::event(root.create_child(), "agent_started", json!({"agent": "coder"}));

    assert_eq!(builder.try_add_artifact(&root, event.clone()), AddResult::Added);
    assert_eq!(builder.try_add_artifact(&root, event), AddResult::DuplicateKey);
    assert_eq!(
        builder.try_add_artifact(&root, Artifact::execution(root.clone(), "again")),
        AddResult::DuplicateKey
    );
    assert_eq!(builder.tree_size(&root), 2);
}

#[test]
fn test_build_tree_nests_children() {
    let builder = builder();
    let root = start(&builder);
    let step = root.create_child();
    let first = step.create_child();
    let second = step.create_child();
    builder.add_artifact(&root, Artifact::group(step.clone(), GroupKind::Step, "implement"));
    builder.add_artifact(&root, Artifact::prompt(first.clone(), PromptRole::User, "go"));
    builder.add_artifact(&root, Artifact::agent_result(second.clone(), "coder", "done", true));

    let tree = builder.build_artifact_tree(&root).unwrap();
    assert_eq!(tree.size(), 4);
    assert_eq!(tree.children.len(), 1);

    let step_tree = &tree.children[0];
    assert_eq!(step_tree.artifact.key(), &step);
    assert_eq!(step_tree.artifact.children(), &[first.clone(), second.clone()]);
    let keys: Vec<&ArtifactKey> = step_tree.children.iter().map(|c| c.artifact.key()).collect();
    assert_eq!(keys, vec![&first, &second]);

    assert_eq!(builder.get_execution_artifacts(&root).len(), 4);
}
