//! Concurrency Integration Tests
//!
//! Many executions persisting the same brand-new content at once must still
//! leave exactly one canonical row.

use std::sync::Arc;

use strata::config::StoreSettings;
use strata::core::{ArtifactService, ArtifactTreeBuilder};
use strata::domain::{Artifact, ArtifactKey, PromptRole};
use strata::store::{ArtifactStore, InMemoryArtifactStore, SqliteArtifactStore};
use tempfile::TempDir;

const WRITERS: usize = 8;

/// Fill and persist one execution per writer, all sharing one prompt body
async fn race(builders: Vec<Arc<ArtifactTreeBuilder>>) -> Vec<ArtifactKey> {
    let mut handles = Vec::new();
    for (i, builder) in builders.into_iter().enumerate() {
        handles.push(tokio::task::spawn_blocking(move || {
            let root = ArtifactKey::create_root();
            builder.add_artifact(&root, Artifact::execution(root.clone(), format!("run-{}", i)));
            let prompt = Artifact::prompt(root.create_child(), PromptRole::System, "shared system prompt");
            let key = prompt.key().clone();
            assert!(builder.add_artifact(&root, prompt));
            builder.persist_execution(&root).unwrap();
            key
        }));
    }

    let mut keys = Vec::new();
    for handle in handles {
        keys.push(handle.await.unwrap());
    }
    keys
}

fn assert_single_canonical(store: &dyn ArtifactStore, keys: &[ArtifactKey]) {
    let rows: Vec<_> = keys
        .iter()
        .map(|k| store.find_by_key(k.as_str()).unwrap().unwrap())
        .collect();

    let canonical: Vec<_> = rows.iter().filter(|r| r.is_canonical).collect();
    assert_eq!(canonical.len(), 1);
    assert_eq!(canonical[0].referenced_by.len(), keys.len() - 1);
    assert_eq!(
        rows.iter().filter(|r| r.is_reference_row()).count(),
        keys.len() - 1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_builder_races_on_memory_store() {
    let store = Arc::new(InMemoryArtifactStore::new());
    let builder = Arc::new(ArtifactTreeBuilder::new(ArtifactService::new(store.clone())));

    let keys = race(vec![builder.clone(); WRITERS]).await;

    assert_eq!(builder.execution_keys().len(), WRITERS);
    assert_single_canonical(store.as_ref(), &keys);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_separate_connections_race_on_one_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("artifacts.sqlite");
    let settings = StoreSettings::default();

    // One connection per writer, as separate processes would have
    let builders: Vec<Arc<ArtifactTreeBuilder>> = (0..WRITERS)
        .map(|_| {
            let store = Arc::new(SqliteArtifactStore::open(&path, &settings).unwrap());
            Arc::new(ArtifactTreeBuilder::new(ArtifactService::new(store)))
        })
        .collect();

    let keys = race(builders).await;

    let reader = SqliteArtifactStore::open(&path, &settings).unwrap();
    assert_single_canonical(&reader, &keys);
    assert_eq!(reader.stats().unwrap().executions, WRITERS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_adds_to_one_execution_from_many_tasks() {
    let builder = Arc::new(ArtifactTreeBuilder::new(ArtifactService::new(Arc::new(
        InMemoryArtifactStore::new(),
    ))));
    let root = ArtifactKey::create_root();
    builder.add_artifact(&root, Artifact::execution(root.clone(), "fan-out"));

    let mut handles = Vec::new();
    for i in 0..32 {
        let builder = builder.clone();
        let root = root.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let event = Artifact::event(root.create_child(), "tick", serde_json::json!(i));
            builder.add_artifact(&root, event)
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    assert_eq!(builder.tree_size(&root), 33);
    let report = builder.persist_execution(&root).unwrap();
    assert_eq!(report.canonical, 32);
    assert_eq!(report.unique, 1);
}
