//! Component/relationship/embedding/metadata storage for one project.
//! In-memory `DashMap` indices (read concurrency) behind a single-writer
//! mailbox (write serialization), snapshotted to the persisted layout
//! described in spec §6.4 (`<project>/.felix/{index,metadata}.db`).
//! Grounded on the teacher's `FileStorage` (in-memory map + disk
//! persistence) and `RetryableStorage` (the retry schedule now owned by
//! [`write_lane`]).

pub mod write_lane;

use crate::config::EngineConfig;
use crate::contracts::{
    ComponentFilter, ComponentStore, EmbeddingStore, MetadataKvStore, MetadataStore, Paging, RelationshipFilter,
    RelationshipStore,
};
use crate::error::{FelixError, Result};
use crate::types::{
    Component, ComponentId, Embedding, EntityKind, MetaRecord, Relationship, RelationshipId, Target,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use write_lane::{JobOutcome, WriteLane};

struct State {
    components: DashMap<ComponentId, Component>,
    relationships: DashMap<RelationshipId, Relationship>,
    embeddings: DashMap<(EntityKind, String), Embedding>,
    meta_records: DashMap<String, MetaRecord>,
    task_depth_cache: DashMap<String, u32>,
    metadata_kv: DashMap<String, String>,
}

impl State {
    fn new() -> Self {
        Self {
            components: DashMap::new(),
            relationships: DashMap::new(),
            embeddings: DashMap::new(),
            meta_records: DashMap::new(),
            task_depth_cache: DashMap::new(),
            metadata_kv: DashMap::new(),
        }
    }
}

/// A project's storage handle. Cheap to clone — all mutation flows through
/// the shared write lane.
#[derive(Clone)]
pub struct FelixStore {
    state: Arc<State>,
    write_lane: Arc<WriteLane<State>>,
    db_path: PathBuf,
}

#[derive(serde::Serialize, serde::Deserialize, Default)]
struct IndexSnapshot {
    components: Vec<Component>,
    relationships: Vec<Relationship>,
    embeddings: Vec<Embedding>,
    metadata_kv: Vec<(String, String)>,
}

#[derive(serde::Serialize, serde::Deserialize, Default)]
struct MetadataSnapshot {
    records: Vec<MetaRecord>,
    task_depths: Vec<(String, u32)>,
}

impl FelixStore {
    pub async fn open(db_path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&db_path)
            .await
            .map_err(|e| FelixError::Store(anyhow::anyhow!(e)))?;

        let state = Arc::new(State::new());
        load_index_snapshot(&db_path, &state).await?;
        load_metadata_snapshot(&db_path, &state).await?;

        let write_lane = Arc::new(WriteLane::new(state.clone(), config));
        Ok(Self {
            state,
            write_lane,
            db_path,
        })
    }

    /// The project-local directory this store persists under
    /// (`<project>/.felix`).
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Flush both snapshots to disk. Called by the orchestrator at the end
    /// of a run and periodically by `reconcile`.
    pub async fn flush(&self) -> Result<()> {
        save_index_snapshot(&self.db_path, &self.state).await?;
        save_metadata_snapshot(&self.db_path, &self.state).await?;
        Ok(())
    }

    pub fn get_metadata_kv(&self, key: &str) -> Option<String> {
        self.state.metadata_kv.get(key).map(|v| v.clone())
    }

    pub async fn set_metadata_kv(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        self.write_lane
            .submit("set_metadata_kv", move |state| {
                let key = key.clone();
                let value = value.clone();
                Box::pin(async move {
                    state.metadata_kv.insert(key, value);
                    JobOutcome::Ok
                })
            })
            .await
    }
}

async fn load_index_snapshot(db_path: &Path, state: &State) -> Result<()> {
    let path = db_path.join("index.db");
    if !path.exists() {
        return Ok(());
    }
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| FelixError::Store(anyhow::anyhow!(e)))?;
    let snapshot: IndexSnapshot =
        serde_json::from_str(&content).map_err(|e| FelixError::Store(anyhow::anyhow!(e)))?;
    for c in snapshot.components {
        state.components.insert(c.id.clone(), c);
    }
    for r in snapshot.relationships {
        state.relationships.insert(r.id.clone(), r);
    }
    for e in snapshot.embeddings {
        state.embeddings.insert((e.entity_kind, e.entity_id.clone()), e);
    }
    for (k, v) in snapshot.metadata_kv {
        state.metadata_kv.insert(k, v);
    }
    Ok(())
}

async fn save_index_snapshot(db_path: &Path, state: &State) -> Result<()> {
    let snapshot = IndexSnapshot {
        components: state.components.iter().map(|e| e.value().clone()).collect(),
        relationships: state.relationships.iter().map(|e| e.value().clone()).collect(),
        embeddings: state.embeddings.iter().map(|e| e.value().clone()).collect(),
        metadata_kv: state
            .metadata_kv
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect(),
    };
    let content = serde_json::to_string(&snapshot).map_err(|e| FelixError::Store(anyhow::anyhow!(e)))?;
    tokio::fs::write(db_path.join("index.db"), content)
        .await
        .map_err(|e| FelixError::Store(anyhow::anyhow!(e)))
}

async fn load_metadata_snapshot(db_path: &Path, state: &State) -> Result<()> {
    let path = db_path.join("metadata.db");
    if !path.exists() {
        return Ok(());
    }
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| FelixError::Store(anyhow::anyhow!(e)))?;
    let snapshot: MetadataSnapshot =
        serde_json::from_str(&content).map_err(|e| FelixError::Store(anyhow::anyhow!(e)))?;
    for r in snapshot.records {
        state.meta_records.insert(r.id.clone(), r);
    }
    for (id, depth) in snapshot.task_depths {
        state.task_depth_cache.insert(id, depth);
    }
    Ok(())
}

async fn save_metadata_snapshot(db_path: &Path, state: &State) -> Result<()> {
    let snapshot = MetadataSnapshot {
        records: state.meta_records.iter().map(|e| e.value().clone()).collect(),
        task_depths: state
            .task_depth_cache
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect(),
    };
    let content = serde_json::to_string(&snapshot).map_err(|e| FelixError::Store(anyhow::anyhow!(e)))?;
    tokio::fs::write(db_path.join("metadata.db"), content)
        .await
        .map_err(|e| FelixError::Store(anyhow::anyhow!(e)))
}

#[async_trait]
impl ComponentStore for FelixStore {
    async fn put_component(&self, component: Component) -> Result<()> {
        self.write_lane
            .submit("put_component", move |state| {
                let component = component.clone();
                Box::pin(async move {
                    state.components.insert(component.id.clone(), component);
                    JobOutcome::Ok
                })
            })
            .await
    }

    async fn get_component(&self, id: &ComponentId) -> Result<Option<Component>> {
        Ok(self.state.components.get(id).map(|e| e.value().clone()))
    }

    async fn remove_components_for_path(&self, path: &str) -> Result<Vec<ComponentId>> {
        let path = path.to_string();
        let removed: Arc<std::sync::Mutex<Vec<ComponentId>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let removed_for_job = removed.clone();

        self.write_lane
            .submit("remove_components_for_path", move |state| {
                let path = path.clone();
                let removed = removed_for_job.clone();
                Box::pin(async move {
                    let ids: Vec<ComponentId> = state
                        .components
                        .iter()
                        .filter(|e| e.value().file_path == path)
                        .map(|e| e.key().clone())
                        .collect();
                    for id in &ids {
                        state.components.remove(id);
                    }
                    // Only drop relationships *owned* by the removed file (their
                    // source component is gone). A relationship merely pointing at
                    // one of these ids from elsewhere is left dangling on purpose:
                    // the resolver's next pass downgrades it back to a sentinel
                    // target instead of silently deleting someone else's edge.
                    state.relationships.retain(|_, r| !ids.contains(&r.source_id));
                    *removed.lock().unwrap() = ids;
                    JobOutcome::Ok
                })
            })
            .await?;

        let ids = removed.lock().unwrap().clone();
        Ok(ids)
    }

    async fn components_for_path(&self, path: &str) -> Result<Vec<Component>> {
        Ok(self
            .state
            .components
            .iter()
            .filter(|e| e.value().file_path == path)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn all_components(&self) -> Result<Vec<Component>> {
        Ok(self.state.components.iter().map(|e| e.value().clone()).collect())
    }

    async fn search_components(&self, filter: &ComponentFilter, paging: Paging) -> Result<Vec<Component>> {
        let mut matched: Vec<Component> = self
            .state
            .components
            .iter()
            .map(|e| e.value().clone())
            .filter(|c| filter.matches(c))
            .collect();
        matched.sort_by(|a, b| (a.file_path.as_str(), a.name.as_str()).cmp(&(b.file_path.as_str(), b.name.as_str())));
        Ok(paging.apply(&matched))
    }
}

#[async_trait]
impl RelationshipStore for FelixStore {
    async fn put_relationship(&self, relationship: Relationship) -> Result<()> {
        self.write_lane
            .submit("put_relationship", move |state| {
                let relationship = relationship.clone();
                Box::pin(async move {
                    match state.relationships.get_mut(&relationship.id) {
                        Some(mut existing) => existing.metadata.merge_shallow(&relationship.metadata),
                        None => {
                            state.relationships.insert(relationship.id.clone(), relationship);
                        }
                    }
                    JobOutcome::Ok
                })
            })
            .await
    }

    async fn relationships_from(&self, source_id: &ComponentId) -> Result<Vec<Relationship>> {
        Ok(self
            .state
            .relationships
            .iter()
            .filter(|e| &e.value().source_id == source_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn relationships_to(&self, target_id: &ComponentId) -> Result<Vec<Relationship>> {
        Ok(self
            .state
            .relationships
            .iter()
            .filter(|e| matches!(&e.value().target, Target::Resolved(t) if t == target_id))
            .map(|e| e.value().clone())
            .collect())
    }

    async fn unresolved_relationships(&self) -> Result<Vec<Relationship>> {
        Ok(self
            .state
            .relationships
            .iter()
            .filter(|e| e.value().target.is_sentinel())
            .map(|e| e.value().clone())
            .collect())
    }

    async fn all_relationships(&self) -> Result<Vec<Relationship>> {
        Ok(self.state.relationships.iter().map(|e| e.value().clone()).collect())
    }

    async fn search_relationships(&self, filter: &RelationshipFilter) -> Result<Vec<Relationship>> {
        Ok(self
            .state
            .relationships
            .iter()
            .map(|e| e.value().clone())
            .filter(|r| filter.matches(r))
            .collect())
    }
}

#[async_trait]
impl MetadataStore for FelixStore {
    async fn put_record(&self, record: MetaRecord) -> Result<()> {
        self.write_lane
            .submit("put_record", move |state| {
                let record = record.clone();
                Box::pin(async move {
                    let depth = record.depth_level;
                    let id = record.id.clone();
                    state.meta_records.insert(id.clone(), record);
                    state.task_depth_cache.insert(id, depth);
                    JobOutcome::Ok
                })
            })
            .await
    }

    async fn get_record(&self, id: &str) -> Result<Option<MetaRecord>> {
        Ok(self.state.meta_records.get(id).map(|e| e.value().clone()))
    }

    async fn remove_record(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.write_lane
            .submit("remove_record", move |state| {
                let id = id.clone();
                Box::pin(async move {
                    state.meta_records.remove(&id);
                    state.task_depth_cache.remove(&id);
                    JobOutcome::Ok
                })
            })
            .await
    }

    async fn records_by_kind(&self, kind: EntityKind) -> Result<Vec<MetaRecord>> {
        Ok(self
            .state
            .meta_records
            .iter()
            .filter(|e| e.value().kind == kind)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn task_depth(&self, id: &str) -> Result<u32> {
        if let Some(depth) = self.state.task_depth_cache.get(id) {
            return Ok(*depth);
        }
        Ok(self
            .state
            .meta_records
            .get(id)
            .map(|e| e.value().depth_level)
            .unwrap_or(0))
    }
}

#[async_trait]
impl EmbeddingStore for FelixStore {
    async fn put_embedding(&self, embedding: Embedding) -> Result<()> {
        self.write_lane
            .submit("put_embedding", move |state| {
                let embedding = embedding.clone();
                Box::pin(async move {
                    state
                        .embeddings
                        .insert((embedding.entity_kind, embedding.entity_id.clone()), embedding);
                    JobOutcome::Ok
                })
            })
            .await
    }

    async fn get_embedding(&self, kind: EntityKind, entity_id: &str) -> Result<Option<Embedding>> {
        Ok(self
            .state
            .embeddings
            .get(&(kind, entity_id.to_string()))
            .map(|e| e.value().clone()))
    }

    async fn embeddings_of_kind(&self, kind: EntityKind) -> Result<Vec<Embedding>> {
        Ok(self
            .state
            .embeddings
            .iter()
            .filter(|e| e.key().0 == kind)
            .map(|e| e.value().clone())
            .collect())
    }
}

#[async_trait]
impl MetadataKvStore for FelixStore {
    fn get_metadata_kv(&self, key: &str) -> Option<String> {
        FelixStore::get_metadata_kv(self, key)
    }

    async fn set_metadata_kv(&self, key: String, value: String) -> Result<()> {
        FelixStore::set_metadata_kv(self, key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ComponentType, Location, RelationshipType};
    use tempfile::TempDir;

    fn sample_component(path: &str, name: &str) -> Component {
        let location = Location::point(1, 0);
        let id = ComponentId::for_structural(path, name, &ComponentType::Function, &location);
        Component {
            id,
            name: name.to_string(),
            component_type: ComponentType::Function,
            language: "rust".to_string(),
            file_path: path.to_string(),
            location,
            parent_id: None,
            code: None,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn put_and_get_component_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap();
        let component = sample_component("a.rs", "foo");
        let id = component.id.clone();

        store.put_component(component).await.unwrap();
        let fetched = store.get_component(&id).await.unwrap();
        assert!(fetched.is_some());
        assert_eq!(fetched.unwrap().name, "foo");
    }

    #[tokio::test]
    async fn remove_components_for_path_also_drops_owned_relationships() {
        let tmp = TempDir::new().unwrap();
        let store = FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap();
        let component = sample_component("a.rs", "foo");
        let id = component.id.clone();
        store.put_component(component).await.unwrap();

        let relationship = Relationship::new(id.clone(), RelationshipType::Calls, Target::ResolveByName("bar".into()));
        store.put_relationship(relationship).await.unwrap();

        let removed = store.remove_components_for_path("a.rs").await.unwrap();
        assert_eq!(removed, vec![id.clone()]);
        assert!(store.get_component(&id).await.unwrap().is_none());
        assert!(store.relationships_from(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn removing_a_target_component_leaves_the_incoming_relationship_dangling() {
        let tmp = TempDir::new().unwrap();
        let store = FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap();
        let target = sample_component("a.rs", "foo");
        let target_id = target.id.clone();
        store.put_component(target).await.unwrap();

        let caller = sample_component("b.rs", "caller");
        let caller_id = caller.id.clone();
        store.put_component(caller).await.unwrap();
        store
            .put_relationship(Relationship::new(
                caller_id.clone(),
                RelationshipType::Calls,
                Target::Resolved(target_id.clone()),
            ))
            .await
            .unwrap();

        store.remove_components_for_path("a.rs").await.unwrap();

        let rels = store.relationships_from(&caller_id).await.unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].target, Target::Resolved(target_id));
    }

    #[tokio::test]
    async fn relationship_upsert_merges_metadata_instead_of_duplicating() {
        let tmp = TempDir::new().unwrap();
        let store = FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap();
        let component = sample_component("a.rs", "foo");
        let id = component.id.clone();
        store.put_component(component).await.unwrap();

        let mut first = Relationship::new(id.clone(), RelationshipType::Calls, Target::ResolveByName("bar".into()));
        first.metadata.insert("confidence", 0.5);
        store.put_relationship(first).await.unwrap();

        let mut second = Relationship::new(id.clone(), RelationshipType::Calls, Target::ResolveByName("bar".into()));
        second.metadata.insert("confidence", 0.9);
        store.put_relationship(second).await.unwrap();

        let rels = store.relationships_from(&id).await.unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].metadata.get("confidence").and_then(|v| v.as_f64()), Some(0.9));
    }

    #[tokio::test]
    async fn snapshot_round_trips_across_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap();
            store.put_component(sample_component("a.rs", "foo")).await.unwrap();
            store.flush().await.unwrap();
        }
        let reopened = FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap();
        let found = reopened.components_for_path("a.rs").await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn unresolved_relationships_reports_sentinel_targets_only() {
        let tmp = TempDir::new().unwrap();
        let store = FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap();
        let component = sample_component("a.rs", "foo");
        let id = component.id.clone();
        store.put_component(component).await.unwrap();

        store
            .put_relationship(Relationship::new(
                id.clone(),
                RelationshipType::Calls,
                Target::ResolveByName("bar".into()),
            ))
            .await
            .unwrap();
        store
            .put_relationship(Relationship::new(id, RelationshipType::Calls, Target::External("lodash".into())))
            .await
            .unwrap();

        let unresolved = store.unresolved_relationships().await.unwrap();
        assert_eq!(unresolved.len(), 2);
    }

    #[tokio::test]
    async fn search_components_filters_by_type_and_pages_deterministically() {
        let tmp = TempDir::new().unwrap();
        let store = FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap();
        store.put_component(sample_component("b.rs", "beta")).await.unwrap();
        store.put_component(sample_component("a.rs", "alpha")).await.unwrap();
        let mut not_a_fn = sample_component("a.rs", "zzz");
        not_a_fn.component_type = ComponentType::Class;
        store.put_component(not_a_fn).await.unwrap();

        let filter = ComponentFilter {
            component_type: Some(ComponentType::Function),
            ..Default::default()
        };
        let found = store.search_components(&filter, Paging::default()).await.unwrap();
        assert_eq!(found.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["alpha", "beta"]);

        let first_page = store.search_components(&filter, Paging::new(0, 1)).await.unwrap();
        assert_eq!(first_page.len(), 1);
        assert_eq!(first_page[0].name, "alpha");

        let second_page = store.search_components(&filter, Paging::new(1, 1)).await.unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].name, "beta");
    }

    #[tokio::test]
    async fn search_components_matches_name_substring_case_insensitively() {
        let tmp = TempDir::new().unwrap();
        let store = FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap();
        store.put_component(sample_component("a.rs", "ParseWidget")).await.unwrap();
        store.put_component(sample_component("a.rs", "other")).await.unwrap();

        let filter = ComponentFilter {
            name_contains: Some("widget".to_string()),
            ..Default::default()
        };
        let found = store.search_components(&filter, Paging::default()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "ParseWidget");
    }

    #[tokio::test]
    async fn search_relationships_filters_by_type_and_unresolved_only() {
        let tmp = TempDir::new().unwrap();
        let store = FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap();
        let component = sample_component("a.rs", "foo");
        let id = component.id.clone();
        store.put_component(component).await.unwrap();

        store
            .put_relationship(Relationship::new(
                id.clone(),
                RelationshipType::Calls,
                Target::ResolveByName("bar".into()),
            ))
            .await
            .unwrap();
        store
            .put_relationship(Relationship::new(id.clone(), RelationshipType::Contains, Target::External("lodash".into())))
            .await
            .unwrap();

        let calls_only = store
            .search_relationships(&RelationshipFilter {
                relationship_type: Some(RelationshipType::Calls),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(calls_only.len(), 1);

        let unresolved_only = store
            .search_relationships(&RelationshipFilter {
                unresolved_only: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(unresolved_only.len(), 2);
    }
}
