//! The hybrid query engine blends semantic similarity with a lexical
//! name-match ladder; when two candidates carry identical embeddings the
//! exact name match must outrank the unrelated one, and view presets must
//! project only the fields they promise.

use felix_index::{
    Component, ComponentId, ComponentStore, ComponentType, Embedding, EmbeddingStore, EngineConfig,
    EntityKind, FelixStore, LocalEmbeddingService, Location, MetaRecord, MetadataStore, QueryEngine,
    QueryRequest, TimestampPair, ValidatedTag, ValidatedTitle, ViewPreset,
};
use std::sync::Arc;
use tempfile::TempDir;

fn function_component(path: &str, name: &str) -> Component {
    let location = Location::point(1, 0);
    Component {
        id: ComponentId::for_structural(path, name, &ComponentType::Function, &location),
        name: name.to_string(),
        component_type: ComponentType::Function,
        language: "typescript".to_string(),
        file_path: path.to_string(),
        location,
        parent_id: None,
        code: None,
        metadata: Default::default(),
    }
}

fn flat_embedding(kind: EntityKind, entity_id: &str) -> Embedding {
    Embedding {
        entity_kind: kind,
        entity_id: entity_id.to_string(),
        vector: vec![1.0, 0.0, 0.0, 0.0],
        model_id: "test".to_string(),
        content_hash: "fixed".to_string(),
    }
}

#[tokio::test]
async fn exact_name_match_outranks_unrelated_candidate_at_equal_similarity() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap());

    let login = function_component("src/auth/login.ts", "loginHandler");
    let login_id = login.id.clone();
    store.put_component(login).await.unwrap();
    store.put_embedding(flat_embedding(EntityKind::Component, login_id.as_str())).await.unwrap();

    let footer = function_component("src/ui/footer.ts", "renderFooter");
    let footer_id = footer.id.clone();
    store.put_component(footer).await.unwrap();
    store.put_embedding(flat_embedding(EntityKind::Component, footer_id.as_str())).await.unwrap();

    let engine = QueryEngine::new(store.clone(), Arc::new(LocalEmbeddingService::new(4)));
    let request = QueryRequest {
        raw: Some("loginHandler".to_string()),
        entity_types: vec![EntityKind::Component],
        view: ViewPreset::Full,
        ..QueryRequest::default()
    };

    let hits = engine.query(&request).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].entity_id, login_id.as_str());
    assert!(hits[0].score > hits[1].score);
}

fn rule_record(id: &str, title: &str, analytics_score: f64) -> MetaRecord {
    let mut metadata = felix_index::MetadataBag::new();
    metadata.insert("analytics_score", analytics_score);
    MetaRecord {
        id: id.to_string(),
        kind: EntityKind::Rule,
        parent_id: None,
        depth_level: 0,
        sort_order: 0,
        title: ValidatedTitle::new(title).unwrap(),
        content: String::new(),
        tags: Vec::<ValidatedTag>::new(),
        entity_links: Vec::new(),
        metadata,
        timestamps: TimestampPair::new(0, 0).unwrap(),
        workflow: None,
    }
}

#[tokio::test]
async fn rule_analytics_score_lifts_otherwise_tied_candidates() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap());

    let low = rule_record("rule-low", "retry policy", 0.0);
    store.put_record(low).await.unwrap();
    store
        .put_embedding(flat_embedding(EntityKind::Rule, "rule-low"))
        .await
        .unwrap();

    let high = rule_record("rule-high", "retry policy", 1.0);
    store.put_record(high).await.unwrap();
    store
        .put_embedding(flat_embedding(EntityKind::Rule, "rule-high"))
        .await
        .unwrap();

    let engine = QueryEngine::new(store.clone(), Arc::new(LocalEmbeddingService::new(4)));
    let request = QueryRequest {
        raw: Some("retry policy".to_string()),
        entity_types: vec![EntityKind::Rule],
        view: ViewPreset::Full,
        ..QueryRequest::default()
    };

    let hits = engine.query(&request).await.unwrap();
    assert_eq!(hits.len(), 2);
    let high_hit = hits.iter().find(|h| h.entity_id == "rule-high").unwrap();
    let low_hit = hits.iter().find(|h| h.entity_id == "rule-low").unwrap();
    assert!(high_hit.score > low_hit.score);
}

#[tokio::test]
async fn include_skeleton_attaches_signature_rendering_to_component_hits() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap());

    let component = function_component("src/auth/login.ts", "loginHandler");
    let id = component.id.clone();
    store.put_component(component).await.unwrap();
    store.put_embedding(flat_embedding(EntityKind::Component, id.as_str())).await.unwrap();

    let engine = QueryEngine::new(store.clone(), Arc::new(LocalEmbeddingService::new(4)));
    let request = QueryRequest {
        raw: Some("loginHandler".to_string()),
        entity_types: vec![EntityKind::Component],
        view: ViewPreset::Full,
        include_skeleton: true,
        ..QueryRequest::default()
    };

    let hits = engine.query(&request).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].skeleton.is_some());
    assert!(hits[0].skeleton.as_ref().unwrap().contains("loginHandler"));
}

#[tokio::test]
async fn legacy_scoring_ignores_name_match_and_ties_equal_similarity_candidates() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap());

    let login = function_component("src/auth/login.ts", "loginHandler");
    let login_id = login.id.clone();
    store.put_component(login).await.unwrap();
    store.put_embedding(flat_embedding(EntityKind::Component, login_id.as_str())).await.unwrap();

    let footer = function_component("src/ui/footer.ts", "renderFooter");
    let footer_id = footer.id.clone();
    store.put_component(footer).await.unwrap();
    store.put_embedding(flat_embedding(EntityKind::Component, footer_id.as_str())).await.unwrap();

    let mut config = EngineConfig::default();
    config.search_new_scoring = false;
    let engine = QueryEngine::new(store.clone(), Arc::new(LocalEmbeddingService::new(4))).with_config(&config);
    let request = QueryRequest {
        raw: Some("loginHandler".to_string()),
        entity_types: vec![EntityKind::Component],
        view: ViewPreset::Full,
        ..QueryRequest::default()
    };

    let hits = engine.query(&request).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].score, hits[1].score);
}

#[tokio::test]
async fn ids_view_preset_drops_name_and_location() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap());

    let component = function_component("src/auth/login.ts", "loginHandler");
    let id = component.id.clone();
    store.put_component(component).await.unwrap();
    store.put_embedding(flat_embedding(EntityKind::Component, id.as_str())).await.unwrap();

    let engine = QueryEngine::new(store.clone(), Arc::new(LocalEmbeddingService::new(4)));
    let request = QueryRequest {
        raw: Some("loginHandler".to_string()),
        entity_types: vec![EntityKind::Component],
        view: ViewPreset::Ids,
        ..QueryRequest::default()
    };

    let hits = engine.query(&request).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].name.is_none());
    assert!(hits[0].file_path.is_none());
    assert!(hits[0].location.is_none());
}
