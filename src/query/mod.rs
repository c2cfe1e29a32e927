//! Hybrid semantic + lexical query engine (spec §4.9): dual-channel parsing,
//! per-entity-type semantic fan-out, z-score-normalized re-ranking blended
//! with a name-match ladder and context overlap, path demotion, merge, and
//! view-preset projection. Lens-based subgraph expansion lives in
//! [`lens`] for context-building callers.
//!
//! Grounded on the teacher's `semantic_search::SemanticSearchEngine`
//! (embed → fan-out → score) and `relationship_query` (lens/traversal
//! shape), generalized from a single document type to four entity kinds
//! and from the teacher's HNSW `VectorIndex` to a brute-force scan —
//! adequate at the per-project scale this engine targets and far simpler
//! than reimplementing HNSW from scratch.

pub mod lens;
pub mod parse;
pub mod similarity;

use crate::contracts::{ComponentStore, EmbeddingService, EmbeddingStore, MetadataStore, RelationshipStore};
use crate::error::Result;
use crate::observability;
use crate::types::{EntityKind, Location};
use std::sync::Arc;

const DEMOTION_PATTERNS: &[&str] = &["coverage", "lcov", "node_modules", ".min.", "dist/", "build/"];
const DEMOTION_PENALTY: f32 = 0.2;
const WEIGHT_SIMILARITY: f32 = 0.5;
const WEIGHT_NAME_MATCH: f32 = 0.3;
const WEIGHT_CONTEXT: f32 = 0.2;
/// Rule entities may carry an `analytics_score` metadata field (e.g. how
/// often a rule fired in past runs); it contributes to the score only for
/// `EntityKind::Rule` candidates.
const WEIGHT_ANALYTICS: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPreset {
    Ids,
    Names,
    Files,
    FilesLines,
    Full,
}

impl ViewPreset {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "ids" => ViewPreset::Ids,
            "names" => ViewPreset::Names,
            "files" => ViewPreset::Files,
            "files+lines" | "files_lines" => ViewPreset::FilesLines,
            _ => ViewPreset::Full,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    /// Component-type names, normalized lower-case (spec: "normalized
    /// lower-case").
    pub component_types: Vec<String>,
    /// Language names after alias resolution (`ts`→`typescript`, …).
    pub languages: Vec<String>,
    pub path_include: Vec<String>,
    pub path_exclude: Vec<String>,
}

fn normalize_language(lang: &str) -> String {
    match lang.to_ascii_lowercase().as_str() {
        "ts" | "tsx" => "typescript".to_string(),
        "py" => "python".to_string(),
        "rs" => "rust".to_string(),
        "js" | "jsx" => "javascript".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub raw: Option<String>,
    pub core_override: Option<String>,
    pub context_override: Option<String>,
    pub entity_types: Vec<EntityKind>,
    pub limit: usize,
    pub max_per_type: Option<usize>,
    pub min_similarity: f32,
    pub filters: QueryFilters,
    pub view: ViewPreset,
    /// Attach a skeleton rendering (signature + child member signatures)
    /// to component hits (spec §4.9 projection).
    pub include_skeleton: bool,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            raw: None,
            core_override: None,
            context_override: None,
            entity_types: vec![EntityKind::Component, EntityKind::Task, EntityKind::Note, EntityKind::Rule],
            limit: 20,
            max_per_type: None,
            min_similarity: 0.0,
            filters: QueryFilters::default(),
            view: ViewPreset::Full,
            include_skeleton: false,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryHit {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub score: f32,
    pub name: Option<String>,
    pub file_path: Option<String>,
    pub location: Option<Location>,
    pub skeleton: Option<String>,
}

struct Candidate {
    entity_kind: EntityKind,
    entity_id: String,
    similarity: f32,
    vector: Vec<f32>,
    name: String,
    component_type: Option<String>,
    language: Option<String>,
    file_path: Option<String>,
    location: Option<Location>,
    analytics_score: f32,
}

pub struct QueryEngine<S> {
    store: Arc<S>,
    embedding_service: Arc<dyn EmbeddingService>,
    /// When `false`, `query` falls back to a legacy single-score re-rank
    /// (raw similarity only) instead of the z-score-normalized blend
    /// (`config::EngineConfig::search_new_scoring`, spec §4.9).
    search_new_scoring: bool,
}

impl<S> QueryEngine<S>
where
    S: ComponentStore + RelationshipStore + MetadataStore + EmbeddingStore + Send + Sync + 'static,
{
    pub fn new(store: Arc<S>, embedding_service: Arc<dyn EmbeddingService>) -> Self {
        Self {
            store,
            embedding_service,
            search_new_scoring: true,
        }
    }

    pub fn with_config(mut self, config: &crate::config::EngineConfig) -> Self {
        self.search_new_scoring = config.search_new_scoring;
        self
    }

    pub async fn query(&self, request: &QueryRequest) -> Result<Vec<QueryHit>> {
        observability::record_query_executed();

        let mut parsed = parse::parse_dual_channel(request.raw.as_deref().unwrap_or(""));
        parsed = parse::apply_overrides(parsed, request.core_override.as_deref(), request.context_override.as_deref());

        let core_vector = self
            .embedding_service
            .embed_batch(&[parsed.core.clone()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let context_vector = match parsed.context_and_topics_text() {
            Some(text) => self.embedding_service.embed_batch(&[text]).await?.into_iter().next(),
            None => None,
        };

        let fan_out_k = request.limit.max(50);
        let mut all_hits: Vec<(EntityKind, QueryHit)> = Vec::new();

        for &kind in &request.entity_types {
            let embeddings = self.store.embeddings_of_kind(kind).await?;
            if embeddings.is_empty() {
                continue;
            }

            let mut candidates = Vec::with_capacity(embeddings.len());
            for embedding in embeddings {
                let similarity = similarity::cosine(&core_vector, &embedding.vector);
                if similarity < request.min_similarity {
                    continue;
                }
                if let Some(candidate) = self.hydrate_candidate(kind, embedding, similarity).await? {
                    candidates.push(candidate);
                }
            }

            candidates.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
            candidates.truncate(fan_out_k);
            let candidates: Vec<Candidate> = candidates
                .into_iter()
                .filter(|c| passes_hard_filters(c, &request.filters))
                .collect();

            let similarities: Vec<f32> = candidates.iter().map(|c| c.similarity).collect();
            let normalized = similarity::z_score_then_clip(&similarities);

            let skeletons: std::collections::HashMap<String, String> =
                if request.include_skeleton && kind == EntityKind::Component {
                    self.skeletons_for(&candidates).await?
                } else {
                    std::collections::HashMap::new()
                };

            for (candidate, norm_sim) in candidates.into_iter().zip(normalized) {
                let score = if self.search_new_scoring {
                    let name_match = name_match_score(&parsed.core, &candidate.name);
                    let context_overlap = context_vector
                        .as_ref()
                        .map(|cv| similarity::cosine(cv, &candidate.vector))
                        .unwrap_or(0.0);

                    let mut base = WEIGHT_SIMILARITY * norm_sim + WEIGHT_NAME_MATCH * name_match;
                    if context_vector.is_some() {
                        base += WEIGHT_CONTEXT * context_overlap;
                    }
                    if kind == EntityKind::Rule {
                        base += WEIGHT_ANALYTICS * candidate.analytics_score;
                    }
                    if let Some(path) = &candidate.file_path {
                        if is_demoted(path) {
                            base -= DEMOTION_PENALTY;
                        }
                    }
                    (base * kind.rank_weight()).clamp(0.0, 1.0)
                } else {
                    candidate.similarity.clamp(0.0, 1.0)
                };
                let skeleton = skeletons.get(&candidate.entity_id).cloned();

                all_hits.push((
                    kind,
                    QueryHit {
                        entity_kind: kind,
                        entity_id: candidate.entity_id,
                        score,
                        name: project_name(&request.view, &candidate.name),
                        file_path: project_file_path(&request.view, &candidate.file_path),
                        location: project_location(&request.view, &candidate.location),
                        skeleton,
                    },
                ));
            }
        }

        all_hits.sort_by(|a, b| b.1.score.partial_cmp(&a.1.score).unwrap_or(std::cmp::Ordering::Equal));

        if let Some(cap) = request.max_per_type {
            let mut kept: Vec<(EntityKind, QueryHit)> = Vec::new();
            let mut per_kind_count = std::collections::HashMap::new();
            for (kind, hit) in all_hits {
                let count = per_kind_count.entry(kind).or_insert(0usize);
                if *count < cap {
                    *count += 1;
                    kept.push((kind, hit));
                }
            }
            all_hits = kept;
        }

        all_hits.truncate(request.limit);
        Ok(all_hits.into_iter().map(|(_, hit)| hit).collect())
    }

    /// Skeleton rendering (signature + child member signatures) for each
    /// component candidate, keyed by entity id (spec §4.9 projection).
    async fn skeletons_for(&self, candidates: &[Candidate]) -> Result<std::collections::HashMap<String, String>> {
        let mut out = std::collections::HashMap::with_capacity(candidates.len());
        for candidate in candidates {
            let id = crate::types::ComponentId::from_raw(candidate.entity_id.clone())?;
            let Some(component) = self.store.get_component(&id).await? else {
                continue;
            };
            let members: Vec<_> = self
                .store
                .all_components()
                .await?
                .into_iter()
                .filter(|c| c.parent_id.as_ref() == Some(&id))
                .collect();
            out.insert(candidate.entity_id.clone(), lens::skeleton(&component, &members));
        }
        Ok(out)
    }

    async fn hydrate_candidate(
        &self,
        kind: EntityKind,
        embedding: crate::types::Embedding,
        similarity: f32,
    ) -> Result<Option<Candidate>> {
        match kind {
            EntityKind::Component => {
                let id = crate::types::ComponentId::from_raw(embedding.entity_id.clone())?;
                let Some(component) = self.store.get_component(&id).await? else {
                    return Ok(None);
                };
                Ok(Some(Candidate {
                    entity_kind: kind,
                    entity_id: embedding.entity_id,
                    similarity,
                    vector: embedding.vector,
                    name: component.name,
                    component_type: Some(component.component_type.as_str().to_string()),
                    language: Some(component.language),
                    file_path: Some(component.file_path),
                    location: Some(component.location),
                    analytics_score: 0.0,
                }))
            }
            EntityKind::Task | EntityKind::Note | EntityKind::Rule => {
                let Some(record) = self.store.get_record(&embedding.entity_id).await? else {
                    return Ok(None);
                };
                let analytics_score = if kind == EntityKind::Rule {
                    record.metadata.get_f64("analytics_score").unwrap_or(0.0).clamp(0.0, 1.0) as f32
                } else {
                    0.0
                };
                Ok(Some(Candidate {
                    entity_kind: kind,
                    entity_id: embedding.entity_id,
                    similarity,
                    vector: embedding.vector,
                    name: record.title.as_str().to_string(),
                    component_type: None,
                    language: None,
                    file_path: None,
                    location: None,
                    analytics_score,
                }))
            }
        }
    }
}

fn passes_hard_filters(candidate: &Candidate, filters: &QueryFilters) -> bool {
    if !filters.component_types.is_empty() {
        match &candidate.component_type {
            Some(ct) if filters.component_types.iter().any(|f| f.eq_ignore_ascii_case(ct)) => {}
            _ => return false,
        }
    }
    if !filters.languages.is_empty() {
        match &candidate.language {
            Some(lang) => {
                let normalized = normalize_language(lang);
                if !filters.languages.iter().any(|f| normalize_language(f) == normalized) {
                    return false;
                }
            }
            None => return false,
        }
    }
    if let Some(path) = &candidate.file_path {
        if !filters.path_include.is_empty() && !filters.path_include.iter().any(|p| path.contains(p.as_str())) {
            return false;
        }
        if filters.path_exclude.iter().any(|p| path.contains(p.as_str())) {
            return false;
        }
    }
    true
}

fn is_demoted(file_path: &str) -> bool {
    DEMOTION_PATTERNS.iter().any(|p| file_path.contains(p))
}

/// Five-level name-match ladder (spec §4.9): exact, exact-no-spaces,
/// prefix, all-tokens-present, substring, else zero.
fn name_match_score(core: &str, name: &str) -> f32 {
    let core_norm = core.trim().to_lowercase();
    let name_norm = name.trim().to_lowercase();
    if core_norm.is_empty() {
        return 0.0;
    }
    if core_norm == name_norm {
        return 1.0;
    }
    if core_norm.replace(' ', "") == name_norm.replace(' ', "") {
        return 0.9;
    }
    if name_norm.starts_with(&core_norm) {
        return 0.75;
    }
    let tokens: Vec<&str> = core_norm.split_whitespace().collect();
    if !tokens.is_empty() && tokens.iter().all(|t| name_norm.contains(t)) {
        return 0.6;
    }
    if name_norm.contains(&core_norm) {
        return 0.5;
    }
    0.0
}

fn project_name(view: &ViewPreset, name: &str) -> Option<String> {
    match view {
        ViewPreset::Ids => None,
        _ => Some(name.to_string()),
    }
}

fn project_file_path(view: &ViewPreset, path: &Option<String>) -> Option<String> {
    match view {
        ViewPreset::Ids | ViewPreset::Names => None,
        _ => path.clone(),
    }
}

fn project_location(view: &ViewPreset, location: &Option<Location>) -> Option<Location> {
    match view {
        ViewPreset::FilesLines | ViewPreset::Full => location.clone(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn name_match_ladder_orders_as_specified() {
        assert_eq!(name_match_score("logger", "logger"), 1.0);
        assert_eq!(name_match_score("my logger", "mylogger"), 0.9);
        assert_eq!(name_match_score("log", "logger_service"), 0.75);
        assert_eq!(name_match_score("retry queue", "queue_with_retry_support"), 0.6);
        assert_eq!(name_match_score("gger", "logger"), 0.5);
        assert_eq!(name_match_score("xyz", "logger"), 0.0);
    }

    #[test]
    fn demotion_flags_known_noise_paths() {
        assert!(is_demoted("coverage/lcov-report/index.html"));
        assert!(is_demoted("vendor/node_modules/pkg/index.js"));
        assert!(!is_demoted("src/main.rs"));
    }

    #[test]
    fn view_preset_parses_known_aliases() {
        assert_eq!(ViewPreset::parse("files+lines"), ViewPreset::FilesLines);
        assert_eq!(ViewPreset::parse("ids"), ViewPreset::Ids);
        assert_eq!(ViewPreset::parse("unknown"), ViewPreset::Full);
    }

    #[test]
    fn ids_view_drops_name_and_path() {
        assert_eq!(project_name(&ViewPreset::Ids, "foo"), None);
        assert_eq!(project_file_path(&ViewPreset::Ids, &Some("a.rs".to_string())), None);
    }

    proptest! {
        #[test]
        fn name_match_score_is_always_in_unit_range(core in ".{0,40}", name in ".{0,40}") {
            let score = name_match_score(&core, &name);
            prop_assert!((0.0..=1.0).contains(&score));
        }

        #[test]
        fn final_score_clamp_never_escapes_unit_range(base in -5.0f32..5.0f32, rank_weight in 0.0f32..3.0f32) {
            let score = (base * rank_weight).clamp(0.0, 1.0);
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}
