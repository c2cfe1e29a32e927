// Contract-first trait definitions for the indexing/query engine. Each
// trait documents preconditions, postconditions and invariants the way the
// teacher's `Storage`/`Index` traits do; implementations in `store`,
// `parsing` and `embedding_queue` are expected to uphold them.

use crate::error::Result;
use crate::types::{Component, ComponentId, ComponentType, Embedding, EntityKind, MetaRecord, Relationship, RelationshipType};
use async_trait::async_trait;
use std::path::Path;

/// Offset/limit window over a `search_components` result set (spec §4.3).
#[derive(Debug, Clone, Copy)]
pub struct Paging {
    pub offset: usize,
    pub limit: usize,
}

impl Paging {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Apply this window to an already-ordered slice.
    pub fn apply<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items.iter().skip(self.offset).take(self.limit).cloned().collect()
    }
}

impl Default for Paging {
    fn default() -> Self {
        Self { offset: 0, limit: 100 }
    }
}

/// Attribute filter for `ComponentStore::search_components` (spec §4.3).
/// Every populated field narrows the result set; an all-`None` filter
/// matches everything.
#[derive(Debug, Clone, Default)]
pub struct ComponentFilter {
    pub component_type: Option<ComponentType>,
    pub language: Option<String>,
    pub file_path_prefix: Option<String>,
    pub name_contains: Option<String>,
}

impl ComponentFilter {
    pub fn matches(&self, component: &Component) -> bool {
        if let Some(ty) = &self.component_type {
            if &component.component_type != ty {
                return false;
            }
        }
        if let Some(language) = &self.language {
            if &component.language != language {
                return false;
            }
        }
        if let Some(prefix) = &self.file_path_prefix {
            if !component.file_path.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(needle) = &self.name_contains {
            if !component.name.to_ascii_lowercase().contains(&needle.to_ascii_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Attribute filter for `RelationshipStore::search_relationships` (spec
/// §4.3).
#[derive(Debug, Clone, Default)]
pub struct RelationshipFilter {
    pub relationship_type: Option<RelationshipType>,
    pub source_id: Option<ComponentId>,
    pub target_id: Option<ComponentId>,
    pub unresolved_only: bool,
}

impl RelationshipFilter {
    pub fn matches(&self, relationship: &Relationship) -> bool {
        if let Some(ty) = &self.relationship_type {
            if &relationship.relationship_type != ty {
                return false;
            }
        }
        if let Some(source_id) = &self.source_id {
            if &relationship.source_id != source_id {
                return false;
            }
        }
        if let Some(target_id) = &self.target_id {
            if !matches!(&relationship.target, crate::types::Target::Resolved(t) if t == target_id) {
                return false;
            }
        }
        if self.unresolved_only && !relationship.target.is_sentinel() {
            return false;
        }
        true
    }
}

/// Storage for components keyed by their stable id.
#[async_trait]
pub trait ComponentStore: Send + Sync {
    /// Insert or overwrite a component.
    ///
    /// # Preconditions
    /// - `component.id` is derived from its own `(file_path, name, type,
    ///   location)` or FQN (callers never forge ids)
    ///
    /// # Postconditions
    /// - A subsequent `get(&component.id)` returns the inserted value
    /// - Any existing relationships sourced from this id are left intact
    async fn put_component(&self, component: Component) -> Result<()>;

    /// Fetch a component by id.
    async fn get_component(&self, id: &ComponentId) -> Result<Option<Component>>;

    /// Remove every component whose `file_path` equals `path`, along with
    /// their owned relationships (spec §4.7 re-parse-on-change rule).
    ///
    /// # Postconditions
    /// - Idempotent: removing a path with no components is not an error
    async fn remove_components_for_path(&self, path: &str) -> Result<Vec<ComponentId>>;

    /// All components currently recorded for a file, in no particular
    /// order.
    async fn components_for_path(&self, path: &str) -> Result<Vec<Component>>;

    /// Every component in the store, used to build the resolver's FQN
    /// index. Not meant for per-file hot paths.
    async fn all_components(&self) -> Result<Vec<Component>>;

    /// Components matching `filter`, ordered deterministically by
    /// `(file_path, name)` and windowed by `paging` (spec §4.3).
    async fn search_components(&self, filter: &ComponentFilter, paging: Paging) -> Result<Vec<Component>>;
}

/// Storage for the directed component graph.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Insert or merge a relationship (spec §4.3 upsert rule: same
    /// `(source_id, type, target)` triple merges metadata instead of
    /// duplicating).
    ///
    /// # Invariants
    /// - At most one stored relationship per `(source_id, type, target)`
    async fn put_relationship(&self, relationship: Relationship) -> Result<()>;

    /// Relationships with the given source id.
    async fn relationships_from(&self, source_id: &ComponentId) -> Result<Vec<Relationship>>;

    /// Relationships whose resolved target equals `target_id`.
    async fn relationships_to(&self, target_id: &ComponentId) -> Result<Vec<Relationship>>;

    /// All relationships still carrying a sentinel (unresolved) target,
    /// used by the resolver's re-scan pass.
    async fn unresolved_relationships(&self) -> Result<Vec<Relationship>>;

    /// Every relationship, used by the resolver's dangling-target
    /// revalidation pass. Not meant for per-file hot paths.
    async fn all_relationships(&self) -> Result<Vec<Relationship>>;

    /// Relationships matching `filter`, in no particular order (spec
    /// §4.3). Unlike component search this has no paging: relationship
    /// result sets back subgraph expansion, which consumes them whole.
    async fn search_relationships(&self, filter: &RelationshipFilter) -> Result<Vec<Relationship>>;
}

/// Storage for task/note/rule metadata entities.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn put_record(&self, record: MetaRecord) -> Result<()>;
    async fn get_record(&self, id: &str) -> Result<Option<MetaRecord>>;
    async fn remove_record(&self, id: &str) -> Result<()>;
    async fn records_by_kind(&self, kind: EntityKind) -> Result<Vec<MetaRecord>>;

    /// Depth of a task in its parent chain, read-through from the cache the
    /// store keeps in sync on every `parent_id` change.
    async fn task_depth(&self, id: &str) -> Result<u32>;
}

/// Storage for embedding vectors, addressed by `(entity_kind, entity_id)`.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    async fn put_embedding(&self, embedding: Embedding) -> Result<()>;
    async fn get_embedding(&self, kind: EntityKind, entity_id: &str) -> Result<Option<Embedding>>;

    /// All embeddings of a kind, for the query engine's per-type fan-out.
    async fn embeddings_of_kind(&self, kind: EntityKind) -> Result<Vec<Embedding>>;
}

/// How seriously a diagnostic should be taken when deciding whether a run
/// succeeded (spec §7: "success = zero diagnostics of severity error").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A diagnostic raised while parsing a single file; never fatal to a run,
/// but an `Error`-severity diagnostic marks that file's parse as failed.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub line: Option<u32>,
    pub severity: Severity,
}

/// The result of parsing one file: the components and relationships it
/// contributes, plus any non-fatal diagnostics.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub components: Vec<Component>,
    pub relationships: Vec<Relationship>,
    pub diagnostics: Vec<Diagnostic>,
}

/// A language-specific parser (spec §4.2).
///
/// # Preconditions
/// - `source` is the full, current contents of `path`
///
/// # Postconditions
/// - Never panics: a malformed file yields an empty or partial
///   `ParseOutcome` with diagnostics, not a propagated error
/// - Component ids are stable across repeated calls with identical input
#[async_trait]
pub trait LanguageParser: Send + Sync {
    /// The language this parser claims, e.g. `"rust"`, `"php"`.
    fn language(&self) -> &'static str;

    /// File extensions this parser accepts, without the leading dot.
    fn extensions(&self) -> &'static [&'static str];

    async fn parse(&self, path: &str, source: &str) -> ParseOutcome;
}

/// An embedding backend (spec §4.5). Implementations may be local (ONNX) or
/// remote; the queue only depends on this trait.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Stable identifier for the model/version producing these vectors,
    /// persisted alongside each `Embedding` so a model change can be
    /// detected and backfilled.
    fn model_id(&self) -> &str;

    /// Compute embeddings for a batch of fingerprint strings, in order.
    ///
    /// # Postconditions
    /// - Output length equals input length
    /// - Never panics on empty or oversized input; returns an error instead
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Small persisted scalars a project's store keeps outside the
/// component/relationship graph — currently just the reconcile watermark.
#[async_trait]
pub trait MetadataKvStore: Send + Sync {
    fn get_metadata_kv(&self, key: &str) -> Option<String>;
    async fn set_metadata_kv(&self, key: String, value: String) -> Result<()>;
}

/// Runtime contract validation shared by `store` implementations.
pub mod validation {
    use super::*;

    pub fn validate_storage_path(path: &Path) -> Result<()> {
        let path_str = path
            .to_str()
            .ok_or_else(|| crate::error::FelixError::InvalidInput {
                field: "path".to_string(),
                reason: "not valid UTF-8".to_string(),
            })?;
        crate::validation::path::validate_file_path(path_str)
            .map_err(crate::error::FelixError::Store)
    }
}
