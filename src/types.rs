// Core data model (spec §3): components, relationships, embeddings, the
// task/note/rule metadata entities, and the `Validated*` newtypes that make
// invalid values unrepresentable once constructed — the same shape as the
// teacher's `types.rs`, generalized from a single `Document` entity to the
// component/relationship graph.

use crate::validation;
use anyhow::{ensure, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------
// Validated newtypes
// ---------------------------------------------------------------------

/// A path that has been validated and is guaranteed to be safe to persist
/// or display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatedPath {
    inner: PathBuf,
}

impl ValidatedPath {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("path is not valid UTF-8"))?;
        validation::path::validate_file_path(path_str)?;
        Ok(Self {
            inner: path.to_path_buf(),
        })
    }

    pub fn as_path(&self) -> &Path {
        &self.inner
    }

    pub fn as_str(&self) -> &str {
        self.inner.to_str().expect("ValidatedPath is always UTF-8")
    }
}

impl fmt::Display for ValidatedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A non-empty title with an enforced length limit (task/note/rule titles).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedTitle {
    inner: String,
}

impl ValidatedTitle {
    const MAX_LENGTH: usize = 1024;

    pub fn new(title: impl Into<String>) -> Result<Self> {
        let title = title.into();
        let trimmed = title.trim();
        ensure!(!trimmed.is_empty(), "title cannot be empty");
        ensure!(
            trimmed.len() <= Self::MAX_LENGTH,
            "title exceeds maximum length of {} characters",
            Self::MAX_LENGTH
        );
        Ok(Self {
            inner: trimmed.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl fmt::Display for ValidatedTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

/// A validated, constrained tag (task/note/rule tags, FQN-shaped values).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatedTag {
    inner: String,
}

impl ValidatedTag {
    pub fn new(tag: impl Into<String>) -> Result<Self> {
        let tag = tag.into();
        validation::index::validate_tag(&tag)?;
        Ok(Self { inner: tag })
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl fmt::Display for ValidatedTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

/// A positive, capped limit used for paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedLimit {
    inner: usize,
    max: usize,
}

impl ValidatedLimit {
    pub fn new(limit: usize, max: usize) -> Result<Self> {
        ensure!(limit > 0, "limit must be greater than zero");
        ensure!(limit <= max, "limit exceeds maximum of {}", max);
        Ok(Self { inner: limit, max })
    }

    pub fn get(&self) -> usize {
        self.inner
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

/// A timestamp pair with the invariant `updated >= created` (spec §3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampPair {
    created: i64,
    updated: i64,
}

impl TimestampPair {
    pub fn new(created: i64, updated: i64) -> Result<Self> {
        ensure!(updated >= created, "updated timestamp must be >= created timestamp");
        Ok(Self { created, updated })
    }

    pub fn now() -> Self {
        let now = current_unix_time();
        Self {
            created: now,
            updated: now,
        }
    }

    pub fn created(&self) -> i64 {
        self.created
    }

    pub fn updated(&self) -> i64 {
        self.updated
    }

    pub fn touch(&mut self) {
        self.updated = current_unix_time();
    }
}

fn current_unix_time() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before unix epoch")
        .as_secs() as i64
}

// ---------------------------------------------------------------------
// Dynamic metadata bag (spec §9 design note)
// ---------------------------------------------------------------------

/// An open, typed value for the metadata maps carried by components,
/// relationships and metadata entities. A tagged union rather than a
/// string-to-string map so numbers, bools and arrays round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<MetadataValue>),
    Object(IndexMap<String, MetadataValue>),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[MetadataValue]> {
        match self {
            MetadataValue::Array(a) => Some(a),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}
impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}
impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}
impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        MetadataValue::Number(n)
    }
}

/// Open metadata map with typed accessors for the well-known keys named in
/// spec §3.1 (`fqn`, `namespace`, `access_modifier`, `is_static`,
/// `return_type`, `parameters`, `extends`, `implements`, `is_trait`,
/// `heading_id`, `is_link`, `link_url`, `entry_type`, plus relationship
/// fields `confidence`, `reason`, `isResolved`, `targetFqn`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataBag(pub IndexMap<String, MetadataValue>);

impl MetadataBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(MetadataValue::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(MetadataValue::as_bool)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(MetadataValue::as_f64)
    }

    /// Shallow-merge `other` into `self`: scalars are overwritten, nested
    /// objects are merged key-by-key (spec §4.3 relationship upsert rule).
    pub fn merge_shallow(&mut self, other: &MetadataBag) {
        for (k, v) in other.0.iter() {
            match (self.0.get(k), v) {
                (Some(MetadataValue::Object(existing)), MetadataValue::Object(incoming)) => {
                    let mut merged = existing.clone();
                    for (ik, iv) in incoming.iter() {
                        merged.insert(ik.clone(), iv.clone());
                    }
                    self.0.insert(k.clone(), MetadataValue::Object(merged));
                }
                _ => {
                    self.0.insert(k.clone(), v.clone());
                }
            }
        }
    }

    pub fn fqn(&self) -> Option<&str> {
        self.get_str("fqn")
    }

    pub fn is_resolved(&self) -> bool {
        self.get_bool("isResolved").unwrap_or(false)
    }
}

// ---------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------

/// A stable component identifier (spec §3.2 invariant 1): derived from
/// `(file_path, name, type, location)` for structural components, or from
/// FQN for named types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(String);

impl ComponentId {
    pub fn from_raw(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        ensure!(!id.is_empty(), "component id cannot be empty");
        Ok(Self(id))
    }

    /// Derive an id for a structural component (anything without a
    /// language-level FQN: files, sections, local variables, ...).
    pub fn for_structural(
        file_path: &str,
        name: &str,
        component_type: &ComponentType,
        location: &Location,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(file_path.as_bytes());
        hasher.update(b"\0");
        hasher.update(name.as_bytes());
        hasher.update(b"\0");
        hasher.update(component_type.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(location.start_line.to_le_bytes());
        hasher.update(location.start_col.to_le_bytes());
        let digest = hasher.finalize();
        Self(format!("struct:{}", hex::encode(&digest[..16])))
    }

    /// Derive an id for a component that owns a fully-qualified name.
    /// Stable across runs/files because it is a pure function of the FQN.
    pub fn for_fqn(fqn: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(fqn.as_bytes());
        let digest = hasher.finalize();
        Self(format!("fqn:{}", hex::encode(&digest[..16])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of source unit a component represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    File,
    Namespace,
    Class,
    Interface,
    Enum,
    Function,
    Method,
    Constructor,
    Property,
    Variable,
    Section,
    Module,
    Import,
    Export,
    Other(String),
}

impl ComponentType {
    pub fn as_str(&self) -> &str {
        match self {
            ComponentType::File => "file",
            ComponentType::Namespace => "namespace",
            ComponentType::Class => "class",
            ComponentType::Interface => "interface",
            ComponentType::Enum => "enum",
            ComponentType::Function => "function",
            ComponentType::Method => "method",
            ComponentType::Constructor => "constructor",
            ComponentType::Property => "property",
            ComponentType::Variable => "variable",
            ComponentType::Section => "section",
            ComponentType::Module => "module",
            ComponentType::Import => "import",
            ComponentType::Export => "export",
            ComponentType::Other(s) => s.as_str(),
        }
    }

    /// Normalize case/punctuation variance the way the query engine's
    /// `component types` filter expects (spec §4.9).
    pub fn parse_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "file" => ComponentType::File,
            "namespace" => ComponentType::Namespace,
            "class" => ComponentType::Class,
            "interface" => ComponentType::Interface,
            "enum" => ComponentType::Enum,
            "function" => ComponentType::Function,
            "method" => ComponentType::Method,
            "constructor" => ComponentType::Constructor,
            "property" => ComponentType::Property,
            "variable" => ComponentType::Variable,
            "section" => ComponentType::Section,
            "module" => ComponentType::Module,
            "import" => ComponentType::Import,
            "export" => ComponentType::Export,
            other => ComponentType::Other(other.to_string()),
        }
    }
}

/// Half-open source location, 0-indexed (spec §3.1 `Component.location`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub start_line: u32,
    pub end_line: u32,
    pub start_col: u32,
    pub end_col: u32,
}

impl Location {
    pub fn point(line: u32, col: u32) -> Self {
        Self {
            start_line: line,
            end_line: line,
            start_col: col,
            end_col: col,
        }
    }
}

/// An indexed symbol or structural unit (spec §3.1 `Component`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub name: String,
    pub component_type: ComponentType,
    pub language: String,
    pub file_path: String,
    pub location: Location,
    pub parent_id: Option<ComponentId>,
    pub code: Option<String>,
    pub metadata: MetadataBag,
}

impl Component {
    /// Content used for the embedding fingerprint (spec §4.5): language,
    /// kind, name, signature-ish metadata, docstring, and the first N lines
    /// of code.
    pub fn embedding_fingerprint_source(&self, max_code_lines: usize) -> String {
        let mut parts = vec![
            self.language.clone(),
            self.component_type.as_str().to_string(),
            self.name.clone(),
        ];
        if let Some(sig) = self.metadata.get_str("signature") {
            parts.push(sig.to_string());
        }
        if let Some(doc) = self.metadata.get_str("docstring") {
            parts.push(doc.to_string());
        }
        if let Some(code) = &self.code {
            let snippet: String = code.lines().take(max_code_lines).collect::<Vec<_>>().join("\n");
            parts.push(snippet);
        }
        parts.join("\u{1f}")
    }
}

// ---------------------------------------------------------------------
// Relationship, sentinel targets
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipId(String);

impl RelationshipId {
    pub fn new(source: &ComponentId, relationship_type: &RelationshipType, raw_target: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(relationship_type.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(raw_target.as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Typed directed edge kind (spec §3.1 `Relationship.type`), canonicalized
/// to one casing at ingestion (spec §9 open question).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Contains,
    Extends,
    Implements,
    Uses,
    Calls,
    ImportsFrom,
    InNamespace,
    DependsOn,
    References,
    Documents,
    ResolvesTo,
    UsesField,
    TransformsData,
    PassesTo,
    ReturnsFrom,
    ReadsFrom,
    WritesTo,
    DerivesFrom,
    Modifies,
    Other(String),
}

impl RelationshipType {
    pub fn as_str(&self) -> &str {
        match self {
            RelationshipType::Contains => "contains",
            RelationshipType::Extends => "extends",
            RelationshipType::Implements => "implements",
            RelationshipType::Uses => "uses",
            RelationshipType::Calls => "calls",
            RelationshipType::ImportsFrom => "imports_from",
            RelationshipType::InNamespace => "in_namespace",
            RelationshipType::DependsOn => "depends_on",
            RelationshipType::References => "references",
            RelationshipType::Documents => "documents",
            RelationshipType::ResolvesTo => "resolves_to",
            RelationshipType::UsesField => "uses_field",
            RelationshipType::TransformsData => "transforms_data",
            RelationshipType::PassesTo => "passes_to",
            RelationshipType::ReturnsFrom => "returns_from",
            RelationshipType::ReadsFrom => "reads_from",
            RelationshipType::WritesTo => "writes_to",
            RelationshipType::DerivesFrom => "derives_from",
            RelationshipType::Modifies => "modifies",
            RelationshipType::Other(s) => s.as_str(),
        }
    }

    /// Hierarchical container edges are always filtered from subgraph
    /// expansion unless explicitly selected (spec §4.9).
    pub fn is_hierarchical_container(&self) -> bool {
        matches!(self, RelationshipType::Contains)
            || matches!(self, RelationshipType::Other(s) if s == "contained_by"
                || s == "class-contains-method" || s == "file-contains-class")
    }

    /// Canonicalize casing/punctuation variants (`in-namespace`,
    /// `IN_NAMESPACE`, `inNamespace`, ...) to one enum value.
    pub fn parse_loose(s: &str) -> Self {
        let normalized = s
            .chars()
            .map(|c| if c == '-' { '_' } else { c })
            .collect::<String>()
            .to_ascii_lowercase();
        // also fold simple camelCase -> snake_case boundaries
        let normalized = to_snake_case(&normalized);
        match normalized.as_str() {
            "contains" => RelationshipType::Contains,
            "extends" => RelationshipType::Extends,
            "implements" => RelationshipType::Implements,
            "uses" => RelationshipType::Uses,
            "calls" => RelationshipType::Calls,
            "imports_from" | "importsfrom" => RelationshipType::ImportsFrom,
            "in_namespace" | "innamespace" => RelationshipType::InNamespace,
            "depends_on" | "dependson" => RelationshipType::DependsOn,
            "references" => RelationshipType::References,
            "documents" => RelationshipType::Documents,
            "resolves_to" | "resolvesto" => RelationshipType::ResolvesTo,
            "uses_field" | "usesfield" => RelationshipType::UsesField,
            "transforms_data" | "transformsdata" => RelationshipType::TransformsData,
            "passes_to" | "passesto" => RelationshipType::PassesTo,
            "returns_from" | "returnsfrom" => RelationshipType::ReturnsFrom,
            "reads_from" | "readsfrom" => RelationshipType::ReadsFrom,
            "writes_to" | "writesto" => RelationshipType::WritesTo,
            "derives_from" | "derivesfrom" => RelationshipType::DerivesFrom,
            "modifies" => RelationshipType::Modifies,
            other => RelationshipType::Other(other.to_string()),
        }
    }
}

fn to_snake_case(s: &str) -> String {
    if s.contains('_') {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// A relationship endpoint: a concrete component, or one of the three
/// sentinel placeholders (spec §9 design note, §3.2 invariant 3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Target {
    Resolved(ComponentId),
    Unresolved(String),
    External(String),
    ResolveByName(String),
}

impl Target {
    pub fn is_sentinel(&self) -> bool {
        !matches!(self, Target::Resolved(_))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Resolved(id) => write!(f, "{}", id.as_str()),
            Target::Unresolved(fqn) => write!(f, "UNRESOLVED:{fqn}"),
            Target::External(module) => write!(f, "EXTERNAL:{module}"),
            Target::ResolveByName(name) => write!(f, "RESOLVE:{name}"),
        }
    }
}

impl std::str::FromStr for Target {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix("UNRESOLVED:") {
            Ok(Target::Unresolved(rest.to_string()))
        } else if let Some(rest) = s.strip_prefix("EXTERNAL:") {
            Ok(Target::External(rest.to_string()))
        } else if let Some(rest) = s.strip_prefix("RESOLVE:") {
            Ok(Target::ResolveByName(rest.to_string()))
        } else {
            Ok(Target::Resolved(ComponentId::from_raw(s)?))
        }
    }
}

impl From<Target> for String {
    fn from(t: Target) -> Self {
        t.to_string()
    }
}

impl TryFrom<String> for Target {
    type Error = anyhow::Error;
    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// A typed directed edge between components (spec §3.1 `Relationship`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub relationship_type: RelationshipType,
    pub source_id: ComponentId,
    pub target: Target,
    pub metadata: MetadataBag,
}

impl Relationship {
    pub fn new(source_id: ComponentId, relationship_type: RelationshipType, target: Target) -> Self {
        let id = RelationshipId::new(&source_id, &relationship_type, &target.to_string());
        Self {
            id,
            relationship_type,
            source_id,
            target,
            metadata: MetadataBag::new(),
        }
    }
}

// ---------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Component,
    Task,
    Note,
    Rule,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Component => "component",
            EntityKind::Task => "task",
            EntityKind::Note => "note",
            EntityKind::Rule => "rule",
        }
    }

    /// Entity-type weight used by the hybrid query engine's re-ranker
    /// (spec §4.9).
    pub fn rank_weight(&self) -> f32 {
        match self {
            EntityKind::Component => 1.0,
            EntityKind::Rule => 0.8,
            EntityKind::Task => 0.7,
            EntityKind::Note => 0.6,
        }
    }
}

/// A stored vector (spec §3.1 `Embedding`); validity is defined relative to
/// `content_hash` (spec §3.2 invariant 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub vector: Vec<f32>,
    pub model_id: String,
    pub content_hash: String,
}

// ---------------------------------------------------------------------
// Task / Note / Rule metadata entities
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLink {
    pub link_type: String,
    pub target_kind: EntityKind,
    pub target_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Blocked,
    Done,
    Cancelled,
}

/// Task-only workflow fields (spec §3.1: "workflow/validation fields").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWorkflow {
    pub status: TaskStatus,
    pub dependency_ids: Vec<String>,
}

/// A hierarchical task/note/rule record (spec §3.1 `Task/Note/Rule`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaRecord {
    pub id: String,
    pub kind: EntityKind,
    pub parent_id: Option<String>,
    pub depth_level: u32,
    pub sort_order: i64,
    pub title: ValidatedTitle,
    pub content: String,
    pub tags: Vec<ValidatedTag>,
    pub entity_links: Vec<EntityLink>,
    pub metadata: MetadataBag,
    pub timestamps: TimestampPair,
    pub workflow: Option<TaskWorkflow>,
}

impl MetaRecord {
    /// Text used to build the embedding fingerprint for this entity.
    pub fn embedding_fingerprint_source(&self) -> String {
        format!(
            "{}\u{1f}{}\u{1f}{}",
            self.kind.as_str(),
            self.title.as_str(),
            self.content
        )
    }
}

// ---------------------------------------------------------------------
// Index metadata (key/value rows: reconcile watermark, model versions, ...)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadataRow {
    pub key: String,
    pub value: String,
}

pub const METADATA_KEY_RECONCILE_LAST_RUN: &str = "reconcile.lastRun";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_id_is_stable_for_same_inputs() {
        let loc = Location::point(10, 4);
        let a = ComponentId::for_structural("src/a.rs", "foo", &ComponentType::Function, &loc);
        let b = ComponentId::for_structural("src/a.rs", "foo", &ComponentType::Function, &loc);
        assert_eq!(a, b);
    }

    #[test]
    fn component_id_differs_by_location() {
        let a = ComponentId::for_structural(
            "src/a.rs",
            "foo",
            &ComponentType::Function,
            &Location::point(10, 4),
        );
        let b = ComponentId::for_structural(
            "src/a.rs",
            "foo",
            &ComponentType::Function,
            &Location::point(20, 4),
        );
        assert_ne!(a, b);
    }

    #[test]
    fn fqn_id_is_pure_function_of_fqn() {
        let a = ComponentId::for_fqn("App\\Services\\Logger");
        let b = ComponentId::for_fqn("App\\Services\\Logger");
        assert_eq!(a, b);
    }

    #[test]
    fn target_round_trips_through_string() {
        let targets = [
            Target::Resolved(ComponentId::from_raw("fqn:abc").unwrap()),
            Target::Unresolved("App\\Foo".to_string()),
            Target::External("lodash".to_string()),
            Target::ResolveByName("foo".to_string()),
        ];
        for t in targets {
            let s = t.to_string();
            let parsed: Target = s.parse().unwrap();
            assert_eq!(t, parsed);
        }
    }

    #[test]
    fn relationship_type_parses_casing_variants() {
        assert_eq!(RelationshipType::parse_loose("imports_from"), RelationshipType::ImportsFrom);
        assert_eq!(RelationshipType::parse_loose("imports-from"), RelationshipType::ImportsFrom);
        assert_eq!(RelationshipType::parse_loose("importsFrom"), RelationshipType::ImportsFrom);
        assert_eq!(RelationshipType::parse_loose("IMPORTS_FROM"), RelationshipType::ImportsFrom);
    }

    #[test]
    fn hierarchical_edges_are_flagged() {
        assert!(RelationshipType::Contains.is_hierarchical_container());
        assert!(!RelationshipType::Calls.is_hierarchical_container());
    }

    #[test]
    fn metadata_merge_is_shallow() {
        let mut a = MetadataBag::new();
        let mut nested = IndexMap::new();
        nested.insert("x".to_string(), MetadataValue::Number(1.0));
        a.insert("scalar", "old");
        a.0.insert("nested".to_string(), MetadataValue::Object(nested));

        let mut b = MetadataBag::new();
        b.insert("scalar", "new");
        let mut nested_b = IndexMap::new();
        nested_b.insert("y".to_string(), MetadataValue::Number(2.0));
        b.0.insert("nested".to_string(), MetadataValue::Object(nested_b));

        a.merge_shallow(&b);
        assert_eq!(a.get_str("scalar"), Some("new"));
        if let Some(MetadataValue::Object(obj)) = a.get("nested") {
            assert!(obj.contains_key("x"));
            assert!(obj.contains_key("y"));
        } else {
            panic!("expected merged object");
        }
    }

    #[test]
    fn timestamp_pair_rejects_updated_before_created() {
        assert!(TimestampPair::new(2000, 1000).is_err());
        assert!(TimestampPair::new(1000, 2000).is_ok());
    }
}
