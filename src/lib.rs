// Felix - a language-agnostic code intelligence engine.
// Root library module.

pub mod config;
pub mod contracts;
pub mod discovery;
pub mod docs;
pub mod embedding_queue;
pub mod error;
pub mod observability;
pub mod orchestrator;
pub mod parsing;
pub mod query;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod types;
pub mod validation;
pub mod watcher;

pub use config::EngineConfig;
pub use error::{FelixError, IndexingIssue, IssueCategory, Result};
pub use observability::{init_logging, init_logging_with_level, Phase, PhaseTiming, RunContext};

pub use contracts::{
    ComponentFilter, ComponentStore, Diagnostic, EmbeddingService, EmbeddingStore, LanguageParser,
    MetadataKvStore, MetadataStore, Paging, ParseOutcome, RelationshipFilter, RelationshipStore,
    Severity,
};

pub use types::{
    Component, ComponentId, ComponentType, Embedding, EntityKind, Location, MetaRecord,
    MetadataBag, MetadataValue, Relationship, RelationshipId, RelationshipType, Target,
    TaskStatus, TaskWorkflow, TimestampPair, ValidatedTag, ValidatedTitle,
};

pub use discovery::{discover, DiscoveryOptions};
pub use embedding_queue::{content_hash, EmbeddingQueue, EmbeddingQueueConfig, LocalEmbeddingService};
pub use parsing::{ParserAdapter, ParserRegistry};
pub use resolver::Resolver;
pub use store::FelixStore;

pub use docs::{DocResolveReport, DocResolver};
pub use orchestrator::{IndexResult, Orchestrator, UpdateResult};
pub use watcher::ProjectWatcher;

pub use query::lens::{expand as expand_lens, Lens, SubgraphResult};
pub use query::parse::{apply_overrides, parse_dual_channel, ParsedQuery};
pub use query::{QueryEngine, QueryFilters, QueryHit, QueryRequest, ViewPreset};

pub use registry::{ProjectHandle, ProjectRegistry};
