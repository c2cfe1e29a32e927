//! Documentation link resolver (spec §4.6): turns the metadata a
//! documentation parser attaches to markdown/index components (explicit
//! ids, index entries, anchors, relative links) into `documents`/
//! `references` relationships at a fixed confidence, batched through the
//! store's write lane. Grounded on the teacher's
//! `documentation_verification` status/confidence classification pattern,
//! generalized from verification checks to link resolution.

use crate::contracts::{ComponentStore, RelationshipStore};
use crate::error::{FelixError, Result};
use crate::types::{Component, ComponentType, Relationship, RelationshipType, Target};
use std::sync::Arc;
use tracing::debug;

const DOC_LANGUAGES: &[&str] = &["markdown", "documentation", "index"];
const BATCH_SIZE: usize = 500;

const CONFIDENCE_EXPLICIT_ID: f64 = 0.95;
const CONFIDENCE_OTHER: f64 = 0.80;

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct DocResolveReport {
    pub doc_components_scanned: usize,
    pub relationships_emitted: usize,
    pub external_links_skipped: usize,
}

pub struct DocResolver<S> {
    store: Arc<S>,
    resolve_limit: usize,
    db_retries: u32,
}

impl<S> DocResolver<S>
where
    S: ComponentStore + RelationshipStore + Send + Sync + 'static,
{
    pub fn new(store: Arc<S>, resolve_limit: usize, db_retries: u32) -> Self {
        Self {
            store,
            resolve_limit,
            db_retries,
        }
    }

    /// Write one resolved link, retrying up to `db_retries` times if the
    /// write lane reports exhausted contention. Any other error propagates
    /// immediately: this budget is for transient contention, not fatal
    /// store failures.
    async fn put_relationship_with_retry(&self, relationship: &Relationship) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            match self.store.put_relationship(relationship.clone()).await {
                Ok(()) => return Ok(()),
                Err(FelixError::StoreContentionExhausted { .. }) if attempt < self.db_retries => {
                    attempt += 1;
                    debug!(attempt, "retrying documentation-link write after contention");
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn resolve_all(&self) -> Result<DocResolveReport> {
        let mut report = DocResolveReport::default();
        let all = self.store.all_components().await?;
        let doc_components: Vec<&Component> = all
            .iter()
            .filter(|c| DOC_LANGUAGES.contains(&c.language.as_str()))
            .take(self.resolve_limit)
            .collect();
        report.doc_components_scanned = doc_components.len();

        let mut pending: Vec<Relationship> = Vec::new();
        for doc in &doc_components {
            self.resolve_one(doc, &all, &mut pending, &mut report).await?;
        }

        for chunk in pending.chunks(BATCH_SIZE) {
            for relationship in chunk {
                self.put_relationship_with_retry(relationship).await?;
                report.relationships_emitted += 1;
            }
        }

        debug!(
            scanned = report.doc_components_scanned,
            emitted = report.relationships_emitted,
            "documentation link resolution complete"
        );
        Ok(report)
    }

    async fn resolve_one(
        &self,
        doc: &Component,
        all: &[Component],
        pending: &mut Vec<Relationship>,
        report: &mut DocResolveReport,
    ) -> Result<()> {
        // Rule 1: explicit id reference.
        if let Some(target_id) = doc.metadata.get_str("refComponentId") {
            if let Ok(id) = crate::types::ComponentId::from_raw(target_id) {
                pending.push(relationship_with_confidence(
                    doc,
                    RelationshipType::References,
                    Target::Resolved(id),
                    CONFIDENCE_EXPLICIT_ID,
                    "explicit_id",
                ));
            }
        }

        // Rule 2: index entries naming other files.
        if let Some(entries) = doc.metadata.get("indexEntries").and_then(|v| v.as_array()) {
            for entry in entries {
                if let Some(path) = entry.as_str() {
                    for target in all.iter().filter(|c| c.file_path == path && !is_doc_language(&c.language)) {
                        pending.push(relationship_with_confidence(
                            doc,
                            RelationshipType::Documents,
                            Target::Resolved(target.id.clone()),
                            CONFIDENCE_OTHER,
                            "index_entry",
                        ));
                    }
                }
            }
        }

        // Rules 3-5 require an inline link.
        let Some(link_url) = doc.metadata.get_str("linkUrl").filter(|_| doc.metadata.get_bool("isLink").unwrap_or(false))
        else {
            return Ok(());
        };

        if has_scheme(link_url) {
            report.external_links_skipped += 1;
            return Ok(());
        }

        if let Some(anchor) = link_url.strip_prefix('#') {
            link_to_anchor_in_same_file(doc, all, anchor, pending);
            return Ok(());
        }

        let (rel_path, anchor) = split_anchor(link_url);
        let resolved_path = resolve_relative(&doc.file_path, rel_path);

        if let Some(anchor) = anchor {
            link_to_anchor_in_file(doc, all, &resolved_path, anchor, pending);
        }
        for target in all
            .iter()
            .filter(|c| c.file_path == resolved_path && !is_doc_language(&c.language))
        {
            pending.push(relationship_with_confidence(
                doc,
                RelationshipType::References,
                Target::Resolved(target.id.clone()),
                CONFIDENCE_OTHER,
                "markdown_link",
            ));
        }

        Ok(())
    }
}

fn is_doc_language(language: &str) -> bool {
    DOC_LANGUAGES.contains(&language)
}

fn has_scheme(url: &str) -> bool {
    url.split_once(':')
        .map(|(scheme, _)| scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-'))
        .unwrap_or(false)
}

fn split_anchor(url: &str) -> (&str, Option<&str>) {
    match url.split_once('#') {
        Some((path, anchor)) => (path, Some(anchor)),
        None => (url, None),
    }
}

/// POSIX-normalize a relative link against the linking doc's own directory.
fn resolve_relative(doc_path: &str, rel_path: &str) -> String {
    let base_dir = std::path::Path::new(doc_path).parent().unwrap_or_else(|| std::path::Path::new(""));
    let joined = base_dir.join(rel_path);

    let mut normalized = Vec::new();
    for component in joined.components() {
        match component {
            std::path::Component::ParentDir => {
                normalized.pop();
            }
            std::path::Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    normalized.iter().collect::<std::path::PathBuf>().to_string_lossy().replace('\\', "/")
}

fn link_to_anchor_in_same_file(doc: &Component, all: &[Component], anchor: &str, pending: &mut Vec<Relationship>) {
    link_to_anchor_in_file(doc, all, &doc.file_path, anchor, pending);
}

fn link_to_anchor_in_file(doc: &Component, all: &[Component], file_path: &str, anchor: &str, pending: &mut Vec<Relationship>) {
    for target in all.iter().filter(|c| {
        c.file_path == file_path
            && matches!(c.component_type, ComponentType::Section)
            && c.metadata.get_str("heading_id") == Some(anchor)
    }) {
        pending.push(relationship_with_confidence(
            doc,
            RelationshipType::References,
            Target::Resolved(target.id.clone()),
            CONFIDENCE_OTHER,
            "markdown_anchor",
        ));
    }
}

fn relationship_with_confidence(
    doc: &Component,
    relationship_type: RelationshipType,
    target: Target,
    confidence: f64,
    reason: &str,
) -> Relationship {
    let mut relationship = Relationship::new(doc.id.clone(), relationship_type, target);
    relationship.metadata.insert("confidence", confidence);
    relationship.metadata.insert("reason", reason);
    relationship
}
