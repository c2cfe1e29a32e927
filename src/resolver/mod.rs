//! Cross-file symbol resolution: rewrites sentinel relationship targets
//! (`UNRESOLVED:`, `EXTERNAL:`, `RESOLVE:`) into concrete component ids once
//! the referenced symbol has been indexed, following import-alias/barrel
//! re-export chains. Grounded on the teacher's `dependency_extractor`
//! FQN/graph resolution idiom, generalized from a single in-process graph
//! to a resolve pass over the store.

pub mod debounce;

use crate::contracts::{ComponentStore, RelationshipStore};
use crate::error::Result;
use crate::observability;
use crate::types::{Component, ComponentId, ComponentType, Target};
use dashmap::DashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Barrel/re-export chains are followed at most this many hops before
/// giving up, to bound cyclic re-export graphs.
const MAX_BARREL_DEPTH: u32 = 8;

/// `0` when `component` matches the caller's language (sorts first), `1`
/// otherwise. A missing caller language (synthetic or orphaned caller)
/// never penalizes any candidate.
fn same_language_rank(component: &Component, caller_language: Option<&str>) -> u8 {
    match caller_language {
        Some(lang) if component.language != lang => 1,
        _ => 0,
    }
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ResolveReport {
    pub scanned: usize,
    pub resolved: usize,
    pub still_unresolved: usize,
    pub cycles_detected: u32,
}

pub struct Resolver<S> {
    store: Arc<S>,
    fqn_index: DashMap<String, ComponentId>,
    name_index: DashMap<String, Vec<ComponentId>>,
}

impl<S> Resolver<S>
where
    S: ComponentStore + RelationshipStore + Send + Sync + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            fqn_index: DashMap::new(),
            name_index: DashMap::new(),
        }
    }

    /// Rebuild the in-memory FQN/name indices from the store. Cheap enough
    /// to call at the start of every resolve pass; the store is the source
    /// of truth.
    async fn rebuild_indices(&self) -> Result<()> {
        self.fqn_index.clear();
        self.name_index.clear();
        for component in self.store.all_components().await? {
            if let Some(fqn) = component.metadata.fqn() {
                self.fqn_index.insert(fqn.to_string(), component.id.clone());
            }
            self.name_index
                .entry(component.name.clone())
                .or_default()
                .push(component.id.clone());
        }
        Ok(())
    }

    /// Run one resolve pass: every sentinel-target relationship is looked
    /// up against the current index; resolved relationships are never
    /// revisited within the same pass (spec P4, monotonic-in-a-pass).
    pub async fn resolve_pass(&self) -> Result<ResolveReport> {
        self.rebuild_indices().await?;
        self.revalidate_dangling_targets().await?;
        observability::record_resolve_pass();

        let mut report = ResolveReport::default();
        let unresolved = self.store.unresolved_relationships().await?;
        report.scanned = unresolved.len();

        for relationship in unresolved {
            let caller_language = self
                .store
                .get_component(&relationship.source_id)
                .await
                .ok()
                .flatten()
                .map(|c| c.language);
            let original_target_str = relationship.target.to_string();
            match self.resolve_target(&relationship.target, caller_language.as_deref()).await {
                Some(resolved_id) => {
                    let mut updated = relationship.clone();
                    updated.target = Target::Resolved(resolved_id.clone());
                    updated.metadata.insert("isResolved", true);
                    updated.metadata.insert("targetId", resolved_id.as_str().to_string());
                    updated.metadata.insert("unresolvedTarget", original_target_str);
                    self.store.put_relationship(updated).await?;
                    report.resolved += 1;
                }
                None => report.still_unresolved += 1,
            }
        }

        debug!(
            scanned = report.scanned,
            resolved = report.resolved,
            still_unresolved = report.still_unresolved,
            "resolve pass complete"
        );
        Ok(report)
    }

    /// A previously-resolved relationship whose target component has since
    /// been removed (e.g. its owning file was deleted) is downgraded back
    /// to the sentinel it held before resolution, so the scan below picks
    /// it up again instead of leaving a dangling `Resolved` id pointing at
    /// nothing. Restoring the deleted component and reindexing lets the
    /// next pass resolve it again (spec scenario: delete then restore A).
    async fn revalidate_dangling_targets(&self) -> Result<()> {
        for relationship in self.store.all_relationships().await? {
            let Target::Resolved(target_id) = &relationship.target else {
                continue;
            };
            if !relationship.metadata.is_resolved() {
                continue;
            }
            if self.store.get_component(target_id).await?.is_some() {
                continue;
            }
            let Some(original) = relationship.metadata.get_str("unresolvedTarget") else {
                continue;
            };
            let Ok(sentinel) = Target::from_str(original) else {
                continue;
            };
            let mut downgraded = relationship.clone();
            downgraded.target = sentinel;
            downgraded.metadata.insert("isResolved", false);
            self.store.put_relationship(downgraded).await?;
        }
        Ok(())
    }

    async fn resolve_target(&self, target: &Target, caller_language: Option<&str>) -> Option<ComponentId> {
        match target {
            Target::Resolved(_) => None,
            Target::External(_) => None,
            Target::Unresolved(fqn) => self.resolve_by_fqn(fqn).await,
            Target::ResolveByName(name) => self.resolve_by_name(name, caller_language).await,
        }
    }

    async fn resolve_by_fqn(&self, fqn: &str) -> Option<ComponentId> {
        let direct = self.fqn_index.get(fqn).map(|e| e.value().clone())?;
        self.follow_barrel_chain(direct).await
    }

    /// Tie-break on multiple name matches: prefer components in the same
    /// language as the referencing component, then break ties
    /// alphabetically by file path (spec §4.4).
    async fn resolve_by_name(&self, name: &str, caller_language: Option<&str>) -> Option<ComponentId> {
        let candidates = self.name_index.get(name)?.value().clone();
        if candidates.is_empty() {
            return None;
        }
        if candidates.len() == 1 {
            return self.follow_barrel_chain(candidates[0].clone()).await;
        }

        let mut resolved_candidates: Vec<Component> = Vec::new();
        for id in &candidates {
            if let Ok(Some(component)) = self.store.get_component(id).await {
                resolved_candidates.push(component);
            }
        }
        resolved_candidates.sort_by(|a, b| {
            let a_key = (same_language_rank(a, caller_language), a.file_path.clone());
            let b_key = (same_language_rank(b, caller_language), b.file_path.clone());
            a_key.cmp(&b_key)
        });
        let winner = resolved_candidates.into_iter().next()?;
        self.follow_barrel_chain(winner.id).await
    }

    /// If the resolved component is itself a re-export (an `Import`/
    /// `Export` component whose metadata names another FQN), follow the
    /// chain until a non-re-export component is found or `MAX_BARREL_DEPTH`
    /// is exceeded.
    async fn follow_barrel_chain(&self, start: ComponentId) -> Option<ComponentId> {
        let mut current = start;
        for _ in 0..MAX_BARREL_DEPTH {
            let component = self.store.get_component(&current).await.ok()??;
            let is_reexport = matches!(component.component_type, ComponentType::Import | ComponentType::Export);
            if !is_reexport {
                return Some(current);
            }
            let Some(next_fqn) = component.metadata.get_str("reexportsFqn") else {
                return Some(current);
            };
            match self.fqn_index.get(next_fqn) {
                Some(next_id) => current = next_id.value().clone(),
                None => return None,
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FelixStore;
    use crate::types::{Location, Relationship, RelationshipType};
    use proptest::prelude::*;
    use tempfile::TempDir;

    async fn new_store() -> FelixStore {
        let tmp = TempDir::new().unwrap();
        FelixStore::open(tmp.path(), crate::config::EngineConfig::default())
            .await
            .unwrap()
    }

    fn component_with_fqn(path: &str, name: &str, fqn: &str) -> Component {
        let location = Location::point(1, 0);
        let id = ComponentId::for_fqn(fqn);
        let mut metadata = crate::types::MetadataBag::new();
        metadata.insert("fqn", fqn);
        Component {
            id,
            name: name.to_string(),
            component_type: ComponentType::Interface,
            language: "php".to_string(),
            file_path: path.to_string(),
            location,
            parent_id: None,
            code: None,
            metadata,
        }
    }

    #[tokio::test]
    async fn resolves_unresolved_fqn_target_once_available() {
        let store = Arc::new(new_store().await);
        let iface = component_with_fqn("Loggable.php", "Loggable", "App\\Contracts\\Loggable");
        let iface_id = iface.id.clone();
        store.put_component(iface).await.unwrap();

        let logger = component_with_fqn("Logger.php", "Logger", "App\\Services\\Logger");
        let logger_id = logger.id.clone();
        store.put_component(logger).await.unwrap();

        store
            .put_relationship(Relationship::new(
                logger_id.clone(),
                RelationshipType::Implements,
                Target::Unresolved("App\\Contracts\\Loggable".to_string()),
            ))
            .await
            .unwrap();

        let resolver = Resolver::new(store.clone());
        let report = resolver.resolve_pass().await.unwrap();
        assert_eq!(report.resolved, 1);
        assert_eq!(report.still_unresolved, 0);

        let rels = store.relationships_from(&logger_id).await.unwrap();
        assert_eq!(rels[0].target, Target::Resolved(iface_id));
        assert_eq!(rels[0].metadata.is_resolved(), true);
    }

    #[tokio::test]
    async fn missing_target_stays_unresolved() {
        let store = Arc::new(new_store().await);
        let logger = component_with_fqn("Logger.php", "Logger", "App\\Services\\Logger");
        let logger_id = logger.id.clone();
        store.put_component(logger).await.unwrap();
        store
            .put_relationship(Relationship::new(
                logger_id.clone(),
                RelationshipType::Implements,
                Target::Unresolved("App\\Contracts\\Missing".to_string()),
            ))
            .await
            .unwrap();

        let resolver = Resolver::new(store);
        let report = resolver.resolve_pass().await.unwrap();
        assert_eq!(report.resolved, 0);
        assert_eq!(report.still_unresolved, 1);
    }

    #[tokio::test]
    async fn name_tie_break_prefers_alphabetically_first_path() {
        let store = Arc::new(new_store().await);
        let a = component_with_fqn("b_file.rs", "helper", "b_file::helper");
        let b = component_with_fqn("a_file.rs", "helper", "a_file::helper");
        let winner_id = b.id.clone();
        store.put_component(a).await.unwrap();
        store.put_component(b).await.unwrap();

        let caller = component_with_fqn("caller.rs", "caller", "caller::caller");
        let caller_id = caller.id.clone();
        store.put_component(caller).await.unwrap();
        store
            .put_relationship(Relationship::new(
                caller_id.clone(),
                RelationshipType::Calls,
                Target::ResolveByName("helper".to_string()),
            ))
            .await
            .unwrap();

        let resolver = Resolver::new(store.clone());
        resolver.resolve_pass().await.unwrap();

        let rels = store.relationships_from(&caller_id).await.unwrap();
        assert_eq!(rels[0].target, Target::Resolved(winner_id));
    }

    #[tokio::test]
    async fn deleted_target_is_downgraded_to_sentinel_and_reresolves_on_restore() {
        let store = Arc::new(new_store().await);
        let iface = component_with_fqn("Loggable.php", "Loggable", "App\\Contracts\\Loggable");
        store.put_component(iface.clone()).await.unwrap();

        let logger = component_with_fqn("Logger.php", "Logger", "App\\Services\\Logger");
        let logger_id = logger.id.clone();
        store.put_component(logger).await.unwrap();
        store
            .put_relationship(Relationship::new(
                logger_id.clone(),
                RelationshipType::Implements,
                Target::Unresolved("App\\Contracts\\Loggable".to_string()),
            ))
            .await
            .unwrap();

        let resolver = Resolver::new(store.clone());
        let first = resolver.resolve_pass().await.unwrap();
        assert_eq!(first.resolved, 1);

        store.remove_components_for_path("Loggable.php").await.unwrap();
        let second = resolver.resolve_pass().await.unwrap();
        let rels = store.relationships_from(&logger_id).await.unwrap();
        assert_eq!(rels[0].target, Target::Unresolved("App\\Contracts\\Loggable".to_string()));
        assert_eq!(second.still_unresolved, 1);

        store.put_component(iface).await.unwrap();
        let third = resolver.resolve_pass().await.unwrap();
        assert_eq!(third.resolved, 1);
        let rels = store.relationships_from(&logger_id).await.unwrap();
        assert!(matches!(rels[0].target, Target::Resolved(_)));
    }

    proptest! {
        // A resolve pass only ever touches relationships it finds through
        // `unresolved_relationships()`; a relationship already resolved before
        // the pass starts cannot be revisited by the resolve loop itself, so
        // it can only be downgraded by `revalidate_dangling_targets` — and
        // only when its target component is actually missing. With every
        // target component present throughout, no relationship may regress
        // from resolved to unresolved within one pass, for any count of
        // satisfiable targets.
        #[test]
        fn resolved_relationships_never_regress_within_one_pass(resolvable_count in 0usize..8) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let regressions = rt.block_on(async {
                let store = Arc::new(new_store().await);
                let mut logger_ids = Vec::new();

                for i in 0..resolvable_count {
                    let fqn = format!("App\\Contracts\\Iface{i}");
                    let iface = component_with_fqn(&format!("Iface{i}.php"), &format!("Iface{i}"), &fqn);
                    store.put_component(iface).await.unwrap();

                    let logger = component_with_fqn(&format!("Logger{i}.php"), &format!("Logger{i}"), &format!("App\\Services\\Logger{i}"));
                    let logger_id = logger.id.clone();
                    store.put_component(logger).await.unwrap();
                    store
                        .put_relationship(Relationship::new(
                            logger_id.clone(),
                            RelationshipType::Implements,
                            Target::Unresolved(fqn),
                        ))
                        .await
                        .unwrap();
                    logger_ids.push(logger_id);
                }

                let resolver = Resolver::new(store.clone());
                resolver.resolve_pass().await.unwrap();

                let mut before = Vec::new();
                for id in &logger_ids {
                    let rels = store.relationships_from(id).await.unwrap();
                    before.push(matches!(rels[0].target, Target::Resolved(_)));
                }

                resolver.resolve_pass().await.unwrap();

                let mut regressions = 0usize;
                for (id, was_resolved) in logger_ids.iter().zip(before) {
                    let rels = store.relationships_from(id).await.unwrap();
                    let is_resolved = matches!(rels[0].target, Target::Resolved(_));
                    if was_resolved && !is_resolved {
                        regressions += 1;
                    }
                }
                regressions
            });

            prop_assert_eq!(regressions, 0);
        }
    }
}
