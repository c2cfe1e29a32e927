//! Lens-based subgraph expansion (spec §4.9 "Subgraph / lens"): from a seed
//! component, follow only the edge types a given lens allows, in the
//! directions the lens allows, up to a depth bound, with cycle detection.
//! Grounded on `kotadb::relationship_query`'s traversal shape, generalized
//! from symbol call-graphs to the full component relationship graph.

use crate::contracts::{ComponentStore, RelationshipStore};
use crate::error::Result;
use crate::types::{Component, ComponentId, Relationship, RelationshipType, Target};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lens {
    Callers,
    Callees,
    DataFlow,
    Inheritance,
    Imports,
    Full,
    Default,
}

impl Lens {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "callers" => Some(Lens::Callers),
            "callees" => Some(Lens::Callees),
            "dataflow" => Some(Lens::DataFlow),
            "inheritance" => Some(Lens::Inheritance),
            "imports" => Some(Lens::Imports),
            "full" => Some(Lens::Full),
            "default" => Some(Lens::Default),
            _ => None,
        }
    }

    /// Whether this lens follows incoming edges (edges whose resolved
    /// target is the node being expanded from).
    fn follows_incoming(&self) -> bool {
        !matches!(self, Lens::Callees)
    }

    /// Whether this lens follows outgoing edges (edges sourced at the node
    /// being expanded from).
    fn follows_outgoing(&self) -> bool {
        !matches!(self, Lens::Callers)
    }

    fn allows(&self, relationship_type: &RelationshipType) -> bool {
        use RelationshipType::*;
        match self {
            Lens::Callers | Lens::Callees => matches!(relationship_type, Calls),
            Lens::DataFlow => matches!(
                relationship_type,
                UsesField | TransformsData | PassesTo | ReturnsFrom | ReadsFrom | WritesTo | DerivesFrom | Modifies
            ),
            Lens::Inheritance => matches!(relationship_type, Extends | Implements),
            Lens::Imports => matches!(relationship_type, ImportsFrom | DependsOn),
            Lens::Full => true,
            Lens::Default => !relationship_type.is_hierarchical_container(),
        }
    }

    /// Whether nodes reached through this lens should carry full source
    /// instead of a skeleton.
    pub fn prefers_full_source(&self) -> bool {
        matches!(self, Lens::Callers | Lens::Callees | Lens::Full)
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SubgraphResult {
    pub nodes: Vec<ComponentId>,
    pub edges: Vec<Relationship>,
    pub cycles_detected: u32,
    /// Rendered source per node id (spec §4.9 lens table "Related source"
    /// column): full source for lenses that prefer it, a skeleton
    /// otherwise. Missing an entry means the node's component could not be
    /// fetched.
    pub related_source: std::collections::HashMap<String, String>,
}

/// Breadth-first expansion from `seed`, following only edges `lens` allows,
/// to depth `max_depth`. Re-visiting an already-expanded node counts as a
/// detected cycle and does not recurse further from it.
pub async fn expand<S>(store: &Arc<S>, seed: &ComponentId, lens: Lens, max_depth: u32) -> Result<SubgraphResult>
where
    S: ComponentStore + RelationshipStore + Send + Sync + 'static,
{
    let mut result = SubgraphResult::default();
    let mut visited: HashSet<ComponentId> = HashSet::new();
    visited.insert(seed.clone());
    result.nodes.push(seed.clone());

    if lens == Lens::Default {
        if let Ok(Some(seed_component)) = store.get_component(seed).await {
            if let Some(parent_id) = &seed_component.parent_id {
                visited.insert(parent_id.clone());
                result.nodes.push(parent_id.clone());
            }
        }
    }

    let mut frontier: VecDeque<(ComponentId, u32)> = VecDeque::new();
    frontier.push_back((seed.clone(), 0));

    while let Some((current, depth)) = frontier.pop_front() {
        if depth >= max_depth {
            continue;
        }

        let mut neighbors: Vec<(ComponentId, Relationship)> = Vec::new();
        if lens.follows_outgoing() {
            for relationship in store.relationships_from(&current).await? {
                if !lens.allows(&relationship.relationship_type) {
                    continue;
                }
                if let Target::Resolved(target_id) = &relationship.target {
                    neighbors.push((target_id.clone(), relationship));
                }
            }
        }
        if lens.follows_incoming() {
            for relationship in store.relationships_to(&current).await? {
                if !lens.allows(&relationship.relationship_type) {
                    continue;
                }
                neighbors.push((relationship.source_id.clone(), relationship));
            }
        }

        for (neighbor_id, relationship) in neighbors {
            result.edges.push(relationship);
            if visited.contains(&neighbor_id) {
                result.cycles_detected += 1;
                continue;
            }
            visited.insert(neighbor_id.clone());
            result.nodes.push(neighbor_id.clone());
            frontier.push_back((neighbor_id, depth + 1));
        }
    }

    let full_source = lens.prefers_full_source();
    let mut by_parent: std::collections::HashMap<ComponentId, Vec<Component>> = std::collections::HashMap::new();
    if !full_source {
        for component in store.all_components().await? {
            if let Some(parent_id) = component.parent_id.clone() {
                by_parent.entry(parent_id).or_default().push(component);
            }
        }
    }
    for node_id in &result.nodes {
        let Some(component) = store.get_component(node_id).await? else {
            continue;
        };
        let rendered = if full_source {
            component.code.clone().unwrap_or_default()
        } else {
            let members = by_parent.get(node_id).cloned().unwrap_or_default();
            skeleton(&component, &members)
        };
        result.related_source.insert(node_id.as_str().to_string(), rendered);
    }

    Ok(result)
}

/// Render a component as a skeleton: its signature plus child member
/// signatures, rather than full source.
pub fn skeleton(component: &Component, members: &[Component]) -> String {
    let signature = component
        .metadata
        .get_str("signature")
        .unwrap_or(component.name.as_str());
    let mut lines = vec![format!("{} {}", component.component_type.as_str(), signature)];
    for member in members {
        let member_sig = member.metadata.get_str("signature").unwrap_or(member.name.as_str());
        lines.push(format!("  {} {}", member.component_type.as_str(), member_sig));
    }
    lines.join("\n")
}
