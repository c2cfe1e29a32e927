//! Subgraph expansion at depth zero returns only the seed, with no edges;
//! the inheritance lens at depth one follows exactly the `implements` edge
//! between a class and the interface it implements, and nothing else.

use felix_index::{
    expand_lens, Component, ComponentId, ComponentStore, ComponentType, EngineConfig, FelixStore,
    Lens, Location, Relationship, RelationshipStore, RelationshipType, Target,
};
use std::sync::Arc;
use tempfile::TempDir;

fn component(path: &str, name: &str, component_type: ComponentType) -> Component {
    let location = Location::point(1, 0);
    Component {
        id: ComponentId::for_structural(path, name, &component_type, &location),
        name: name.to_string(),
        component_type,
        language: "rust".to_string(),
        file_path: path.to_string(),
        location,
        parent_id: None,
        code: None,
        metadata: Default::default(),
    }
}

#[tokio::test]
async fn depth_zero_expansion_returns_only_the_seed() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap());

    let seed = component("a.rs", "lonely", ComponentType::Function);
    let seed_id = seed.id.clone();
    store.put_component(seed).await.unwrap();

    let other = component("a.rs", "elsewhere", ComponentType::Function);
    let other_id = other.id.clone();
    store.put_component(other).await.unwrap();
    store
        .put_relationship(Relationship::new(seed_id.clone(), RelationshipType::Calls, Target::Resolved(other_id)))
        .await
        .unwrap();

    let result = expand_lens(&store, &seed_id, Lens::Full, 0).await.unwrap();
    assert_eq!(result.nodes, vec![seed_id]);
    assert!(result.edges.is_empty());
}

#[tokio::test]
async fn inheritance_lens_follows_exactly_the_implements_edge() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap());

    let class = component("widget.rs", "Widget", ComponentType::Class);
    let class_id = class.id.clone();
    store.put_component(class).await.unwrap();

    let iface = component("drawable.rs", "Drawable", ComponentType::Interface);
    let iface_id = iface.id.clone();
    store.put_component(iface).await.unwrap();

    store
        .put_relationship(Relationship::new(
            class_id.clone(),
            RelationshipType::Implements,
            Target::Resolved(iface_id.clone()),
        ))
        .await
        .unwrap();
    // A sibling edge the inheritance lens must not follow.
    store
        .put_relationship(Relationship::new(class_id.clone(), RelationshipType::Calls, Target::Resolved(iface_id.clone())))
        .await
        .unwrap();

    let result = expand_lens(&store, &class_id, Lens::Inheritance, 1).await.unwrap();
    assert_eq!(result.nodes.len(), 2);
    assert!(result.nodes.contains(&class_id));
    assert!(result.nodes.contains(&iface_id));
    assert_eq!(result.edges.len(), 1);
    assert_eq!(result.edges[0].relationship_type, RelationshipType::Implements);
}
