//! A caller imports a symbol by name through a barrel file that re-exports
//! it from the module where it is actually declared; resolution must follow
//! the barrel hop and land on the real declaration, not the barrel's own
//! re-export record.

use felix_index::{
    Component, ComponentId, ComponentStore, ComponentType, EngineConfig, FelixStore, Location,
    MetadataBag, Relationship, RelationshipStore, RelationshipType, Resolver, Target,
};
use std::sync::Arc;
use tempfile::TempDir;

fn component(path: &str, name: &str, component_type: ComponentType, metadata: MetadataBag) -> Component {
    let location = Location::point(1, 0);
    Component {
        id: ComponentId::for_structural(path, name, &component_type, &location),
        name: name.to_string(),
        component_type,
        language: "typescript".to_string(),
        file_path: path.to_string(),
        location,
        parent_id: None,
        code: None,
        metadata,
    }
}

#[tokio::test]
async fn resolve_by_name_follows_barrel_reexport_to_real_declaration() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FelixStore::open(tmp.path(), EngineConfig::default()).await.unwrap());

    let mut lib_metadata = MetadataBag::new();
    lib_metadata.insert("fqn", "lib::X");
    let declaration = component("lib.ts", "X", ComponentType::Variable, lib_metadata);
    let declaration_id = declaration.id.clone();
    store.put_component(declaration).await.unwrap();

    let mut barrel_metadata = MetadataBag::new();
    barrel_metadata.insert("reexportsFqn", "lib::X");
    let barrel = component("barrel.ts", "X", ComponentType::Export, barrel_metadata);
    store.put_component(barrel).await.unwrap();

    let caller = component("use.ts", "main", ComponentType::Function, MetadataBag::new());
    let caller_id = caller.id.clone();
    store.put_component(caller).await.unwrap();
    store
        .put_relationship(Relationship::new(
            caller_id.clone(),
            RelationshipType::Calls,
            Target::ResolveByName("X".to_string()),
        ))
        .await
        .unwrap();

    let resolver = Resolver::new(store.clone());
    let report = resolver.resolve_pass().await.unwrap();
    assert_eq!(report.resolved, 1);

    let rels = store.relationships_from(&caller_id).await.unwrap();
    assert_eq!(rels[0].target, Target::Resolved(declaration_id));
}
