//! End-to-end indexing of real Rust source through the tree-sitter parser:
//! discovery finds the file, parsing yields components, and a later
//! `update_file` call replaces what was previously recorded instead of
//! accumulating duplicates.

use felix_index::parsing::rust_parser::RustParser;
use felix_index::{ComponentStore, EngineConfig, FelixStore, LocalEmbeddingService, Orchestrator, ParserRegistry};
use std::sync::Arc;
use tempfile::TempDir;

async fn build_orchestrator(tmp: &TempDir) -> (Orchestrator<FelixStore>, Arc<FelixStore>) {
    let store = Arc::new(
        FelixStore::open(tmp.path().join(".felix"), EngineConfig::default())
            .await
            .unwrap(),
    );
    let mut registry = ParserRegistry::new();
    registry.register(Arc::new(RustParser::new()));
    let orchestrator = Orchestrator::new(
        store.clone(),
        Arc::new(registry),
        Arc::new(LocalEmbeddingService::new(8)),
        EngineConfig::default(),
    );
    (orchestrator, store)
}

const SOURCE_V1: &str = r#"
struct Greeter {
    name: String,
}

impl Greeter {
    fn greet(&self) -> String {
        format!("hello {}", self.name)
    }
}

fn standalone() {}
"#;

#[tokio::test]
async fn indexing_a_directory_discovers_and_persists_rust_components() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("greeter.rs"), SOURCE_V1).unwrap();
    let (orchestrator, store) = build_orchestrator(&tmp).await;

    let result = orchestrator.index_directory(tmp.path()).await.unwrap();
    assert!(result.success);
    assert_eq!(result.files_processed, 1);
    assert!(result.component_count >= 3, "expected file+struct+fn components, got {}", result.component_count);

    let path = tmp.path().join("greeter.rs").to_string_lossy().to_string();
    let components = store.components_for_path(&path).await.unwrap();
    assert!(components.iter().any(|c| c.name == "Greeter"));
    assert!(components.iter().any(|c| c.name == "standalone"));
}

#[tokio::test]
async fn update_file_replaces_prior_rust_components_rather_than_accumulating() {
    let tmp = TempDir::new().unwrap();
    let file_path = tmp.path().join("greeter.rs");
    std::fs::write(&file_path, SOURCE_V1).unwrap();
    let (orchestrator, store) = build_orchestrator(&tmp).await;
    let path_str = file_path.to_string_lossy().to_string();

    let first = orchestrator.update_file(&path_str).await.unwrap();
    assert!(first.component_count > 0);

    std::fs::write(&file_path, "fn only_one() {}").unwrap();
    let second = orchestrator.update_file(&path_str).await.unwrap();

    let components = store.components_for_path(&path_str).await.unwrap();
    assert_eq!(components.len(), second.component_count);
    assert!(components.iter().any(|c| c.name == "only_one"));
    assert!(!components.iter().any(|c| c.name == "Greeter"));
}
