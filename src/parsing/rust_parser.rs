// Reference `LanguageParser` implementation for Rust, built on
// `tree-sitter-rust`. Kept as the one grounded example external parsers
// are expected to match: a file component, one component per top-level
// item, method components nested under `impl` blocks, and `contains`/
// `implements` relationships between them.

use crate::contracts::{Diagnostic, LanguageParser, ParseOutcome, Severity};
use crate::types::{Component, ComponentId, ComponentType, Location, Relationship, RelationshipType, Target};
use async_trait::async_trait;
use tree_sitter::{Node, Parser};

pub struct RustParser;

impl RustParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageParser for RustParser {
    fn language(&self) -> &'static str {
        "rust"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    async fn parse(&self, path: &str, source: &str) -> ParseOutcome {
        let mut parser = Parser::new();
        if parser.set_language(&tree_sitter_rust::LANGUAGE.into()).is_err() {
            return ParseOutcome {
                diagnostics: vec![Diagnostic {
                    message: "failed to load rust grammar".to_string(),
                    line: None,
                    severity: Severity::Error,
                }],
                ..Default::default()
            };
        }

        let Some(tree) = parser.parse(source, None) else {
            return ParseOutcome {
                diagnostics: vec![Diagnostic {
                    message: "tree-sitter returned no parse tree".to_string(),
                    line: None,
                    severity: Severity::Error,
                }],
                ..Default::default()
            };
        };

        let root = tree.root_node();
        let line_count = source.lines().count().max(1) as u32;
        let file_id = ComponentId::for_structural(
            path,
            path,
            &ComponentType::File,
            &Location {
                start_line: 0,
                end_line: line_count,
                start_col: 0,
                end_col: 0,
            },
        );

        let mut components = vec![Component {
            id: file_id.clone(),
            name: path.to_string(),
            component_type: ComponentType::File,
            language: "rust".to_string(),
            file_path: path.to_string(),
            location: Location {
                start_line: 0,
                end_line: line_count,
                start_col: 0,
                end_col: 0,
            },
            parent_id: None,
            code: None,
            metadata: Default::default(),
        }];
        let mut relationships = Vec::new();
        let mut diagnostics = Vec::new();

        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            visit_item(&child, path, source, &file_id, &mut components, &mut relationships);
        }

        if root.has_error() {
            diagnostics.push(Diagnostic {
                message: "source contains syntax errors; partial results returned".to_string(),
                line: None,
                severity: Severity::Warning,
            });
        }

        ParseOutcome {
            components,
            relationships,
            diagnostics,
        }
    }
}

fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn node_location(node: &Node) -> Location {
    Location {
        start_line: node.start_position().row as u32,
        end_line: node.end_position().row as u32,
        start_col: node.start_position().column as u32,
        end_col: node.end_position().column as u32,
    }
}

fn item_name<'a>(node: &Node, source: &'a str) -> Option<&'a str> {
    node.child_by_field_name("name").map(|n| node_text(&n, source))
}

fn visit_item(
    node: &Node,
    path: &str,
    source: &str,
    file_id: &ComponentId,
    components: &mut Vec<Component>,
    relationships: &mut Vec<Relationship>,
) {
    let component_type = match node.kind() {
        "function_item" => Some(ComponentType::Function),
        "struct_item" => Some(ComponentType::Class),
        "enum_item" => Some(ComponentType::Enum),
        "trait_item" => Some(ComponentType::Interface),
        "mod_item" => Some(ComponentType::Namespace),
        _ => None,
    };

    if let Some(component_type) = component_type {
        let Some(name) = item_name(node, source) else {
            return;
        };
        let location = node_location(node);
        let id = ComponentId::for_structural(path, name, &component_type, &location);
        components.push(Component {
            id: id.clone(),
            name: name.to_string(),
            component_type,
            language: "rust".to_string(),
            file_path: path.to_string(),
            location,
            parent_id: Some(file_id.clone()),
            code: Some(node_text(node, source).to_string()),
            metadata: Default::default(),
        });
        relationships.push(Relationship::new(
            file_id.clone(),
            RelationshipType::Contains,
            Target::Resolved(id.clone()),
        ));

        if node.kind() == "mod_item" {
            if let Some(body) = node.child_by_field_name("body") {
                let mut cursor = body.walk();
                for child in body.children(&mut cursor) {
                    visit_item(&child, path, source, &id, components, relationships);
                }
            }
        }
        return;
    }

    if node.kind() == "impl_item" {
        visit_impl(node, path, source, file_id, components, relationships);
    }
}

fn visit_impl(
    node: &Node,
    path: &str,
    source: &str,
    file_id: &ComponentId,
    components: &mut Vec<Component>,
    relationships: &mut Vec<Relationship>,
) {
    let trait_name = node.child_by_field_name("trait").map(|n| node_text(&n, source));
    let type_name = node.child_by_field_name("type").map(|n| node_text(&n, source));

    let Some(type_name) = type_name else { return };

    // Best-effort: find the struct/enum component this impl block extends.
    let owner_location_guess = Location::point(node.start_position().row as u32, 0);
    let owner_id = ComponentId::for_structural(path, type_name, &ComponentType::Class, &owner_location_guess);

    if let Some(trait_name) = trait_name {
        relationships.push(Relationship::new(
            owner_id.clone(),
            RelationshipType::Implements,
            Target::ResolveByName(trait_name.to_string()),
        ));
    }

    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for child in body.children(&mut cursor) {
            if child.kind() != "function_item" {
                continue;
            }
            let Some(name) = item_name(&child, source) else {
                continue;
            };
            let location = node_location(&child);
            let id = ComponentId::for_structural(path, name, &ComponentType::Method, &location);
            components.push(Component {
                id: id.clone(),
                name: name.to_string(),
                component_type: ComponentType::Method,
                language: "rust".to_string(),
                file_path: path.to_string(),
                location,
                parent_id: Some(file_id.clone()),
                code: Some(node_text(&child, source).to_string()),
                metadata: Default::default(),
            });
            relationships.push(Relationship::new(
                file_id.clone(),
                RelationshipType::Contains,
                Target::Resolved(id),
            ));
        }
    }
}
