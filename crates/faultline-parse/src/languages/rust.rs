use faultline_core::{EdgeKind, Language, Symbol, SymbolEdge, normalize_for_fingerprint};
use tree_sitter::Node;

use crate::ParseError;
use crate::parser::{
    clean_target, enclosing_symbol_name, has_ancestor_kind, named_child_text, nearest_ancestor,
    node_text,
};
use crate::registry::{LanguageConfig, LanguageHooks, QueryCaptures};

pub fn config() -> Result<LanguageConfig, ParseError> {
    LanguageConfig::compile(
        "rust",
        &[Language::Rust],
        tree_sitter_rust::LANGUAGE.into(),
        include_str!("../../queries/rust_symbols.scm"),
        include_str!("../../queries/rust_edges.scm"),
        Box::new(RustHooks),
    )
}

struct RustHooks;

impl LanguageHooks for RustHooks {
    fn scope_of(&self, node: Node<'_>, source: &[u8]) -> Vec<String> {
        let mut context = Vec::new();
        let mut current = node.parent();

        while let Some(cursor) = current {
            match cursor.kind() {
                "mod_item" | "trait_item" => {
                    if let Some(name) = named_child_text(cursor, "name", source) {
                        context.push(name);
                    }
                }
                "impl_item" => context.push(impl_target(cursor, source)),
                _ => {}
            }
            current = cursor.parent();
        }

        context.reverse();
        context
    }

    fn is_method(&self, node: Node<'_>) -> bool {
        has_ancestor_kind(node, "impl_item") || has_ancestor_kind(node, "trait_item")
    }

    fn map_edge(
        &self,
        _language: Language,
        captures: &QueryCaptures<'_, '_>,
        source: &[u8],
        file_path: &str,
        symbols: &[Symbol],
    ) -> Option<Vec<SymbolEdge>> {
        if captures.first_capture_name_with_prefix("edge.")? != "edge.call" {
            return None;
        }
        let node = captures.node_with_prefix("edge.")?;
        let target = clean_target(&captures.capture_text("target", source)?);
        let method = target.strip_prefix("self.")?;
        let impl_node = nearest_ancestor(node, &["impl_item"])?;

        Some(vec![SymbolEdge {
            source: enclosing_symbol_name(symbols, node)?,
            target: format!("{}::{method}", impl_target(impl_node, source)),
            edge_kind: EdgeKind::Calls,
            file_path: file_path.to_owned(),
        }])
    }
}

/// `impl Foo` and `impl Trait for Foo` both scope their items under `Foo`.
fn impl_target(node: Node<'_>, source: &[u8]) -> String {
    node.child_by_field_name("type")
        .map(|ty| normalize_for_fingerprint(&node_text(ty, source)))
        .map(|name| name.split('<').next().unwrap_or_default().to_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "impl".to_owned())
}
