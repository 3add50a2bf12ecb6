use faultline_core::{Language, Symbol, SymbolKind};
use tree_sitter::Node;

use crate::ParseError;
use crate::parser::{build_symbol, node_text, sanitize_name};
use crate::registry::{LanguageConfig, LanguageHooks, QueryCaptures};

pub fn config() -> Result<LanguageConfig, ParseError> {
    LanguageConfig::compile(
        "c",
        &[Language::C],
        tree_sitter_c::LANGUAGE.into(),
        include_str!("../../queries/c_symbols.scm"),
        include_str!("../../queries/c_edges.scm"),
        Box::new(CHooks),
    )
}

struct CHooks;

impl LanguageHooks for CHooks {
    fn map_symbol(
        &self,
        language: Language,
        captures: &QueryCaptures<'_, '_>,
        source: &[u8],
        file_path: &str,
    ) -> Option<Symbol> {
        if captures.first_capture_name_with_prefix("symbol.")? != "symbol.function" {
            return None;
        }
        let node = captures.node_with_prefix("symbol.")?;
        let name = declarator_name(captures.node("declarator")?, source)?;

        Some(build_symbol(
            language,
            file_path,
            SymbolKind::Function,
            &name,
            &name,
            node,
            source,
        ))
    }
}

/// Follows nested `declarator` fields (pointer, function, parenthesized)
/// down to the declared identifier.
fn declarator_name(mut node: Node<'_>, source: &[u8]) -> Option<String> {
    loop {
        match node.kind() {
            "identifier" | "field_identifier" => {
                let name = sanitize_name(node_text(node, source));
                return (!name.is_empty()).then_some(name);
            }
            "parenthesized_declarator" => node = node.named_child(0)?,
            _ => node = node.child_by_field_name("declarator")?,
        }
    }
}
