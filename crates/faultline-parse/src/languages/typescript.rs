use faultline_core::Language;
use tree_sitter::Node;

use crate::ParseError;
use crate::parser::ancestor_names;
use crate::registry::{LanguageConfig, LanguageHooks};

const SYMBOL_QUERY: &str = include_str!("../../queries/typescript_symbols.scm");
const EDGE_QUERY: &str = include_str!("../../queries/typescript_edges.scm");

pub fn config() -> Result<LanguageConfig, ParseError> {
    LanguageConfig::compile(
        "typescript",
        &[Language::TypeScript],
        tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        SYMBOL_QUERY,
        EDGE_QUERY,
        Box::new(TypeScriptHooks),
    )
}

/// TSX grammar also covers plain JavaScript and JSX.
pub fn tsx_js_config() -> Result<LanguageConfig, ParseError> {
    LanguageConfig::compile(
        "tsx_js",
        &[Language::Tsx, Language::JavaScript, Language::Jsx],
        tree_sitter_typescript::LANGUAGE_TSX.into(),
        SYMBOL_QUERY,
        EDGE_QUERY,
        Box::new(TypeScriptHooks),
    )
}

struct TypeScriptHooks;

impl LanguageHooks for TypeScriptHooks {
    fn scope_of(&self, node: Node<'_>, source: &[u8]) -> Vec<String> {
        ancestor_names(node, &["class_declaration", "interface_declaration"], source)
    }
}
