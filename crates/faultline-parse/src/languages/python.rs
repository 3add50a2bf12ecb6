use faultline_core::{EdgeKind, Language, Symbol, SymbolEdge};
use tree_sitter::Node;

use crate::ParseError;
use crate::parser::{
    ancestor_names, clean_target, enclosing_symbol_name, named_child_text, nearest_ancestor,
};
use crate::registry::{LanguageConfig, LanguageHooks, QueryCaptures};

const SCOPE_KINDS: &[&str] = &["class_definition", "function_definition"];

pub fn config() -> Result<LanguageConfig, ParseError> {
    LanguageConfig::compile(
        "python",
        &[Language::Python],
        tree_sitter_python::LANGUAGE.into(),
        include_str!("../../queries/python_symbols.scm"),
        include_str!("../../queries/python_edges.scm"),
        Box::new(PythonHooks),
    )
}

struct PythonHooks;

impl LanguageHooks for PythonHooks {
    fn scope_of(&self, node: Node<'_>, source: &[u8]) -> Vec<String> {
        ancestor_names(node, SCOPE_KINDS, source)
    }

    /// A `def` directly inside a class body; nested functions stay functions.
    fn is_method(&self, node: Node<'_>) -> bool {
        nearest_ancestor(node, SCOPE_KINDS)
            .is_some_and(|scope| scope.kind() == "class_definition")
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
        let method = target
            .strip_prefix("self.")
            .or_else(|| target.strip_prefix("cls."))?;
        let class_node = nearest_ancestor(node, &["class_definition"])?;
        let class_name = named_child_text(class_node, "name", source)?;

        let mut scope = ancestor_names(class_node, SCOPE_KINDS, source);
        scope.push(class_name);
        Some(vec![SymbolEdge {
            source: enclosing_symbol_name(symbols, node)?,
            target: format!("{}::{method}", scope.join("::")),
            edge_kind: EdgeKind::Calls,
            file_path: file_path.to_owned(),
        }])
    }
}
