use faultline_core::Language;
use tree_sitter::Node;

use crate::ParseError;
use crate::parser::ancestor_names;
use crate::registry::{LanguageConfig, LanguageHooks};

pub fn config() -> Result<LanguageConfig, ParseError> {
    LanguageConfig::compile(
        "java",
        &[Language::Java],
        tree_sitter_java::LANGUAGE.into(),
        include_str!("../../queries/java_symbols.scm"),
        include_str!("../../queries/java_edges.scm"),
        Box::new(JavaHooks),
    )
}

struct JavaHooks;

impl LanguageHooks for JavaHooks {
    fn scope_of(&self, node: Node<'_>, source: &[u8]) -> Vec<String> {
        ancestor_names(
            node,
            &[
                "class_declaration",
                "interface_declaration",
                "enum_declaration",
            ],
            source,
        )
    }
}
