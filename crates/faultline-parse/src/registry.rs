use std::collections::HashMap;
use std::path::Path;

use faultline_core::{Language, Symbol, SymbolEdge};
use tree_sitter::{Node, Query, QueryCapture};

use crate::ParseError;
use crate::languages;
use crate::parser::node_text;

/// One compiled grammar and the record languages it parses.
pub struct LanguageConfig {
    pub id: &'static str,
    pub languages: &'static [Language],
    pub ts_language: tree_sitter::Language,
    pub symbol_query: Query,
    pub edge_query: Query,
    pub hooks: Box<dyn LanguageHooks>,
}

impl LanguageConfig {
    pub(crate) fn compile(
        id: &'static str,
        languages: &'static [Language],
        ts_language: tree_sitter::Language,
        symbol_source: &str,
        edge_source: &str,
        hooks: Box<dyn LanguageHooks>,
    ) -> Result<Self, ParseError> {
        let symbol_query =
            Query::new(&ts_language, symbol_source).map_err(|err| ParseError::Query {
                language: id,
                kind: "symbol",
                message: err.to_string(),
            })?;
        let edge_query = Query::new(&ts_language, edge_source).map_err(|err| ParseError::Query {
            language: id,
            kind: "edge",
            message: err.to_string(),
        })?;

        Ok(Self {
            id,
            languages,
            ts_language,
            symbol_query,
            edge_query,
            hooks,
        })
    }
}

/// Per-language behavior layered over the generic capture mapping.
///
/// Every method has a default; a language only overrides what its grammar
/// makes irregular.
pub trait LanguageHooks: Send + Sync {
    /// Names of the containers enclosing `node`, outermost first.
    fn scope_of(&self, _node: Node<'_>, _source: &[u8]) -> Vec<String> {
        Vec::new()
    }

    /// Whether a node captured as `symbol.function` is really a method.
    fn is_method(&self, _node: Node<'_>) -> bool {
        false
    }

    fn map_symbol(
        &self,
        _language: Language,
        _captures: &QueryCaptures<'_, '_>,
        _source: &[u8],
        _file_path: &str,
    ) -> Option<Symbol> {
        None
    }

    fn map_edge(
        &self,
        _language: Language,
        _captures: &QueryCaptures<'_, '_>,
        _source: &[u8],
        _file_path: &str,
        _symbols: &[Symbol],
    ) -> Option<Vec<SymbolEdge>> {
        None
    }
}

pub struct QueryCaptures<'q, 'tree> {
    query: &'q Query,
    captures: &'q [QueryCapture<'tree>],
}

impl<'q, 'tree> QueryCaptures<'q, 'tree> {
    pub fn new(query: &'q Query, captures: &'q [QueryCapture<'tree>]) -> Self {
        Self { query, captures }
    }

    pub fn first_capture_name_with_prefix(&self, prefix: &str) -> Option<&str> {
        self.captures.iter().find_map(|capture| {
            let name = self.capture_name(capture.index)?;
            name.starts_with(prefix).then_some(name)
        })
    }

    pub fn node(&self, name: &str) -> Option<Node<'tree>> {
        self.captures.iter().find_map(|capture| {
            let capture_name = self.capture_name(capture.index)?;
            (capture_name == name).then_some(capture.node)
        })
    }

    pub fn node_with_prefix(&self, prefix: &str) -> Option<Node<'tree>> {
        self.captures.iter().find_map(|capture| {
            let capture_name = self.capture_name(capture.index)?;
            capture_name.starts_with(prefix).then_some(capture.node)
        })
    }

    pub fn capture_text(&self, name: &str, source: &[u8]) -> Option<String> {
        let node = self.node(name)?;
        Some(node_text(node, source))
    }

    fn capture_name(&self, index: u32) -> Option<&'q str> {
        self.query.capture_names().get(index as usize).copied()
    }
}

/// Grammars keyed by the language they parse.
#[derive(Default)]
pub struct LanguageRegistry {
    configs: Vec<LanguageConfig>,
    by_language: HashMap<Language, usize>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first config registered for a language wins.
    pub fn register(&mut self, config: LanguageConfig) {
        let index = self.configs.len();
        for language in config.languages {
            self.by_language.entry(*language).or_insert(index);
        }
        self.configs.push(config);
    }

    pub fn get(&self, language: Language) -> Option<&LanguageConfig> {
        let index = *self.by_language.get(&language)?;
        self.configs.get(index)
    }

    /// Path extension wins; the language tag is the fallback for snippets
    /// whose path carries no usable extension.
    pub fn get_for(&self, language: Language, file_path: &str) -> Option<&LanguageConfig> {
        Language::for_path(Path::new(file_path))
            .and_then(|from_path| self.get(from_path))
            .or_else(|| self.get(language))
    }

    pub fn supports(&self, language: Language) -> bool {
        self.by_language.contains_key(&language)
    }
}

pub fn default_registry() -> Result<LanguageRegistry, ParseError> {
    let mut registry = LanguageRegistry::new();
    registry.register(languages::c::config()?);
    registry.register(languages::java::config()?);
    registry.register(languages::python::config()?);
    registry.register(languages::rust::config()?);
    registry.register(languages::typescript::config()?);
    registry.register(languages::typescript::tsx_js_config()?);
    Ok(registry)
}
