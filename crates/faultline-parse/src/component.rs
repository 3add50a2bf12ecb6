use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use faultline_core::{CommitContent, Component, EdgeKind, Language, diff_symbols};
use faultline_graph_algo::ReferenceGraph;

use crate::ParseError;
use crate::parser::{ExtractedFile, SymbolExtractor, last_segment};
use crate::registry::{LanguageRegistry, default_registry};

/// One version of one source file.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub file_path: &'a str,
    pub language: Language,
    pub source: &'a str,
}

impl<'a> Snapshot<'a> {
    pub fn new(file_path: &'a str, language: Language, source: &'a str) -> Self {
        Self {
            file_path,
            language,
            source,
        }
    }
}

/// Builds bounded dependency neighborhoods around changed symbols.
///
/// Cheap to clone; every call parses with its own `SymbolExtractor`, so one
/// instance can be shared across blocking tasks.
#[derive(Clone)]
pub struct ComponentExtractor {
    registry: Arc<LanguageRegistry>,
}

impl ComponentExtractor {
    pub fn new() -> Result<Self, ParseError> {
        Ok(Self::with_registry(Arc::new(default_registry()?)))
    }

    pub fn with_registry(registry: Arc<LanguageRegistry>) -> Self {
        Self { registry }
    }

    pub fn supports(&self, language: Language) -> bool {
        self.registry.supports(language)
    }

    pub fn reference_graph(&self, snapshots: &[Snapshot<'_>]) -> Result<ReferenceGraph, ParseError> {
        let mut extractor = SymbolExtractor::with_registry(Arc::clone(&self.registry));
        let files = snapshots
            .iter()
            .map(|snapshot| extractor.extract(snapshot.language, snapshot.file_path, snapshot.source))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(build_reference_graph(&files))
    }

    /// Symbols within `k` hops of `roots` in the snapshot's reference graph.
    /// Roots are always members; no roots means an empty component.
    pub fn extract_component(
        &self,
        snapshot: Snapshot<'_>,
        roots: &[String],
        k: usize,
    ) -> Result<Component, ParseError> {
        if roots.is_empty() {
            return Ok(Component::empty());
        }
        let graph = self.reference_graph(&[snapshot])?;
        Ok(neighborhood(&graph, roots, k))
    }

    /// Component of a single-file change: rooted at every symbol added,
    /// removed or modified between `before` and `after`, traversed over the
    /// union of both versions' graphs.
    pub fn change_component(
        &self,
        before: &str,
        after: &str,
        language: Language,
        file_path: &str,
        k: usize,
    ) -> Result<Component, ParseError> {
        let mut extractor = SymbolExtractor::with_registry(Arc::clone(&self.registry));
        let previous = extractor.extract(language, file_path, before)?;
        let current = extractor.extract(language, file_path, after)?;

        let roots = diff_symbols(file_path, language, &previous.symbols, &current.symbols)
            .touched_names();
        if roots.is_empty() {
            return Ok(Component::empty());
        }

        let graph = build_reference_graph(&[previous, current]);
        Ok(neighborhood(&graph, &roots, k))
    }

    /// Union of the per-file change components of a commit. Files in
    /// languages without a registered grammar are ignored.
    pub fn commit_component(
        &self,
        content: &CommitContent,
        k: usize,
    ) -> Result<Component, ParseError> {
        let mut component = Component::empty();
        for file in &content.files {
            let Some(language) = file
                .language
                .or_else(|| Language::for_path(Path::new(&file.path)))
                .filter(|language| self.supports(*language))
            else {
                continue;
            };
            let file_component =
                self.change_component(&file.before, &file.after, language, &file.path, k)?;
            component = component.union(&file_component);
        }
        Ok(component)
    }
}

fn neighborhood(graph: &ReferenceGraph, roots: &[String], k: usize) -> Component {
    graph
        .k_hop_neighborhood(roots.iter().map(String::as_str), k)
        .into_iter()
        .collect()
}

/// Resolves raw reference targets against the definitions of every file and
/// folds the result into one graph.
///
/// A target resolves when it equals a qualified name, or when its last path
/// segment names exactly one definition. Unresolved calls and constructions
/// become external nodes named by that segment; unresolved reads and type
/// references are dropped.
pub fn build_reference_graph(files: &[ExtractedFile]) -> ReferenceGraph {
    let index = DefinitionIndex::new(files);
    let mut graph = ReferenceGraph::new();

    for file in files {
        for symbol in &file.symbols {
            graph.add_symbol(&symbol.qualified_name);
        }
    }

    for file in files {
        for edge in &file.edges {
            let target = match index.resolve(&edge.target) {
                Some(resolved) => resolved.to_owned(),
                None if matches!(edge.edge_kind, EdgeKind::Calls | EdgeKind::Constructs) => {
                    last_segment(&edge.target).to_owned()
                }
                None => continue,
            };
            if target.is_empty() || target == edge.source {
                continue;
            }
            graph.add_reference(&edge.source, &target, edge.edge_kind);
        }
    }

    graph
}

struct DefinitionIndex<'a> {
    qualified: HashSet<&'a str>,
    by_name: HashMap<&'a str, BTreeSet<&'a str>>,
}

impl<'a> DefinitionIndex<'a> {
    fn new(files: &'a [ExtractedFile]) -> Self {
        let mut qualified = HashSet::new();
        let mut by_name = HashMap::<&str, BTreeSet<&str>>::new();
        for symbol in files.iter().flat_map(|file| file.symbols.iter()) {
            qualified.insert(symbol.qualified_name.as_str());
            by_name
                .entry(symbol.name.as_str())
                .or_default()
                .insert(symbol.qualified_name.as_str());
        }
        Self { qualified, by_name }
    }

    fn resolve(&self, target: &str) -> Option<&'a str> {
        if let Some(found) = self.qualified.get(target) {
            return Some(*found);
        }
        let candidates = self.by_name.get(last_segment(target))?;
        if candidates.len() == 1 {
            candidates.iter().next().copied()
        } else {
            None
        }
    }
}
