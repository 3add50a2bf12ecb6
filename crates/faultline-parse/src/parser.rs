use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use faultline_core::{
    EdgeKind, Language, Position, SourceRange, Symbol, SymbolEdge, SymbolKind, content_hash,
    normalize_path,
};
use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Parser, Point, QueryCursor};

use crate::ParseError;
use crate::registry::{LanguageConfig, LanguageRegistry, QueryCaptures, default_registry};

/// Definitions and unresolved references found in one snapshot of one file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractedFile {
    pub symbols: Vec<Symbol>,
    pub edges: Vec<SymbolEdge>,
}

pub struct SymbolExtractor {
    registry: Arc<LanguageRegistry>,
    parsers: HashMap<&'static str, Parser>,
}

impl SymbolExtractor {
    pub fn new() -> Result<Self, ParseError> {
        Ok(Self::with_registry(Arc::new(default_registry()?)))
    }

    /// Parsers are created lazily, one per language actually seen.
    pub fn with_registry(registry: Arc<LanguageRegistry>) -> Self {
        Self {
            registry,
            parsers: HashMap::new(),
        }
    }

    pub fn extract(
        &mut self,
        language: Language,
        file_path: &str,
        source: &str,
    ) -> Result<ExtractedFile, ParseError> {
        let file_path = normalize_path(file_path);
        let config = self
            .registry
            .get_for(language, &file_path)
            .ok_or_else(|| ParseError::UnsupportedLanguage(file_path.clone()))?;

        extract_with_config(&mut self.parsers, config, language, &file_path, source)
    }
}

fn extract_with_config(
    parsers: &mut HashMap<&'static str, Parser>,
    config: &LanguageConfig,
    language: Language,
    file_path: &str,
    source: &str,
) -> Result<ExtractedFile, ParseError> {
    let parser = match parsers.entry(config.id) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => {
            let mut parser = Parser::new();
            parser
                .set_language(&config.ts_language)
                .map_err(|_| ParseError::Grammar {
                    language: config.id,
                })?;
            entry.insert(parser)
        }
    };

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ParseError::NoTree(file_path.to_owned()))?;

    let root = tree.root_node();
    let source_bytes = source.as_bytes();

    let mut symbols = extract_symbols(language, file_path, source_bytes, root, config);
    symbols.sort_by(|a, b| {
        a.qualified_name
            .cmp(&b.qualified_name)
            .then_with(|| position_key(a.range.start).cmp(&position_key(b.range.start)))
    });

    let mut edges = extract_edges(language, file_path, source_bytes, root, config, &symbols);
    sort_and_dedupe_edges(&mut edges);

    Ok(ExtractedFile { symbols, edges })
}

fn extract_symbols(
    language: Language,
    file_path: &str,
    source: &[u8],
    root: Node<'_>,
    config: &LanguageConfig,
) -> Vec<Symbol> {
    let mut cursor = QueryCursor::new();
    let mut symbols = Vec::new();

    let mut query_matches = cursor.matches(&config.symbol_query, root, source);
    while let Some(matched) = query_matches.next() {
        let captures = QueryCaptures::new(&config.symbol_query, matched.captures);

        if let Some(symbol) = config
            .hooks
            .map_symbol(language, &captures, source, file_path)
        {
            symbols.push(symbol);
            continue;
        }

        if let Some(symbol) = default_map_symbol(language, file_path, source, config, &captures) {
            symbols.push(symbol);
        }
    }

    symbols
}

fn extract_edges(
    language: Language,
    file_path: &str,
    source: &[u8],
    root: Node<'_>,
    config: &LanguageConfig,
    symbols: &[Symbol],
) -> Vec<SymbolEdge> {
    let mut cursor = QueryCursor::new();
    let mut edges = Vec::new();

    let mut query_matches = cursor.matches(&config.edge_query, root, source);
    while let Some(matched) = query_matches.next() {
        let captures = QueryCaptures::new(&config.edge_query, matched.captures);

        if let Some(mapped) = config
            .hooks
            .map_edge(language, &captures, source, file_path, symbols)
        {
            edges.extend(mapped);
            continue;
        }

        if let Some(mapped) = default_map_edge(file_path, source, &captures, symbols) {
            edges.extend(mapped);
        }
    }

    edges
}

fn default_map_symbol(
    language: Language,
    file_path: &str,
    source: &[u8],
    config: &LanguageConfig,
    captures: &QueryCaptures<'_, '_>,
) -> Option<Symbol> {
    let capture_name = captures.first_capture_name_with_prefix("symbol.")?;
    let node = captures.node_with_prefix("symbol.")?;
    let name = sanitize_name(captures.capture_text("name", source)?);
    if name.is_empty() {
        return None;
    }

    let mut kind = symbol_kind_from_capture_name(capture_name)?;
    if kind == SymbolKind::Function && config.hooks.is_method(node) {
        kind = SymbolKind::Method;
    }

    let qualified_name = qualify(&config.hooks.scope_of(node, source), &name);
    Some(build_symbol(
        language,
        file_path,
        kind,
        &name,
        &qualified_name,
        node,
        source,
    ))
}

fn default_map_edge(
    file_path: &str,
    source: &[u8],
    captures: &QueryCaptures<'_, '_>,
    symbols: &[Symbol],
) -> Option<Vec<SymbolEdge>> {
    let capture_name = captures.first_capture_name_with_prefix("edge.")?;
    let node = captures.node_with_prefix("edge.")?;
    let edge_kind = edge_kind_from_capture_name(capture_name)?;

    let target_node = captures.node("target").unwrap_or(node);
    let target = clean_target(&node_text(target_node, source));
    if target.is_empty() {
        return None;
    }

    let source_name = enclosing_symbol_name(symbols, node)?;
    Some(vec![SymbolEdge {
        source: source_name,
        target,
        edge_kind,
        file_path: file_path.to_owned(),
    }])
}

fn symbol_kind_from_capture_name(capture_name: &str) -> Option<SymbolKind> {
    match capture_name.strip_prefix("symbol.")? {
        "function" => Some(SymbolKind::Function),
        "method" => Some(SymbolKind::Method),
        "class" => Some(SymbolKind::Class),
        "struct" => Some(SymbolKind::Struct),
        "enum" => Some(SymbolKind::Enum),
        "trait" => Some(SymbolKind::Trait),
        "interface" => Some(SymbolKind::Interface),
        "type_alias" => Some(SymbolKind::TypeAlias),
        _ => None,
    }
}

pub(crate) fn edge_kind_from_capture_name(capture_name: &str) -> Option<EdgeKind> {
    match capture_name.strip_prefix("edge.")? {
        "call" => Some(EdgeKind::Calls),
        "read" => Some(EdgeKind::Reads),
        "construct" => Some(EdgeKind::Constructs),
        "reference" => Some(EdgeKind::References),
        _ => None,
    }
}

pub(crate) fn build_symbol(
    language: Language,
    file_path: &str,
    kind: SymbolKind,
    name: &str,
    qualified_name: &str,
    node: Node<'_>,
    source: &[u8],
) -> Symbol {
    Symbol {
        language,
        file_path: file_path.to_owned(),
        kind,
        name: name.to_owned(),
        qualified_name: qualified_name.to_owned(),
        content_hash: content_hash(&node_text(node, source)),
        range: node_range(node),
    }
}

pub(crate) fn sanitize_name(value: String) -> String {
    value
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .trim_end_matches(';')
        .trim()
        .to_owned()
}

/// Reduces a callee expression to a dotted/scoped path: argument lists,
/// generic arguments and whitespace are dropped.
pub(crate) fn clean_target(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut generic_depth = 0usize;
    for ch in raw.chars() {
        match ch {
            '<' => generic_depth += 1,
            '>' if generic_depth > 0 => generic_depth -= 1,
            '(' | '[' | '{' if generic_depth == 0 => break,
            _ if generic_depth > 0 || ch.is_whitespace() => {}
            _ => cleaned.push(ch),
        }
    }
    cleaned
        .replace("::::", "::")
        .trim_start_matches(['&', '*'])
        .trim_end_matches([':', '.'])
        .to_owned()
}

/// Final path segment of a target such as `self.validate`, `s->handler` or
/// `Foo::new`.
pub fn last_segment(target: &str) -> &str {
    target
        .rsplit(['.', ':', '>'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(target)
}

pub(crate) fn has_ancestor_kind(node: Node<'_>, kind: &str) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        if parent.kind() == kind {
            return true;
        }
        current = parent.parent();
    }
    false
}

pub(crate) fn nearest_ancestor<'tree>(node: Node<'tree>, kinds: &[&str]) -> Option<Node<'tree>> {
    let mut current = node.parent();
    while let Some(parent) = current {
        if kinds.contains(&parent.kind()) {
            return Some(parent);
        }
        current = parent.parent();
    }
    None
}

pub(crate) fn named_child_text(node: Node<'_>, field_name: &str, source: &[u8]) -> Option<String> {
    let child = node.child_by_field_name(field_name)?;
    let trimmed = sanitize_name(node_text(child, source));
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Collects the `name` field of every ancestor whose kind is in `kinds`,
/// outermost first.
pub(crate) fn ancestor_names(node: Node<'_>, kinds: &[&str], source: &[u8]) -> Vec<String> {
    let mut context = Vec::new();
    let mut current = node.parent();
    while let Some(cursor) = current {
        if kinds.contains(&cursor.kind())
            && let Some(name) = named_child_text(cursor, "name", source)
        {
            context.push(name);
        }
        current = cursor.parent();
    }
    context.reverse();
    context
}

pub(crate) fn node_text(node: Node<'_>, source: &[u8]) -> String {
    byte_range_text(source, node.start_byte(), node.end_byte())
}

pub(crate) fn node_range(node: Node<'_>) -> SourceRange {
    SourceRange {
        start: point_to_position(node.start_position()),
        end: point_to_position(node.end_position()),
    }
}

/// Qualified name of the innermost definition whose range covers `node`.
pub(crate) fn enclosing_symbol_name(symbols: &[Symbol], node: Node<'_>) -> Option<String> {
    let range = node_range(node);
    symbols
        .iter()
        .filter(|symbol| symbol.range.contains(&range))
        .min_by(|left, right| {
            left.range
                .span()
                .cmp(&right.range.span())
                .then_with(|| left.qualified_name.cmp(&right.qualified_name))
        })
        .map(|symbol| symbol.qualified_name.clone())
}

pub(crate) fn sort_and_dedupe_edges(edges: &mut Vec<SymbolEdge>) {
    edges.sort();
    edges.dedup();
}

pub(crate) fn qualify(context: &[String], name: &str) -> String {
    if context.is_empty() {
        name.to_owned()
    } else {
        format!("{}::{}", context.join("::"), name)
    }
}

fn position_key(position: Position) -> (usize, usize) {
    (position.line, position.column)
}

fn byte_range_text(source: &[u8], start: usize, end: usize) -> String {
    if start >= end || end > source.len() {
        return String::new();
    }
    String::from_utf8_lossy(&source[start..end]).into_owned()
}

fn point_to_position(point: Point) -> Position {
    Position {
        line: point.row + 1,
        column: point.column + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(language: Language, path: &str, source: &str) -> ExtractedFile {
        let mut extractor = SymbolExtractor::new().expect("extractor");
        extractor
            .extract(language, path, source)
            .expect("extract with edges")
    }

    fn qualified_names(file: &ExtractedFile) -> Vec<&str> {
        file.symbols
            .iter()
            .map(|symbol| symbol.qualified_name.as_str())
            .collect()
    }

    fn has_edge(file: &ExtractedFile, source: &str, target: &str, kind: EdgeKind) -> bool {
        file.edges
            .iter()
            .any(|edge| edge.source == source && edge.target == target && edge.edge_kind == kind)
    }

    #[test]
    fn extracts_rust_symbols_and_qualified_methods() {
        let source = r#"
struct Widget;

type WidgetId = u64;

impl Widget {
    fn run(&self) -> bool {
        helper() > 0
    }
}

fn helper() -> i32 {
    let w = Widget {};
    1
}
"#;

        let file = extract(Language::Rust, "src/lib.rs", source);
        let names = qualified_names(&file);
        assert!(names.contains(&"Widget"));
        assert!(names.contains(&"WidgetId"));
        assert!(names.contains(&"Widget::run"));
        assert!(names.contains(&"helper"));

        let run = file
            .symbols
            .iter()
            .find(|symbol| symbol.qualified_name == "Widget::run")
            .expect("run symbol");
        assert_eq!(run.kind, SymbolKind::Method);

        assert!(has_edge(&file, "Widget::run", "helper", EdgeKind::Calls));
        assert!(has_edge(&file, "helper", "Widget", EdgeKind::Constructs));
    }

    #[test]
    fn extracts_c_functions_through_pointer_declarators() {
        let source = r#"
struct ssl3_record_st {
    unsigned int length;
    unsigned char *data;
};

typedef struct ssl3_record_st SSL3_RECORD;

static unsigned char *copy_payload(SSL3_RECORD *rec) {
    return memcpy(rec->data, rec->data, rec->length);
}

int tls1_process_heartbeat(SSL3_RECORD *rec) {
    unsigned char *payload = copy_payload(rec);
    return payload != 0;
}
"#;

        let file = extract(Language::C, "ssl/t1_lib.c", source);
        let names = qualified_names(&file);
        assert!(names.contains(&"copy_payload"));
        assert!(names.contains(&"tls1_process_heartbeat"));
        assert!(names.contains(&"ssl3_record_st"));
        assert!(names.contains(&"SSL3_RECORD"));

        assert!(has_edge(
            &file,
            "tls1_process_heartbeat",
            "copy_payload",
            EdgeKind::Calls
        ));
        assert!(has_edge(&file, "copy_payload", "memcpy", EdgeKind::Calls));
        assert!(has_edge(
            &file,
            "copy_payload",
            "SSL3_RECORD",
            EdgeKind::References
        ));
    }

    #[test]
    fn extracts_java_methods_with_class_scope() {
        let source = r#"
public class JndiLookup {
    public JndiLookup() {}

    public String lookup(String key) {
        JndiManager manager = new JndiManager();
        return manager.lookup(convertKey(key));
    }

    private String convertKey(String key) {
        return key;
    }
}
"#;

        let file = extract(Language::Java, "core/JndiLookup.java", source);
        let names = qualified_names(&file);
        assert!(names.contains(&"JndiLookup"));
        assert!(names.contains(&"JndiLookup::JndiLookup"));
        assert!(names.contains(&"JndiLookup::lookup"));
        assert!(names.contains(&"JndiLookup::convertKey"));

        assert!(has_edge(
            &file,
            "JndiLookup::lookup",
            "convertKey",
            EdgeKind::Calls
        ));
        assert!(has_edge(
            &file,
            "JndiLookup::lookup",
            "JndiManager",
            EdgeKind::Constructs
        ));
    }

    #[test]
    fn python_self_calls_are_qualified_with_the_enclosing_class() {
        let source = r#"
class Worker:
    def run(self, payload):
        self.validate(payload)
        return helper(payload)

    def validate(self, payload):
        return len(payload) > 0

def helper(payload):
    def nested():
        return payload
    return nested()
"#;

        let file = extract(Language::Python, "pkg/worker.py", source);
        let names = qualified_names(&file);
        assert!(names.contains(&"Worker"));
        assert!(names.contains(&"Worker::run"));
        assert!(names.contains(&"helper::nested"));

        let kinds = file
            .symbols
            .iter()
            .map(|symbol| (symbol.qualified_name.as_str(), symbol.kind))
            .collect::<HashMap<_, _>>();
        assert_eq!(kinds.get("Worker::validate"), Some(&SymbolKind::Method));
        assert_eq!(kinds.get("helper::nested"), Some(&SymbolKind::Function));

        assert!(has_edge(
            &file,
            "Worker::run",
            "Worker::validate",
            EdgeKind::Calls
        ));
        assert!(has_edge(&file, "Worker::run", "helper", EdgeKind::Calls));
        assert!(has_edge(&file, "helper", "nested", EdgeKind::Calls));
    }

    #[test]
    fn extracts_typescript_symbols_and_member_calls() {
        let source = r#"
interface Request {
  body: string;
}

class Server {
  handle(req: Request): void {
    this.respond(req);
  }

  respond(req: Request): void {}
}

const start = (port: number) => new Server();
"#;

        let file = extract(Language::TypeScript, "src/server.ts", source);
        let names = qualified_names(&file);
        assert!(names.contains(&"Request"));
        assert!(names.contains(&"Server"));
        assert!(names.contains(&"Server::handle"));
        assert!(names.contains(&"start"));

        assert!(has_edge(
            &file,
            "Server::handle",
            "this.respond",
            EdgeKind::Calls
        ));
        assert!(has_edge(
            &file,
            "Server::handle",
            "Request",
            EdgeKind::References
        ));
        assert!(has_edge(&file, "start", "Server", EdgeKind::Constructs));
    }

    #[test]
    fn javascript_files_parse_with_the_tsx_grammar() {
        let mut extractor = SymbolExtractor::new().expect("extractor");
        let file = extractor
            .extract(Language::JavaScript, "web/app.js", "function main() { run(); }")
            .expect("javascript via tsx grammar");
        assert_eq!(qualified_names(&file), vec!["main"]);
    }

    #[test]
    fn clean_target_strips_arguments_and_generics() {
        assert_eq!(clean_target("Vec::<u8>::with_capacity"), "Vec::with_capacity");
        assert_eq!(clean_target("self.validate"), "self.validate");
        assert_eq!(clean_target("(*handler)"), "");
        assert_eq!(clean_target("items[0].run"), "items");
        assert_eq!(last_segment("s->handler"), "handler");
        assert_eq!(last_segment("Foo::new"), "new");
        assert_eq!(last_segment("validate"), "validate");
    }
}
