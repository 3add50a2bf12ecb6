mod commit;
mod component;
mod record;
mod sample;

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use commit::{CommitContent, CommitRef, FileChange};
pub use component::{Component, overlap};
pub use record::{CatastropheLabels, CatastropheRecord, RecordError, load_records, parse_records};
pub use sample::{
    BucketFill, BucketReport, BucketStatus, CatastropheReport, CatastropheSamples,
    CollectionReport, CollectionState, Dataset, FailureNote, PartialReason, Sample, SampleBucket,
    SampleLabel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    C,
    Java,
    Python,
    Rust,
    TypeScript,
    Tsx,
    JavaScript,
    Jsx,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::C => "c",
            Self::Java => "java",
            Self::Python => "python",
            Self::Rust => "rust",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::JavaScript => "javascript",
            Self::Jsx => "jsx",
        }
    }

    /// Resolves the free-form language tag carried by catastrophe records.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "c" | "h" => Some(Self::C),
            "java" => Some(Self::Java),
            "python" | "py" => Some(Self::Python),
            "rust" | "rs" => Some(Self::Rust),
            "typescript" | "ts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "javascript" | "js" | "node" => Some(Self::JavaScript),
            "jsx" => Some(Self::Jsx),
            _ => None,
        }
    }

    pub fn for_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match ext.as_str() {
            "c" | "h" => Some(Self::C),
            "java" => Some(Self::Java),
            "py" | "pyi" => Some(Self::Python),
            "rs" => Some(Self::Rust),
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "js" | "mjs" | "cjs" => Some(Self::JavaScript),
            "jsx" => Some(Self::Jsx),
            _ => None,
        }
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_tag(value).ok_or_else(|| {
            format!(
                "invalid language '{}', expected one of: c, java, python, rust, typescript, tsx, javascript, jsx",
                value.trim()
            )
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Enum,
    Trait,
    Interface,
    TypeAlias,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Trait => "trait",
            Self::Interface => "interface",
            Self::TypeAlias => "type_alias",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Calls,
    Reads,
    Constructs,
    References,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calls => "calls",
            Self::Reads => "reads",
            Self::Constructs => "constructs",
            Self::References => "references",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: Position,
    pub end: Position,
}

impl SourceRange {
    pub fn contains(&self, other: &SourceRange) -> bool {
        (self.start.line, self.start.column) <= (other.start.line, other.start.column)
            && (other.end.line, other.end.column) <= (self.end.line, self.end.column)
    }

    pub fn span(&self) -> (usize, usize) {
        (
            self.end.line.saturating_sub(self.start.line),
            self.end.column.saturating_sub(self.start.column),
        )
    }
}

/// A named definition found in one snapshot of one file.
///
/// `qualified_name` is the identifier used as a graph node; two snapshots of
/// the same file produce the same qualified name for the same definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub language: Language,
    pub file_path: String,
    pub kind: SymbolKind,
    pub name: String,
    pub qualified_name: String,
    pub content_hash: String,
    pub range: SourceRange,
}

/// A reference from `source` (qualified name of the enclosing definition) to
/// an unresolved target as written in the source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
pub struct SymbolEdge {
    pub source: String,
    pub target: String,
    pub edge_kind: EdgeKind,
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolChangeEvent {
    pub file_path: String,
    pub language: Language,
    pub added: Vec<Symbol>,
    pub removed: Vec<Symbol>,
    pub updated: Vec<Symbol>,
}

impl SymbolChangeEvent {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }

    /// Qualified names of every symbol the change touched, sorted and unique.
    pub fn touched_names(&self) -> Vec<String> {
        let mut names = self
            .added
            .iter()
            .chain(self.removed.iter())
            .chain(self.updated.iter())
            .map(|symbol| symbol.qualified_name.clone())
            .collect::<Vec<_>>();
        names.sort();
        names.dedup();
        names
    }
}

pub fn normalize_for_fingerprint(text: &str) -> String {
    text.chars().filter(|ch| !ch.is_whitespace()).collect()
}

/// Whitespace-insensitive hash of a definition body.
pub fn content_hash(content: &str) -> String {
    blake3_hex(normalize_for_fingerprint(content).as_bytes())
}

pub fn stable_hash(material: &str) -> u64 {
    let digest = blake3::hash(material.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .trim_start_matches("./")
        .trim()
        .to_owned()
}

pub fn diff_symbols(
    file_path: &str,
    language: Language,
    previous: &[Symbol],
    current: &[Symbol],
) -> SymbolChangeEvent {
    let previous_by_name: HashMap<&str, &Symbol> = previous
        .iter()
        .map(|s| (s.qualified_name.as_str(), s))
        .collect();
    let current_by_name: HashMap<&str, &Symbol> = current
        .iter()
        .map(|s| (s.qualified_name.as_str(), s))
        .collect();

    let mut added: Vec<Symbol> = current_by_name
        .iter()
        .filter(|(name, _)| !previous_by_name.contains_key(*name))
        .map(|(_, symbol)| (*symbol).clone())
        .collect();

    let mut removed: Vec<Symbol> = previous_by_name
        .iter()
        .filter(|(name, _)| !current_by_name.contains_key(*name))
        .map(|(_, symbol)| (*symbol).clone())
        .collect();

    let mut updated: Vec<Symbol> = current_by_name
        .iter()
        .filter_map(|(name, symbol)| {
            previous_by_name
                .get(name)
                .filter(|old| old.content_hash != symbol.content_hash)
                .map(|_| (*symbol).clone())
        })
        .collect();

    added.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
    removed.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
    updated.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));

    SymbolChangeEvent {
        file_path: normalize_path(file_path),
        language,
        added,
        removed,
        updated,
    }
}

fn blake3_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_symbol(name: &str, content_hash: &str) -> Symbol {
        Symbol {
            language: Language::C,
            file_path: "ssl/t1_lib.c".to_owned(),
            kind: SymbolKind::Function,
            name: name.to_owned(),
            qualified_name: name.to_owned(),
            content_hash: content_hash.to_owned(),
            range: SourceRange {
                start: Position { line: 1, column: 1 },
                end: Position {
                    line: 1,
                    column: 10,
                },
            },
        }
    }

    #[test]
    fn content_hash_ignores_whitespace_only_edits() {
        assert_eq!(
            content_hash("int add(int x, int y) { return x + y; }"),
            content_hash("int add(int x,int y){\n    return x + y;\n}")
        );
        assert_ne!(
            content_hash("int add(int x, int y) { return x + y; }"),
            content_hash("int add(int x, int y) { return x - y; }")
        );
    }

    #[test]
    fn diff_symbols_tracks_added_removed_and_updated() {
        let previous = vec![
            sample_symbol("tls1_process_heartbeat", "content-a"),
            sample_symbol("dtls1_write_bytes", "content-b"),
        ];
        let current = vec![
            sample_symbol("tls1_process_heartbeat", "content-c"),
            sample_symbol("tls1_heartbeat_check", "content-d"),
        ];

        let diff = diff_symbols("ssl/t1_lib.c", Language::C, &previous, &current);
        assert_eq!(
            diff.added
                .iter()
                .map(|s| s.qualified_name.as_str())
                .collect::<Vec<_>>(),
            vec!["tls1_heartbeat_check"]
        );
        assert_eq!(
            diff.removed
                .iter()
                .map(|s| s.qualified_name.as_str())
                .collect::<Vec<_>>(),
            vec!["dtls1_write_bytes"]
        );
        assert_eq!(
            diff.updated
                .iter()
                .map(|s| s.qualified_name.as_str())
                .collect::<Vec<_>>(),
            vec!["tls1_process_heartbeat"]
        );
        assert_eq!(
            diff.touched_names(),
            vec![
                "dtls1_write_bytes".to_owned(),
                "tls1_heartbeat_check".to_owned(),
                "tls1_process_heartbeat".to_owned(),
            ]
        );
    }

    #[test]
    fn language_tags_and_extensions_resolve() {
        assert_eq!(Language::from_tag("C"), Some(Language::C));
        assert_eq!(Language::from_tag(" Python "), Some(Language::Python));
        assert_eq!(Language::from_tag("cobol"), None);
        assert_eq!(
            Language::for_path(Path::new("crypto/bio/b_print.h")),
            Some(Language::C)
        );
        assert_eq!(
            Language::for_path(Path::new("core/src/main/java/Lookup.java")),
            Some(Language::Java)
        );
        assert_eq!(Language::for_path(Path::new("README.md")), None);
        assert!("fortran".parse::<Language>().is_err());
    }

    #[test]
    fn normalize_path_strips_leading_dot_segments() {
        assert_eq!(normalize_path("./src\\lib.rs"), "src/lib.rs");
    }
}
