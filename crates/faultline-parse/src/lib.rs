mod component;
mod languages;
mod parser;
mod registry;

use thiserror::Error;

pub use component::{ComponentExtractor, Snapshot, build_reference_graph};
pub use parser::{ExtractedFile, SymbolExtractor, last_segment};
pub use registry::{LanguageConfig, LanguageHooks, LanguageRegistry, QueryCaptures, default_registry};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no grammar registered for {0}")]
    UnsupportedLanguage(String),
    #[error("failed to load {language} tree-sitter grammar")]
    Grammar { language: &'static str },
    #[error("invalid {language} {kind} query: {message}")]
    Query {
        language: &'static str,
        kind: &'static str,
        message: String,
    },
    #[error("tree-sitter produced no syntax tree for {0}")]
    NoTree(String),
}
