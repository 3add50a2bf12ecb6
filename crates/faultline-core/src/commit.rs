use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::Language;

/// One commit of a fetched window.
///
/// `distance` is the generational distance from the pivot along any parent:
/// negative for ancestors, zero for the pivot itself, positive for
/// descendants. Merge structure is deliberately ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub id: String,
    pub timestamp: i64,
    pub parents: Vec<String>,
    pub changed_files: BTreeSet<String>,
    pub distance: i64,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub summary: String,
}

impl CommitRef {
    pub fn is_ancestor(&self) -> bool {
        self.distance < 0
    }

    pub fn is_descendant(&self) -> bool {
        self.distance > 0
    }

    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }

    pub fn touches_any<'a>(&self, paths: impl IntoIterator<Item = &'a String>) -> bool {
        paths
            .into_iter()
            .any(|path| self.changed_files.contains(path.as_str()))
    }

    pub fn short_id(&self) -> &str {
        let end = self.id.len().min(10);
        &self.id[..end]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub language: Option<Language>,
    pub before: String,
    pub after: String,
}

/// Before/after text of the source files one commit touched, loaded on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CommitContent {
    pub commit_id: String,
    pub files: Vec<FileChange>,
}

impl CommitContent {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn primary_file(&self) -> Option<&FileChange> {
        self.files.first()
    }
}
