use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Language, normalize_path};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CatastropheLabels {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub root_cause: String,
    #[serde(default)]
    pub deaths: u64,
    #[serde(default)]
    pub financial_loss_usd: u64,
}

/// A documented harmful change with a known fix commit. Read-only input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRecord")]
pub struct CatastropheRecord {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cve: Option<String>,
    pub repo_url: String,
    pub fix_commit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breaking_commit: Option<String>,
    pub affected_files: Vec<String>,
    pub before_code: String,
    pub after_code: String,
    pub language: String,
    pub labels: CatastropheLabels,
}

/// Every shape a record arrives in: the canonical form above, dataset
/// examples (`commit_fixing`, `file_path`, labels at top level) and
/// verified catalog entries (`fixing_commits` / `breaking_commits` lists).
#[derive(Deserialize)]
struct RawRecord {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    cve: Option<String>,
    #[serde(default, alias = "repository", alias = "repo")]
    repo_url: Option<String>,
    #[serde(default, alias = "commit_fixing")]
    fix_commit: Option<String>,
    #[serde(default)]
    fixing_commits: Vec<String>,
    #[serde(default, alias = "commit_introducing")]
    breaking_commit: Option<String>,
    #[serde(default)]
    breaking_commits: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_paths")]
    affected_files: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_paths")]
    file_path: Vec<String>,
    #[serde(default)]
    before_code: Option<String>,
    #[serde(default)]
    after_code: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    labels: Option<CatastropheLabels>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    root_cause: Option<String>,
    #[serde(default)]
    deaths: Option<u64>,
    #[serde(default)]
    financial_loss_usd: Option<u64>,
}

impl From<RawRecord> for CatastropheRecord {
    fn from(raw: RawRecord) -> Self {
        let mut labels = raw.labels.unwrap_or_default();
        if labels.category.is_empty() {
            labels.category = raw.category.unwrap_or_default();
        }
        if labels.root_cause.is_empty() {
            labels.root_cause = raw.root_cause.unwrap_or_default();
        }
        if labels.deaths == 0 {
            labels.deaths = raw.deaths.unwrap_or_default();
        }
        if labels.financial_loss_usd == 0 {
            labels.financial_loss_usd = raw.financial_loss_usd.unwrap_or_default();
        }

        let mut affected_files = raw.affected_files;
        for path in raw.file_path {
            if !affected_files.contains(&path) {
                affected_files.push(path);
            }
        }

        let project = raw.project.filter(|project| !project.trim().is_empty());
        let name = raw
            .name
            .filter(|name| !name.trim().is_empty())
            .or_else(|| project.clone())
            .unwrap_or_default();

        Self {
            id: raw.id,
            name,
            project,
            cve: raw.cve.filter(|cve| !cve.trim().is_empty()),
            repo_url: raw.repo_url.unwrap_or_default(),
            fix_commit: non_blank(raw.fix_commit)
                .or_else(|| first_commit(raw.fixing_commits))
                .unwrap_or_default(),
            breaking_commit: non_blank(raw.breaking_commit)
                .or_else(|| first_commit(raw.breaking_commits)),
            affected_files,
            before_code: raw.before_code.unwrap_or_default(),
            after_code: raw.after_code.unwrap_or_default(),
            language: raw.language.unwrap_or_default(),
            labels,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// First list entry that looks like a revision; catalogs carry prose
/// placeholders ("tried several") where no commit is known.
fn first_commit(commits: Vec<String>) -> Option<String> {
    commits
        .into_iter()
        .map(|commit| commit.trim().to_owned())
        .find(|commit| !commit.is_empty() && !commit.contains(char::is_whitespace))
}

impl CatastropheRecord {
    pub fn language(&self) -> Option<Language> {
        Language::from_tag(&self.language).or_else(|| {
            self.affected_files
                .iter()
                .find_map(|path| Language::for_path(Path::new(path)))
        })
    }

    pub fn primary_file(&self) -> Option<&str> {
        self.affected_files.first().map(String::as_str)
    }
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catastrophe JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("catastrophe record {index} is invalid: {reason}")]
    Invalid { index: usize, reason: String },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordFile {
    List(Vec<CatastropheRecord>),
    Wrapped { examples: Vec<CatastropheRecord> },
    Catalog { catastrophes: Vec<CatastropheRecord> },
}

pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<CatastropheRecord>, RecordError> {
    let raw = fs::read_to_string(path)?;
    parse_records(&raw)
}

/// Parses a bare JSON array of records, `{"examples": [...]}` or
/// `{"catastrophes": [...]}`.
pub fn parse_records(raw: &str) -> Result<Vec<CatastropheRecord>, RecordError> {
    let records = match serde_json::from_str::<RecordFile>(raw)? {
        RecordFile::List(records) => records,
        RecordFile::Wrapped { examples } => examples,
        RecordFile::Catalog { catastrophes } => catastrophes,
    };

    for (index, record) in records.iter().enumerate() {
        if record.id.trim().is_empty() {
            return Err(RecordError::Invalid {
                index,
                reason: "missing id".to_owned(),
            });
        }
        if record.repo_url.trim().is_empty() {
            return Err(RecordError::Invalid {
                index,
                reason: format!("{} has no repository URL", record.id),
            });
        }
        if record.fix_commit.trim().is_empty() {
            return Err(RecordError::Invalid {
                index,
                reason: format!("{} has no fix commit", record.id),
            });
        }
    }

    Ok(records)
}

fn deserialize_paths<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let paths = match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(path)) => vec![path],
        Some(OneOrMany::Many(paths)) => paths,
        None => Vec::new(),
    };
    Ok(paths
        .into_iter()
        .map(|path| normalize_path(&path))
        .filter(|path| !path.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wrapped_records_with_original_field_names() {
        let raw = r#"{
  "examples": [
    {
      "id": "heartbleed",
      "project": "OpenSSL",
      "cve": "CVE-2014-0160",
      "repo_url": "https://github.com/openssl/openssl.git",
      "commit_fixing": "96db9023b881d7cd9f379b0c154650d6c108e9a3",
      "affected_files": ["./ssl/d1_both.c", "ssl/t1_lib.c"],
      "before_code": "int tls1_process_heartbeat(SSL *s) { return 0; }",
      "after_code": "int tls1_process_heartbeat(SSL *s) { return 1; }",
      "language": "C",
      "labels": { "category": "security", "root_cause": "missing bounds check" }
    }
  ]
}"#;

        let records = parse_records(raw).expect("parse records");
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.name, "OpenSSL");
        assert_eq!(record.fix_commit, "96db9023b881d7cd9f379b0c154650d6c108e9a3");
        assert_eq!(record.affected_files, vec!["ssl/d1_both.c", "ssl/t1_lib.c"]);
        assert_eq!(record.language(), Some(Language::C));
        assert_eq!(record.labels.root_cause, "missing bounds check");
        assert_eq!(record.labels.deaths, 0);
    }

    #[test]
    fn parses_bare_array_and_single_file_path() {
        let raw = r#"[{
  "id": "log4shell",
  "repo_url": "https://github.com/apache/logging-log4j2.git",
  "fix_commit": "c77b3cb39312b83b053d23a2158b99ac7de44dd3",
  "affected_files": "log4j-core/src/main/java/JndiLookup.java",
  "language": "unknown"
}]"#;

        let records = parse_records(raw).expect("parse records");
        assert_eq!(
            records[0].affected_files,
            vec!["log4j-core/src/main/java/JndiLookup.java"]
        );
        assert_eq!(records[0].language(), Some(Language::Java));
    }

    #[test]
    fn load_records_reads_from_disk_and_reports_missing_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("catastrophes.json");
        fs::write(
            &path,
            r#"[{"id": "x", "repo_url": "https://example.com/x.git", "fix_commit": "abc"}]"#,
        )
        .expect("write records");

        let records = load_records(&path).expect("load records");
        assert_eq!(records[0].id, "x");

        let err = load_records(temp.path().join("missing.json")).expect_err("missing file");
        assert!(matches!(err, RecordError::Io(_)));
    }

    #[test]
    fn parses_dataset_examples_with_project_and_top_level_labels() {
        let raw = r#"{
  "num_examples": 1,
  "categories": {"security": 1},
  "examples": [
    {
      "id": "heartbleed",
      "name": "Heartbleed",
      "project": "OpenSSL",
      "cve": "CVE-2014-0160",
      "repo_url": "https://github.com/openssl/openssl.git",
      "before_code": "",
      "after_code": "",
      "language": "C",
      "file_path": "ssl/d1_both.c",
      "commit_introducing": null,
      "commit_fixing": "96db9023b881d7cd9f379b0c154650d6c108e9a3",
      "category": "security",
      "root_cause": "missing bounds check",
      "complexity_score": 0.4,
      "deaths": 0,
      "financial_loss_usd": 500000000,
      "affected_systems": 1,
      "year": 2014,
      "description": "heartbeat over-read"
    }
  ]
}"#;

        let records = parse_records(raw).expect("parse records");
        let record = &records[0];
        assert_eq!(record.name, "Heartbleed");
        assert_eq!(record.project.as_deref(), Some("OpenSSL"));
        assert_eq!(record.breaking_commit, None);
        assert_eq!(record.affected_files, vec!["ssl/d1_both.c"]);
        assert_eq!(record.labels.category, "security");
        assert_eq!(record.labels.root_cause, "missing bounds check");
        assert_eq!(record.labels.financial_loss_usd, 500_000_000);
    }

    #[test]
    fn parses_catalog_entries_with_commit_lists() {
        let raw = r#"{
  "catastrophes": [
    {
      "id": "therac25",
      "name": "Therac-25",
      "cve": null,
      "repo_url": "https://github.com/example/therac.git",
      "breaking_commits": ["tried several", "b4d"],
      "fixing_commits": ["f1x", "f2x"],
      "language": "C",
      "affected_files": ["src/beam.c"],
      "deaths": 3,
      "financial_loss_usd": 0,
      "severity_score": 9.5,
      "verified": true
    }
  ]
}"#;

        let records = parse_records(raw).expect("parse records");
        let record = &records[0];
        assert_eq!(record.fix_commit, "f1x");
        assert_eq!(record.breaking_commit.as_deref(), Some("b4d"));
        assert_eq!(record.cve, None);
        assert_eq!(record.labels.deaths, 3);
    }

    #[test]
    fn nested_labels_win_over_top_level_fields() {
        let raw = r#"[{
  "id": "x",
  "repo_url": "https://example.com/x.git",
  "fix_commit": "abc",
  "root_cause": "flat",
  "labels": {"root_cause": "nested"}
}]"#;

        let records = parse_records(raw).expect("parse records");
        assert_eq!(records[0].labels.root_cause, "nested");
    }

    #[test]
    fn canonical_output_parses_back_unchanged() {
        let raw = r#"[{"id": "x", "project": "P", "repo_url": "https://example.com/x.git", "commit_fixing": "abc", "deaths": 2}]"#;
        let records = parse_records(raw).expect("parse records");
        let written = serde_json::to_string(&records).expect("serialize");
        assert_eq!(parse_records(&written).expect("reparse"), records);
    }

    #[test]
    fn catalog_entries_with_only_placeholder_fixes_are_rejected() {
        let raw = r#"{"catastrophes": [{"id": "x", "repo_url": "https://example.com/x.git", "fixing_commits": ["tried several"]}]}"#;
        let err = parse_records(raw).expect_err("no usable fix commit");
        assert!(matches!(err, RecordError::Invalid { index: 0, .. }));
    }

    #[test]
    fn rejects_records_without_fix_commit() {
        let raw = r#"[{"id": "x", "repo_url": "https://example.com/x.git", "fix_commit": " "}]"#;
        let err = parse_records(raw).expect_err("missing fix commit");
        assert!(matches!(err, RecordError::Invalid { index: 0, .. }));
    }
}
