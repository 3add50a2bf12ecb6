use std::time::Duration;

use faultline_core::CatastropheRecord;
use faultline_fetch::{FetchError, WindowFetcher, WindowRequest};
use serde::Serialize;
use tokio::time::timeout;

const LISTED_FILES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    Ok,
    Unavailable,
    Transient,
    TimedOut,
    Error,
}

impl VerifyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Unavailable => "unavailable",
            Self::Transient => "transient",
            Self::TimedOut => "timed_out",
            Self::Error => "error",
        }
    }

    fn for_error(err: &FetchError) -> Self {
        if err.is_repository_unavailable() {
            Self::Unavailable
        } else if err.is_transient() {
            Self::Transient
        } else {
            Self::Error
        }
    }
}

impl std::fmt::Display for VerifyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Whether one record's fix commit can be reached, and what it touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub catastrophe_id: String,
    pub name: String,
    pub repository: String,
    pub fix_commit: String,
    pub status: VerifyStatus,
    pub has_parent: bool,
    pub changed_files: Vec<String>,
    pub total_changed_files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Verification {
    fn failed(record: &CatastropheRecord, status: VerifyStatus, message: String) -> Self {
        Self {
            catastrophe_id: record.id.clone(),
            name: record.name.clone(),
            repository: record.repo_url.clone(),
            fix_commit: record.fix_commit.clone(),
            status,
            has_parent: false,
            changed_files: Vec::new(),
            total_changed_files: 0,
            message: Some(message),
        }
    }
}

/// Fetches a one-generation window around each fix commit, one record at a
/// time. Nothing is sampled or parsed.
pub async fn verify_records(
    fetcher: &dyn WindowFetcher,
    records: &[CatastropheRecord],
    limit: Duration,
) -> Vec<Verification> {
    let mut verifications = Vec::with_capacity(records.len());
    for record in records {
        let verification = verify_record(fetcher, record, limit).await;
        tracing::info!(
            catastrophe = %verification.catastrophe_id,
            status = %verification.status,
            files = verification.total_changed_files,
            "verified fix commit"
        );
        verifications.push(verification);
    }
    verifications
}

async fn verify_record(
    fetcher: &dyn WindowFetcher,
    record: &CatastropheRecord,
    limit: Duration,
) -> Verification {
    let request = WindowRequest {
        repository: record.repo_url.clone(),
        pivot: record.fix_commit.clone(),
        ancestors: 1,
        descendants: 0,
    };
    let window = match timeout(limit, fetcher.fetch_window(&request)).await {
        Ok(Ok(window)) => window,
        Ok(Err(err)) => {
            return Verification::failed(record, VerifyStatus::for_error(&err), err.to_string());
        }
        Err(_) => {
            return Verification::failed(
                record,
                VerifyStatus::TimedOut,
                format!("no answer within {}s", limit.as_secs()),
            );
        }
    };

    let pivot = window.pivot();
    let message = window
        .failures()
        .first()
        .map(|failure| format!("{}: {}", failure.stage, failure.error));
    Verification {
        catastrophe_id: record.id.clone(),
        name: record.name.clone(),
        repository: record.repo_url.clone(),
        fix_commit: pivot.id.clone(),
        status: VerifyStatus::Ok,
        has_parent: !window.ancestors().is_empty(),
        changed_files: pivot
            .changed_files
            .iter()
            .take(LISTED_FILES)
            .cloned()
            .collect(),
        total_changed_files: pivot.changed_files.len(),
        message,
    }
}

pub fn verification_summary(verifications: &[Verification]) -> String {
    let count = |status: VerifyStatus| {
        verifications
            .iter()
            .filter(|verification| verification.status == status)
            .count()
    };
    format!(
        "{} verified: {} ok, {} unavailable, {} transient, {} timed out, {} errors",
        verifications.len(),
        count(VerifyStatus::Ok),
        count(VerifyStatus::Unavailable),
        count(VerifyStatus::Transient),
        count(VerifyStatus::TimedOut),
        count(VerifyStatus::Error),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_errors_map_onto_statuses() {
        assert_eq!(
            VerifyStatus::for_error(&FetchError::RepositoryUnavailable("gone".to_owned())),
            VerifyStatus::Unavailable
        );
        assert_eq!(
            VerifyStatus::for_error(&FetchError::Transient("reset".to_owned())),
            VerifyStatus::Transient
        );
        assert_eq!(
            VerifyStatus::for_error(&FetchError::Protocol("not our ref".to_owned())),
            VerifyStatus::Error
        );
    }

    #[test]
    fn summary_counts_each_status() {
        let record = CatastropheRecord {
            id: "x".to_owned(),
            name: String::new(),
            project: None,
            cve: None,
            repo_url: "https://example.com/x.git".to_owned(),
            fix_commit: "abc".to_owned(),
            breaking_commit: None,
            affected_files: Vec::new(),
            before_code: String::new(),
            after_code: String::new(),
            language: String::new(),
            labels: Default::default(),
        };
        let verifications = vec![
            Verification::failed(&record, VerifyStatus::Unavailable, "gone".to_owned()),
            Verification::failed(&record, VerifyStatus::TimedOut, "slow".to_owned()),
        ];
        assert_eq!(
            verification_summary(&verifications),
            "2 verified: 0 ok, 1 unavailable, 0 transient, 1 timed out, 0 errors"
        );
    }
}
