use std::collections::HashMap;
use std::sync::Arc;

use faultline_core::{
    CatastropheRecord, CatastropheReport, CollectionReport, CollectionState, Dataset, FailureNote,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};

use crate::collector::{CatastropheOutcome, Collector};

/// Everything one run produced, with wall-clock bounds in RFC 3339.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub started_at: String,
    pub finished_at: String,
    pub dataset: Dataset,
    pub report: CollectionReport,
}

impl RunOutcome {
    pub fn summary_line(&self) -> String {
        format!(
            "{} catastrophes: {} complete, {} partial, {} skipped; {} samples",
            self.report.catastrophes.len(),
            self.report.count_in_state(CollectionState::Complete),
            self.report.count_in_state(CollectionState::Partial),
            self.report.count_in_state(CollectionState::Skipped),
            self.dataset.total_samples(),
        )
    }
}

/// Collects every record with at most `concurrency` catastrophes in flight.
/// One catastrophe failing, even by panicking, never aborts the others; the
/// report keeps input order.
pub async fn run_collection(
    collector: Arc<Collector>,
    records: Vec<CatastropheRecord>,
    concurrency: usize,
) -> RunOutcome {
    let started_at = chrono::Utc::now().to_rfc3339();
    let pool_size = collector.prepare().await;
    tracing::info!(
        catastrophes = records.len(),
        random_pool = pool_size,
        concurrency,
        "starting collection"
    );

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut join_set = JoinSet::new();
    let mut in_flight: HashMap<task::Id, (usize, String, String)> = HashMap::new();

    for (index, record) in records.into_iter().enumerate() {
        let collector = collector.clone();
        let semaphore = semaphore.clone();
        let identity = (index, record.id.clone(), record.repo_url.clone());

        let handle = join_set.spawn(async move {
            let permit = semaphore.acquire_owned().await;
            let _permit = match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return (
                        index,
                        skipped(&record.id, &record.repo_url, "collection semaphore closed"),
                    );
                }
            };

            match collector.collect(&record).await {
                Ok(outcome) => (index, outcome),
                Err(err) => {
                    tracing::warn!(catastrophe = %record.id, error = %err, "collection failed");
                    (index, skipped(&record.id, &record.repo_url, &err.to_string()))
                }
            }
        });
        in_flight.insert(handle.id(), identity);
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = join_set.join_next_with_id().await {
        match joined {
            Ok((id, result)) => {
                in_flight.remove(&id);
                outcomes.push(result);
            }
            Err(err) => {
                let Some((index, catastrophe, repository)) = in_flight.remove(&err.id()) else {
                    tracing::error!(error = %err, "collection task ended without a catastrophe");
                    continue;
                };
                let reason = if err.is_panic() {
                    "collection task panicked"
                } else {
                    "collection task cancelled"
                };
                tracing::error!(catastrophe = %catastrophe, error = %err, "{reason}");
                outcomes.push((index, skipped(&catastrophe, &repository, reason)));
            }
        }
    }
    outcomes.sort_by_key(|(index, _)| *index);

    let mut dataset = Dataset::default();
    let mut report = CollectionReport::default();
    for (_, outcome) in outcomes {
        if let Some(samples) = outcome.samples {
            dataset.insert(samples);
        }
        report.catastrophes.push(outcome.report);
    }

    let outcome = RunOutcome {
        started_at,
        finished_at: chrono::Utc::now().to_rfc3339(),
        dataset,
        report,
    };
    for (label, count) in outcome.dataset.count_by_label() {
        tracing::debug!(label = label.as_str(), count, "samples by label");
    }
    tracing::info!(summary = %outcome.summary_line(), "collection finished");
    outcome
}

fn skipped(catastrophe: &str, repository: &str, reason: &str) -> CatastropheOutcome {
    CatastropheOutcome {
        report: CatastropheReport {
            catastrophe_id: catastrophe.to_owned(),
            repository: repository.to_owned(),
            state: CollectionState::Skipped,
            reason: Some(reason.to_owned()),
            component_size: 0,
            buckets: Vec::new(),
            failures: vec![FailureNote {
                commit: None,
                stage: "collect".to_owned(),
                message: reason.to_owned(),
            }],
        },
        samples: None,
    }
}
