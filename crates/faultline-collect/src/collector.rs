use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use faultline_config::{FaultlineConfig, QuotaConfig, WindowConfig};
use faultline_core::{
    BucketFill, BucketReport, BucketStatus, CatastropheRecord, CatastropheReport,
    CatastropheSamples, CollectionState, CommitContent, CommitRef, Component, FailureNote,
    FileChange, Language, PartialReason, Sample, SampleBucket, SampleLabel, overlap,
};
use faultline_fetch::{FetchFailure, HistoryWindow, WindowFetcher, WindowRequest};
use faultline_parse::ComponentExtractor;
use tokio::time::{Instant, timeout_at};

use crate::CollectError;
use crate::pool::{PoolCandidate, RandomPool};
use crate::state::StateTracker;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorSettings {
    pub k_hops: usize,
    pub overlap_threshold: f64,
    pub during_window_days: u32,
    pub quotas: QuotaConfig,
    pub window: WindowConfig,
    pub catastrophe_timeout: Duration,
}

impl CollectorSettings {
    pub fn from_config(config: &FaultlineConfig) -> Self {
        Self {
            k_hops: config.sampling.k_hops,
            overlap_threshold: config.sampling.overlap_threshold,
            during_window_days: config.sampling.during_window_days,
            quotas: config.sampling.quotas,
            window: config.window,
            catastrophe_timeout: Duration::from_secs(config.run.catastrophe_timeout_secs.max(1)),
        }
    }

    pub fn quota(&self, bucket: SampleBucket) -> usize {
        match bucket {
            SampleBucket::SafeBefore => self.quotas.safe_before,
            SampleBucket::SafeAfter => self.quotas.safe_after,
            SampleBucket::SafeDuring => self.quotas.safe_during,
            SampleBucket::SafeRandom => self.quotas.safe_random,
        }
    }

    /// Whether a same-repository candidate with `component` scoring `score`
    /// against `reference` belongs in `bucket`. An empty component on either
    /// side carries no evidence of relatedness and only ever qualifies as
    /// different.
    pub fn accepts(
        &self,
        bucket: SampleBucket,
        reference: &Component,
        component: &Component,
        score: f64,
    ) -> bool {
        match bucket {
            SampleBucket::SafeRandom => true,
            same if same.requires_same_component() => {
                !reference.is_empty() && !component.is_empty() && score >= self.overlap_threshold
            }
            _ => score < self.overlap_threshold,
        }
    }
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self::from_config(&FaultlineConfig::default())
    }
}

/// Result of one catastrophe. Skipped catastrophes carry no samples.
#[derive(Debug, Clone)]
pub struct CatastropheOutcome {
    pub report: CatastropheReport,
    pub samples: Option<CatastropheSamples>,
}

/// Fixed inputs shared by the concurrent bucket fills of one catastrophe.
struct Classification<'a> {
    record: &'a CatastropheRecord,
    window: &'a dyn HistoryWindow,
    reference: &'a Component,
    affected: &'a BTreeSet<String>,
    deadline: Instant,
}

pub struct Collector {
    fetcher: Arc<dyn WindowFetcher>,
    extractor: ComponentExtractor,
    pool: Arc<RandomPool>,
    settings: CollectorSettings,
}

impl Collector {
    pub fn new(
        fetcher: Arc<dyn WindowFetcher>,
        extractor: ComponentExtractor,
        pool: Arc<RandomPool>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            pool,
            settings,
        }
    }

    /// Populates the shared SAFE_RANDOM pool; call once before fanning out.
    pub async fn prepare(&self) -> usize {
        self.pool.ensure(self.fetcher.as_ref()).await.len()
    }

    pub async fn collect(
        &self,
        record: &CatastropheRecord,
    ) -> Result<CatastropheOutcome, CollectError> {
        let mut tracker = StateTracker::new(&record.id);
        let deadline = Instant::now() + self.settings.catastrophe_timeout;

        tracker.advance(CollectionState::FetchingPool)?;
        let request = WindowRequest {
            repository: record.repo_url.clone(),
            pivot: record.fix_commit.clone(),
            ancestors: self.settings.window.ancestors,
            descendants: self.settings.window.descendants,
        };

        let window = match timeout_at(deadline, self.fetcher.fetch_window(&request)).await {
            Ok(Ok(window)) => window,
            Ok(Err(err)) => {
                tracing::warn!(
                    catastrophe = %record.id,
                    repository = %record.repo_url,
                    error = %err,
                    "skipping catastrophe"
                );
                tracker.advance(CollectionState::Skipped)?;
                return Ok(CatastropheOutcome {
                    report: CatastropheReport {
                        catastrophe_id: record.id.clone(),
                        repository: record.repo_url.clone(),
                        state: tracker.state(),
                        reason: Some(err.to_string()),
                        component_size: 0,
                        buckets: Vec::new(),
                        failures: vec![FailureNote {
                            commit: Some(record.fix_commit.clone()),
                            stage: "fetch_window".to_owned(),
                            message: err.to_string(),
                        }],
                    },
                    samples: None,
                });
            }
            Err(_) => {
                tracing::warn!(
                    catastrophe = %record.id,
                    repository = %record.repo_url,
                    timeout_secs = self.settings.catastrophe_timeout.as_secs(),
                    "time budget exhausted while fetching history"
                );
                tracker.advance(CollectionState::Partial)?;
                return Ok(self.time_budget_outcome(record, tracker.state()));
            }
        };

        tracker.advance(CollectionState::Classifying)?;
        let mut failures = window
            .failures()
            .iter()
            .map(failure_note)
            .collect::<Vec<_>>();

        let record_files = record.affected_files.iter().cloned().collect::<BTreeSet<_>>();
        let fix_content = match timeout_at(deadline, window.content(window.pivot(), &record_files))
            .await
        {
            Ok(Ok(content)) if !content.is_empty() => Some(content),
            Ok(Ok(_)) => None,
            Ok(Err(err)) => {
                failures.push(FailureNote {
                    commit: Some(window.pivot().id.clone()),
                    stage: "fix_content".to_owned(),
                    message: err.to_string(),
                });
                None
            }
            Err(_) => None,
        };

        let reference = self.reference_component(record, fix_content.as_ref()).await;
        if reference.is_empty() {
            tracing::warn!(
                catastrophe = %record.id,
                "reference component is empty; same-component buckets cannot fill"
            );
        }
        let affected = affected_files(record, fix_content.as_ref(), window.pivot());

        let break_ids = record
            .breaking_commit
            .as_deref()
            .into_iter()
            .chain(window.pivot().first_parent())
            .collect::<BTreeSet<_>>();
        let pools = CandidatePools::build(
            window.as_ref(),
            &affected,
            &break_ids,
            i64::from(self.settings.during_window_days) * SECONDS_PER_DAY,
        );
        let classification = Classification {
            record,
            window: window.as_ref(),
            reference: &reference,
            affected: &affected,
            deadline,
        };

        let (before, after, during) = tokio::join!(
            self.fill_bucket(&classification, SampleBucket::SafeBefore, &pools.before),
            self.fill_bucket(&classification, SampleBucket::SafeAfter, &pools.after),
            self.fill_bucket(&classification, SampleBucket::SafeDuring, &pools.during),
        );

        let mut buckets = BTreeMap::new();
        for (fill, bucket_failures) in [before, after, during] {
            failures.extend(bucket_failures);
            buckets.insert(fill.bucket, fill);
        }
        let random = self.fill_random(record);
        buckets.insert(random.bucket, random);

        let samples = CatastropheSamples {
            catastrophe_id: record.id.clone(),
            break_sample: break_sample(record, Some(window.pivot()), fix_content.as_ref()),
            fix_sample: fix_sample(record, Some(window.pivot()), fix_content.as_ref()),
            buckets,
        };

        let final_state = if samples.buckets.values().all(BucketFill::is_complete) {
            CollectionState::Complete
        } else {
            CollectionState::Partial
        };
        tracker.advance(final_state)?;

        let report = CatastropheReport {
            catastrophe_id: record.id.clone(),
            repository: record.repo_url.clone(),
            state: tracker.state(),
            reason: partial_reason(&samples.buckets),
            component_size: reference.len(),
            buckets: samples.buckets.values().map(BucketReport::from).collect(),
            failures,
        };
        tracing::info!(
            catastrophe = %record.id,
            state = %report.state,
            component_size = report.component_size,
            safe_samples = samples.safe_count(),
            "catastrophe collected"
        );

        Ok(CatastropheOutcome {
            report,
            samples: Some(samples),
        })
    }

    /// Component of the real fix diff when its content loaded, otherwise of
    /// the record's before/after text.
    async fn reference_component(
        &self,
        record: &CatastropheRecord,
        fix_content: Option<&CommitContent>,
    ) -> Component {
        if let Some(content) = fix_content {
            let component = self.commit_component(content.clone()).await;
            if !component.is_empty() {
                return component;
            }
        }

        let Some(language) = record.language() else {
            return Component::empty();
        };
        let file_path = record
            .primary_file()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("snippet.{}", language.as_str()));
        let content = CommitContent {
            commit_id: record.fix_commit.clone(),
            files: vec![FileChange {
                path: file_path,
                language: Some(language),
                before: record.before_code.clone(),
                after: record.after_code.clone(),
            }],
        };
        self.commit_component(content).await
    }

    /// Parse failures degrade to an empty component.
    async fn commit_component(&self, content: CommitContent) -> Component {
        let extractor = self.extractor.clone();
        let k = self.settings.k_hops;
        let commit_id = content.commit_id.clone();
        match tokio::task::spawn_blocking(move || extractor.commit_component(&content, k)).await {
            Ok(Ok(component)) => component,
            Ok(Err(err)) => {
                tracing::debug!(commit = %commit_id, error = %err, "component extraction failed");
                Component::empty()
            }
            Err(err) => {
                tracing::warn!(commit = %commit_id, error = %err, "component task failed");
                Component::empty()
            }
        }
    }

    async fn fill_bucket(
        &self,
        classification: &Classification<'_>,
        bucket: SampleBucket,
        candidates: &[&CommitRef],
    ) -> (BucketFill, Vec<FailureNote>) {
        let quota = self.settings.quota(bucket);
        let record = classification.record;
        let window = classification.window;
        let mut samples = Vec::new();
        let mut failures = Vec::new();
        let mut examined = 0;
        let mut out_of_time = false;

        for candidate in candidates {
            if samples.len() >= quota {
                break;
            }
            if Instant::now() >= classification.deadline {
                out_of_time = true;
                break;
            }
            examined += 1;

            let content = match timeout_at(
                classification.deadline,
                window.content(candidate, classification.affected),
            )
            .await
            {
                Ok(Ok(content)) => content,
                    Ok(Err(err)) => {
                        tracing::warn!(
                            catastrophe = %record.id,
                            bucket = %bucket,
                            commit = %candidate.short_id(),
                            error = %err,
                            "candidate content unavailable"
                        );
                        failures.push(FailureNote {
                            commit: Some(candidate.id.clone()),
                            stage: format!("content:{}", bucket.as_str()),
                            message: err.to_string(),
                        });
                        continue;
                    }
                    Err(_) => {
                        out_of_time = true;
                        break;
                    }
                };
            if content.is_empty() {
                continue;
            }

            let component = self.commit_component(content.clone()).await;
            let score = overlap(classification.reference, &component);
            let accepted =
                self.settings
                    .accepts(bucket, classification.reference, &component, score);
            tracing::debug!(
                catastrophe = %record.id,
                bucket = %bucket,
                commit = %candidate.short_id(),
                component_size = component.len(),
                overlap = score,
                accepted,
                "classified candidate"
            );
            if accepted {
                let file = if bucket.requires_same_component() {
                    content
                        .files
                        .iter()
                        .find(|file| classification.affected.contains(&file.path))
                        .or_else(|| content.primary_file())
                } else {
                    content.primary_file()
                };
                if let Some(sample) =
                    file.map(|file| candidate_sample(record, bucket, candidate, file, score))
                {
                    samples.push(sample);
                }
            }
        }

        let status = if samples.len() >= quota {
            BucketStatus::Complete
        } else if out_of_time {
            BucketStatus::Partial(PartialReason::TimeBudgetExhausted)
        } else if window.is_partial() {
            BucketStatus::Partial(PartialReason::FetchDegraded)
        } else {
            BucketStatus::Partial(PartialReason::PoolExhausted)
        };
        if status != BucketStatus::Complete {
            tracing::warn!(
                catastrophe = %record.id,
                bucket = %bucket,
                filled = samples.len(),
                quota,
                examined,
                "bucket under-filled"
            );
        }

        (
            BucketFill {
                bucket,
                quota,
                samples,
                status,
                examined,
            },
            failures,
        )
    }

    fn fill_random(&self, record: &CatastropheRecord) -> BucketFill {
        let quota = self.settings.quota(SampleBucket::SafeRandom);
        let drawn = self.pool.draw(&record.id, &record.repo_url, quota);
        let examined = drawn.len();
        let samples = drawn
            .into_iter()
            .map(|candidate| random_sample(record, candidate))
            .collect::<Vec<_>>();
        let status = if samples.len() >= quota {
            BucketStatus::Complete
        } else {
            BucketStatus::Partial(PartialReason::PoolExhausted)
        };
        BucketFill {
            bucket: SampleBucket::SafeRandom,
            quota,
            samples,
            status,
            examined,
        }
    }

    /// The fetch ran out of time: only the record's own pair and the shared
    /// random pool can be served.
    fn time_budget_outcome(
        &self,
        record: &CatastropheRecord,
        state: CollectionState,
    ) -> CatastropheOutcome {
        let mut buckets = BTreeMap::new();
        for bucket in [
            SampleBucket::SafeBefore,
            SampleBucket::SafeAfter,
            SampleBucket::SafeDuring,
        ] {
            let quota = self.settings.quota(bucket);
            let status = if quota == 0 {
                BucketStatus::Complete
            } else {
                BucketStatus::Partial(PartialReason::TimeBudgetExhausted)
            };
            buckets.insert(
                bucket,
                BucketFill {
                    bucket,
                    quota,
                    samples: Vec::new(),
                    status,
                    examined: 0,
                },
            );
        }
        let random = self.fill_random(record);
        buckets.insert(random.bucket, random);

        let samples = CatastropheSamples {
            catastrophe_id: record.id.clone(),
            break_sample: break_sample(record, None, None),
            fix_sample: fix_sample(record, None, None),
            buckets,
        };
        CatastropheOutcome {
            report: CatastropheReport {
                catastrophe_id: record.id.clone(),
                repository: record.repo_url.clone(),
                state,
                reason: partial_reason(&samples.buckets),
                component_size: 0,
                buckets: samples.buckets.values().map(BucketReport::from).collect(),
                failures: vec![FailureNote {
                    commit: Some(record.fix_commit.clone()),
                    stage: "fetch_window".to_owned(),
                    message: PartialReason::TimeBudgetExhausted.as_str().to_owned(),
                }],
            },
            samples: Some(samples),
        }
    }
}

/// Same-repository candidates, each in discovery order (closest first).
/// The BREAK commit and the fix's parent never enter any pool.
struct CandidatePools<'w> {
    before: Vec<&'w CommitRef>,
    after: Vec<&'w CommitRef>,
    during: Vec<&'w CommitRef>,
}

impl<'w> CandidatePools<'w> {
    fn build(
        window: &'w dyn HistoryWindow,
        affected: &BTreeSet<String>,
        excluded: &BTreeSet<&str>,
        during_secs: i64,
    ) -> Self {
        let eligible = |commit: &&CommitRef| !excluded.contains(commit.id.as_str());
        let before = window
            .ancestors()
            .iter()
            .filter(eligible)
            .filter(|commit| commit.touches_any(affected))
            .collect();
        let after = window
            .descendants()
            .iter()
            .filter(eligible)
            .filter(|commit| commit.touches_any(affected))
            .collect();

        let fix_time = window.pivot().timestamp;
        let mut during = window
            .ancestors()
            .iter()
            .chain(window.descendants())
            .filter(eligible)
            .filter(|commit| !commit.touches_any(affected))
            .filter(|commit| (commit.timestamp - fix_time).abs() <= during_secs)
            .collect::<Vec<_>>();
        during.sort_by_key(|commit| commit.distance.abs());

        Self {
            before,
            after,
            during,
        }
    }
}

/// Files of the real fix diff when known, else the record's, else whatever
/// the fix commit touched.
fn affected_files(
    record: &CatastropheRecord,
    fix_content: Option<&CommitContent>,
    pivot: &CommitRef,
) -> BTreeSet<String> {
    if let Some(content) = fix_content {
        return content.files.iter().map(|file| file.path.clone()).collect();
    }
    if !record.affected_files.is_empty() {
        return record.affected_files.iter().cloned().collect();
    }
    pivot.changed_files.clone()
}

fn candidate_sample(
    record: &CatastropheRecord,
    bucket: SampleBucket,
    commit: &CommitRef,
    file: &FileChange,
    score: f64,
) -> Sample {
    Sample {
        catastrophe_id: record.id.clone(),
        label: SampleLabel::from(bucket),
        repository: record.repo_url.clone(),
        commit_id: commit.id.clone(),
        file_path: file.path.clone(),
        language: file.language,
        before_source: file.before.clone(),
        source: file.after.clone(),
        overlap: score,
        timestamp: Some(commit.timestamp),
        summary: commit.summary.clone(),
    }
}

fn random_sample(record: &CatastropheRecord, candidate: &PoolCandidate) -> Sample {
    Sample {
        catastrophe_id: record.id.clone(),
        label: SampleLabel::SafeRandom,
        repository: candidate.repository.clone(),
        commit_id: candidate.commit_id.clone(),
        file_path: candidate.file.path.clone(),
        language: candidate.file.language,
        before_source: candidate.file.before.clone(),
        source: candidate.file.after.clone(),
        overlap: 0.0,
        timestamp: Some(candidate.timestamp),
        summary: candidate.summary.clone(),
    }
}

/// Record text first; the real fix diff stands in when the record has none.
fn record_pair(
    record: &CatastropheRecord,
    fix_content: Option<&CommitContent>,
) -> (String, Option<Language>, String, String) {
    let language = record.language();
    let path = record.primary_file().unwrap_or_default().to_owned();
    if !record.before_code.trim().is_empty() || !record.after_code.trim().is_empty() {
        return (
            path,
            language,
            record.before_code.clone(),
            record.after_code.clone(),
        );
    }
    match fix_content.and_then(CommitContent::primary_file) {
        Some(file) => (
            file.path.clone(),
            file.language.or(language),
            file.before.clone(),
            file.after.clone(),
        ),
        None => (path, language, String::new(), String::new()),
    }
}

fn break_sample(
    record: &CatastropheRecord,
    pivot: Option<&CommitRef>,
    fix_content: Option<&CommitContent>,
) -> Sample {
    let (file_path, language, before, _) = record_pair(record, fix_content);
    let commit_id = record
        .breaking_commit
        .clone()
        .or_else(|| pivot.and_then(CommitRef::first_parent).map(str::to_owned))
        .unwrap_or_else(|| format!("{}^", record.fix_commit));
    Sample {
        catastrophe_id: record.id.clone(),
        label: SampleLabel::Break,
        repository: record.repo_url.clone(),
        commit_id,
        file_path,
        language,
        before_source: String::new(),
        source: before,
        overlap: 1.0,
        timestamp: None,
        summary: record.labels.root_cause.clone(),
    }
}

fn fix_sample(
    record: &CatastropheRecord,
    pivot: Option<&CommitRef>,
    fix_content: Option<&CommitContent>,
) -> Sample {
    let (file_path, language, before, after) = record_pair(record, fix_content);
    Sample {
        catastrophe_id: record.id.clone(),
        label: SampleLabel::Fix,
        repository: record.repo_url.clone(),
        commit_id: pivot
            .map(|commit| commit.id.clone())
            .unwrap_or_else(|| record.fix_commit.clone()),
        file_path,
        language,
        before_source: before,
        source: after,
        overlap: 1.0,
        timestamp: pivot.map(|commit| commit.timestamp),
        summary: pivot
            .map(|commit| commit.summary.clone())
            .unwrap_or_default(),
    }
}

fn partial_reason(buckets: &BTreeMap<SampleBucket, BucketFill>) -> Option<String> {
    let reasons = buckets
        .values()
        .filter_map(|fill| match fill.status {
            BucketStatus::Complete => None,
            BucketStatus::Partial(reason) => Some(format!(
                "{} {}/{}: {}",
                fill.bucket,
                fill.filled(),
                fill.quota,
                reason.as_str()
            )),
        })
        .collect::<Vec<_>>();
    (!reasons.is_empty()).then(|| reasons.join("; "))
}

fn failure_note(failure: &FetchFailure) -> FailureNote {
    FailureNote {
        commit: failure.commit.clone(),
        stage: failure.stage.clone(),
        message: failure.error.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CatastropheRecord {
        CatastropheRecord {
            id: "heartbleed".to_owned(),
            name: "OpenSSL".to_owned(),
            project: None,
            cve: Some("CVE-2014-0160".to_owned()),
            repo_url: "https://github.com/openssl/openssl.git".to_owned(),
            fix_commit: "96db9023b881d7cd9f379b0c154650d6c108e9a3".to_owned(),
            breaking_commit: None,
            affected_files: vec!["ssl/d1_both.c".to_owned()],
            before_code: "int f(void) { return 0; }".to_owned(),
            after_code: "int f(void) { return 1; }".to_owned(),
            language: "c".to_owned(),
            labels: Default::default(),
        }
    }

    #[test]
    fn three_of_thirty_seven_is_different_not_same_component() {
        let settings = CollectorSettings::default();
        let reference = Component::new(["a", "b"]);
        let component = Component::new(["a"]);
        let score = 3.0 / 37.0;
        assert!(!settings.accepts(SampleBucket::SafeBefore, &reference, &component, score));
        assert!(!settings.accepts(SampleBucket::SafeAfter, &reference, &component, score));
        assert!(settings.accepts(SampleBucket::SafeDuring, &reference, &component, score));
    }

    #[test]
    fn threshold_is_inclusive_for_same_component_buckets() {
        let settings = CollectorSettings::default();
        let reference = Component::new(["a", "b"]);
        let component = Component::new(["a"]);
        assert!(settings.accepts(SampleBucket::SafeBefore, &reference, &component, 0.10));
        assert!(!settings.accepts(SampleBucket::SafeDuring, &reference, &component, 0.10));
    }

    #[test]
    fn empty_components_only_qualify_as_different() {
        let settings = CollectorSettings::default();
        let reference = Component::new(["a"]);
        let empty = Component::empty();
        assert!(!settings.accepts(SampleBucket::SafeBefore, &reference, &empty, 0.0));
        assert!(settings.accepts(SampleBucket::SafeDuring, &reference, &empty, 0.0));
    }

    #[test]
    fn empty_reference_never_admits_same_component_samples() {
        let settings = CollectorSettings {
            overlap_threshold: 0.0,
            ..CollectorSettings::default()
        };
        let reference = Component::empty();
        let component = Component::new(["a"]);
        let score = overlap(&reference, &component);
        assert!(!settings.accepts(SampleBucket::SafeBefore, &reference, &component, score));
        assert!(!settings.accepts(SampleBucket::SafeAfter, &reference, &component, score));
    }

    #[test]
    fn break_commit_falls_back_to_fix_parent_notation() {
        let record = record();
        let sample = break_sample(&record, None, None);
        assert_eq!(
            sample.commit_id,
            "96db9023b881d7cd9f379b0c154650d6c108e9a3^"
        );
        assert_eq!(sample.source, record.before_code);
        assert_eq!(sample.language, Some(Language::C));

        let fix = fix_sample(&record, None, None);
        assert_eq!(fix.before_source, record.before_code);
        assert_eq!(fix.source, record.after_code);
        assert_eq!(fix.label, SampleLabel::Fix);
    }

    #[test]
    fn partial_reason_lists_underfilled_buckets() {
        let mut buckets = BTreeMap::new();
        buckets.insert(
            SampleBucket::SafeBefore,
            BucketFill {
                bucket: SampleBucket::SafeBefore,
                quota: 20,
                samples: Vec::new(),
                status: BucketStatus::Partial(PartialReason::PoolExhausted),
                examined: 5,
            },
        );
        buckets.insert(
            SampleBucket::SafeDuring,
            BucketFill {
                bucket: SampleBucket::SafeDuring,
                quota: 0,
                samples: Vec::new(),
                status: BucketStatus::Complete,
                examined: 0,
            },
        );
        assert_eq!(
            partial_reason(&buckets).as_deref(),
            Some("SAFE_BEFORE 0/20: pool_exhausted")
        );
    }
}
