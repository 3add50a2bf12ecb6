use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Language;

/// The four safe-sample categories collected per catastrophe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SampleBucket {
    /// Same component, strictly earlier than the fix.
    SafeBefore,
    /// Same component, strictly later than the fix.
    SafeAfter,
    /// Different component, contemporaneous with the fix.
    SafeDuring,
    /// Unrelated repository.
    SafeRandom,
}

impl SampleBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SafeBefore => "SAFE_BEFORE",
            Self::SafeAfter => "SAFE_AFTER",
            Self::SafeDuring => "SAFE_DURING",
            Self::SafeRandom => "SAFE_RANDOM",
        }
    }

    /// Buckets that require the candidate to share the catastrophe's component.
    pub fn requires_same_component(self) -> bool {
        matches!(self, Self::SafeBefore | Self::SafeAfter)
    }
}

impl fmt::Display for SampleBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SampleLabel {
    Break,
    Fix,
    SafeBefore,
    SafeAfter,
    SafeDuring,
    SafeRandom,
}

impl SampleLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Break => "BREAK",
            Self::Fix => "FIX",
            Self::SafeBefore => "SAFE_BEFORE",
            Self::SafeAfter => "SAFE_AFTER",
            Self::SafeDuring => "SAFE_DURING",
            Self::SafeRandom => "SAFE_RANDOM",
        }
    }
}

impl From<SampleBucket> for SampleLabel {
    fn from(bucket: SampleBucket) -> Self {
        match bucket {
            SampleBucket::SafeBefore => Self::SafeBefore,
            SampleBucket::SafeAfter => Self::SafeAfter,
            SampleBucket::SafeDuring => Self::SafeDuring,
            SampleBucket::SafeRandom => Self::SafeRandom,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub catastrophe_id: String,
    pub label: SampleLabel,
    pub repository: String,
    pub commit_id: String,
    pub file_path: String,
    pub language: Option<Language>,
    pub before_source: String,
    pub source: String,
    pub overlap: f64,
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialReason {
    PoolExhausted,
    TimeBudgetExhausted,
    FetchDegraded,
}

impl PartialReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PoolExhausted => "pool_exhausted",
            Self::TimeBudgetExhausted => "time_budget_exhausted",
            Self::FetchDegraded => "fetch_degraded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BucketStatus {
    Complete,
    Partial(PartialReason),
}

/// One bucket after classification. `samples.len()` never exceeds `quota`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketFill {
    pub bucket: SampleBucket,
    pub quota: usize,
    pub samples: Vec<Sample>,
    pub status: BucketStatus,
    /// Candidates examined before the bucket closed.
    pub examined: usize,
}

impl BucketFill {
    pub fn is_complete(&self) -> bool {
        self.status == BucketStatus::Complete
    }

    pub fn filled(&self) -> usize {
        self.samples.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatastropheSamples {
    pub catastrophe_id: String,
    pub break_sample: Sample,
    pub fix_sample: Sample,
    pub buckets: BTreeMap<SampleBucket, BucketFill>,
}

impl CatastropheSamples {
    pub fn safe_count(&self) -> usize {
        self.buckets.values().map(BucketFill::filled).sum()
    }

    pub fn all_samples(&self) -> impl Iterator<Item = &Sample> {
        [&self.break_sample, &self.fix_sample]
            .into_iter()
            .chain(self.buckets.values().flat_map(|fill| fill.samples.iter()))
    }
}

/// Samples keyed by catastrophe id; skipped catastrophes are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Dataset {
    pub catastrophes: BTreeMap<String, CatastropheSamples>,
}

impl Dataset {
    pub fn insert(&mut self, samples: CatastropheSamples) {
        self.catastrophes
            .insert(samples.catastrophe_id.clone(), samples);
    }

    pub fn total_samples(&self) -> usize {
        self.catastrophes
            .values()
            .map(|entry| entry.safe_count() + 2)
            .sum()
    }

    pub fn count_by_label(&self) -> BTreeMap<SampleLabel, usize> {
        let mut counts = BTreeMap::new();
        for sample in self
            .catastrophes
            .values()
            .flat_map(CatastropheSamples::all_samples)
        {
            *counts.entry(sample.label).or_insert(0) += 1;
        }
        counts
    }
}

/// Per-catastrophe lifecycle: `Pending → FetchingPool → Classifying →
/// {Complete | Partial | Skipped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectionState {
    Pending,
    FetchingPool,
    Classifying,
    Complete,
    Partial,
    Skipped,
}

impl CollectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::FetchingPool => "FETCHING_POOL",
            Self::Classifying => "CLASSIFYING",
            Self::Complete => "COMPLETE",
            Self::Partial => "PARTIAL",
            Self::Skipped => "SKIPPED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Partial | Self::Skipped)
    }

    pub fn can_transition_to(self, next: CollectionState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::FetchingPool)
                | (Self::FetchingPool, Self::Classifying)
                | (Self::FetchingPool, Self::Skipped)
                | (Self::FetchingPool, Self::Partial)
                | (Self::Classifying, Self::Complete)
                | (Self::Classifying, Self::Partial)
        )
    }
}

impl fmt::Display for CollectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureNote {
    pub commit: Option<String>,
    pub stage: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketReport {
    pub bucket: SampleBucket,
    pub filled: usize,
    pub quota: usize,
    pub examined: usize,
    pub status: BucketStatus,
}

impl From<&BucketFill> for BucketReport {
    fn from(fill: &BucketFill) -> Self {
        Self {
            bucket: fill.bucket,
            filled: fill.filled(),
            quota: fill.quota,
            examined: fill.examined,
            status: fill.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatastropheReport {
    pub catastrophe_id: String,
    pub repository: String,
    pub state: CollectionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub component_size: usize,
    pub buckets: Vec<BucketReport>,
    pub failures: Vec<FailureNote>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CollectionReport {
    pub catastrophes: Vec<CatastropheReport>,
}

impl CollectionReport {
    pub fn count_in_state(&self, state: CollectionState) -> usize {
        self.catastrophes
            .iter()
            .filter(|entry| entry.state == state)
            .count()
    }

    pub fn get(&self, catastrophe_id: &str) -> Option<&CatastropheReport> {
        self.catastrophes
            .iter()
            .find(|entry| entry.catastrophe_id == catastrophe_id)
    }
}
