use std::collections::BTreeSet;

use faultline_config::RandomPoolConfig;
use faultline_core::{FileChange, stable_hash};
use faultline_fetch::{WindowFetcher, WindowRequest};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

/// One commit from an unrelated repository, with its primary file already
/// loaded so the pool outlives the windows it was drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCandidate {
    pub repository: String,
    pub commit_id: String,
    pub timestamp: i64,
    pub summary: String,
    pub file: FileChange,
}

/// Shared SAFE_RANDOM candidates, populated once and read-only afterwards.
#[derive(Debug, Default)]
pub struct RandomPool {
    config: RandomPoolConfig,
    candidates: OnceCell<Vec<PoolCandidate>>,
}

impl RandomPool {
    pub fn new(config: RandomPoolConfig) -> Self {
        Self {
            config,
            candidates: OnceCell::new(),
        }
    }

    pub fn preloaded(candidates: Vec<PoolCandidate>) -> Self {
        Self {
            config: RandomPoolConfig::default(),
            candidates: OnceCell::new_with(Some(candidates)),
        }
    }

    /// Fetches the configured repositories on first use. Concurrent callers
    /// wait for the same population.
    pub async fn ensure(&self, fetcher: &dyn WindowFetcher) -> &[PoolCandidate] {
        self.candidates
            .get_or_init(|| populate(fetcher, &self.config))
            .await
    }

    pub fn candidates(&self) -> &[PoolCandidate] {
        self.candidates.get().map(Vec::as_slice).unwrap_or_default()
    }

    /// Up to `quota` candidates from repositories other than
    /// `own_repository`, starting at an offset derived from the catastrophe
    /// id so different catastrophes see different slices.
    pub fn draw(
        &self,
        catastrophe_id: &str,
        own_repository: &str,
        quota: usize,
    ) -> Vec<&PoolCandidate> {
        let own = repository_key(own_repository);
        let eligible = self
            .candidates()
            .iter()
            .filter(|candidate| repository_key(&candidate.repository) != own)
            .collect::<Vec<_>>();
        if eligible.is_empty() {
            return Vec::new();
        }

        let offset = (stable_hash(catastrophe_id) % eligible.len() as u64) as usize;
        eligible
            .iter()
            .cycle()
            .skip(offset)
            .take(quota.min(eligible.len()))
            .copied()
            .collect()
    }
}

async fn populate(fetcher: &dyn WindowFetcher, config: &RandomPoolConfig) -> Vec<PoolCandidate> {
    let mut candidates = Vec::new();
    for repository in &config.repositories {
        let pivot = match &repository.pivot {
            Some(pivot) => pivot.clone(),
            None => match fetcher.resolve_head(&repository.url).await {
                Ok(head) => head,
                Err(err) => {
                    tracing::warn!(
                        repository = %repository.url,
                        error = %err,
                        "skipping random pool repository"
                    );
                    continue;
                }
            },
        };

        let request = WindowRequest {
            repository: repository.url.clone(),
            pivot,
            ancestors: config.per_repository,
            descendants: 0,
        };
        let window = match fetcher.fetch_window(&request).await {
            Ok(window) => window,
            Err(err) => {
                tracing::warn!(
                    repository = %repository.url,
                    error = %err,
                    "skipping random pool repository"
                );
                continue;
            }
        };

        let mut taken = 0;
        let commits = std::iter::once(window.pivot()).chain(window.ancestors());
        for commit in commits {
            if taken >= config.per_repository {
                break;
            }
            let content = match window.content(commit, &BTreeSet::new()).await {
                Ok(content) => content,
                Err(err) => {
                    tracing::debug!(
                        repository = %repository.url,
                        commit = %commit.short_id(),
                        error = %err,
                        "random pool candidate content unavailable"
                    );
                    continue;
                }
            };
            let Some(file) = content.files.into_iter().next() else {
                continue;
            };
            candidates.push(PoolCandidate {
                repository: repository.url.clone(),
                commit_id: commit.id.clone(),
                timestamp: commit.timestamp,
                summary: commit.summary.clone(),
                file,
            });
            taken += 1;
        }
        tracing::info!(
            repository = %repository.url,
            candidates = taken,
            "random pool repository loaded"
        );
    }
    candidates
}

/// Host and path of a repository URL, ignoring scheme, user, `.git` suffix
/// and case, so the same repository matches across URL spellings.
pub fn repository_key(url: &str) -> String {
    let trimmed = url.trim().to_ascii_lowercase();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(&trimmed);
    let without_user = without_scheme
        .split_once('@')
        .map(|(_, rest)| rest)
        .unwrap_or(without_scheme);
    without_user
        .replacen(':', "/", 1)
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .trim_end_matches('/')
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(repository: &str, commit_id: &str) -> PoolCandidate {
        PoolCandidate {
            repository: repository.to_owned(),
            commit_id: commit_id.to_owned(),
            timestamp: 0,
            summary: String::new(),
            file: FileChange {
                path: "src/main.rs".to_owned(),
                language: None,
                before: String::new(),
                after: "fn main() {}".to_owned(),
            },
        }
    }

    fn pool() -> RandomPool {
        RandomPool::preloaded(vec![
            candidate("https://github.com/openssl/openssl.git", "o1"),
            candidate("https://github.com/sharkdp/fd", "f1"),
            candidate("https://github.com/sharkdp/fd", "f2"),
            candidate("https://github.com/BurntSushi/ripgrep.git", "r1"),
        ])
    }

    #[test]
    fn repository_keys_ignore_url_spelling() {
        let expected = "github.com/openssl/openssl";
        assert_eq!(repository_key("https://github.com/openssl/openssl.git"), expected);
        assert_eq!(repository_key("git@github.com:OpenSSL/openssl.git"), expected);
        assert_eq!(repository_key("https://github.com/openssl/openssl/"), expected);
    }

    #[test]
    fn draw_excludes_the_catastrophes_own_repository() {
        let pool = pool();
        let drawn = pool.draw("heartbleed", "git@github.com:openssl/openssl.git", 10);
        assert_eq!(drawn.len(), 3);
        assert!(drawn.iter().all(|c| !c.repository.contains("openssl")));
    }

    #[test]
    fn draw_is_deterministic_and_bounded_by_quota() {
        let pool = pool();
        let first = pool.draw("log4shell", "https://github.com/apache/logging-log4j2", 2);
        let second = pool.draw("log4shell", "https://github.com/apache/logging-log4j2", 2);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_ne!(first[0].commit_id, first[1].commit_id);
        assert!(pool.draw("x", "https://example.com/x", 0).is_empty());
    }

    #[test]
    fn empty_pool_draws_nothing() {
        let pool = RandomPool::default();
        assert!(pool.draw("heartbleed", "https://github.com/openssl/openssl", 10).is_empty());
    }
}
