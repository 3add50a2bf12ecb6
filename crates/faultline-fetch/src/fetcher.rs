use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use faultline_config::FetchConfig;
use faultline_core::{CommitContent, CommitRef, FileChange, Language};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::FetchError;
use crate::git::GitRunner;
use crate::github::{GithubClient, parse_github_slug};
use crate::history::{CommitMeta, rank_descendants, read_commits, walk_ancestors};
use crate::retry::RetryPolicy;
use crate::workspace::GitWorkspace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRequest {
    pub repository: String,
    pub pivot: String,
    pub ancestors: usize,
    pub descendants: usize,
}

/// A per-commit problem that degraded a window without failing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub commit: Option<String>,
    pub stage: String,
    pub error: String,
}

impl FetchFailure {
    pub fn new(commit: Option<&str>, stage: &str, error: impl ToString) -> Self {
        Self {
            commit: commit.map(str::to_owned),
            stage: stage.to_owned(),
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentLimits {
    pub max_files_per_commit: usize,
    pub max_file_bytes: u64,
}

impl ContentLimits {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_files_per_commit: config.max_files_per_commit,
            max_file_bytes: config.max_file_bytes,
        }
    }

    /// Supported source files of `commit` up to the cap: paths in `focus`
    /// first, then the rest, each group in path order.
    pub fn select_files<'a>(
        &self,
        commit: &'a CommitRef,
        focus: &BTreeSet<String>,
    ) -> Vec<(&'a str, Language)> {
        let (focused, rest): (Vec<_>, Vec<_>) = commit
            .changed_files
            .iter()
            .filter_map(|path| Language::for_path(Path::new(path)).map(|lang| (path.as_str(), lang)))
            .partition(|(path, _)| focus.contains(*path));
        focused
            .into_iter()
            .chain(rest)
            .take(self.max_files_per_commit)
            .collect()
    }
}

/// The pivot commit and its bounded neighborhood in history.
#[async_trait]
pub trait HistoryWindow: Send + Sync {
    fn repository(&self) -> &str;

    fn pivot(&self) -> &CommitRef;

    /// Closest generation first.
    fn ancestors(&self) -> &[CommitRef];

    /// Closest generation first.
    fn descendants(&self) -> &[CommitRef];

    fn failures(&self) -> &[FetchFailure];

    /// Before/after text of the supported source files `commit` touched.
    /// Files in `focus` are loaded ahead of the others.
    async fn content(
        &self,
        commit: &CommitRef,
        focus: &BTreeSet<String>,
    ) -> Result<CommitContent, FetchError>;

    fn commit_count(&self) -> usize {
        1 + self.ancestors().len() + self.descendants().len()
    }

    fn is_partial(&self) -> bool {
        !self.failures().is_empty()
    }
}

#[async_trait]
pub trait WindowFetcher: Send + Sync {
    async fn fetch_window(
        &self,
        request: &WindowRequest,
    ) -> Result<Box<dyn HistoryWindow>, FetchError>;

    /// Commit id of the remote's default branch.
    async fn resolve_head(&self, repository: &str) -> Result<String, FetchError>;
}

/// Fetches windows with blobless, depth-bounded partial clones, one
/// temporary repository per window.
#[derive(Debug, Clone)]
pub struct GitWindowFetcher {
    git: GitRunner,
    github: Option<GithubClient>,
    retry: RetryPolicy,
    limits: ContentLimits,
    content_concurrency: usize,
    scratch_dir: Option<PathBuf>,
}

impl GitWindowFetcher {
    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        Ok(Self {
            git: GitRunner::from_config(config),
            github: Some(GithubClient::from_config(config)?),
            retry: RetryPolicy::from_config(config),
            limits: ContentLimits::from_config(config),
            content_concurrency: config.content_concurrency.max(1),
            scratch_dir: config.scratch_dir.clone(),
        })
    }

    /// Descendants always come from the remote default branch.
    pub fn without_github(mut self) -> Self {
        self.github = None;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn find_descendants(
        &self,
        workspace: &GitWorkspace,
        repository: &str,
        pivot: &str,
        limit: usize,
    ) -> Result<Vec<(String, usize)>, FetchError> {
        if let (Some(github), Some(slug)) = (&self.github, parse_github_slug(repository)) {
            match github
                .descendant_candidates(&self.retry, &slug, pivot, limit)
                .await
            {
                Ok(candidates) => {
                    let ranked = rank_descendants(pivot, &candidates, limit);
                    let ids = ranked.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>();
                    workspace.fetch_commits(&ids, 2).await?;
                    return Ok(ranked);
                }
                Err(err) => {
                    tracing::warn!(
                        repository,
                        error = %err,
                        "GitHub compare failed, falling back to the default branch"
                    );
                }
            }
        }

        let tip = workspace.fetch_default_branch().await?;
        let candidates = workspace.ancestry_path(pivot, &tip).await?;
        Ok(rank_descendants(pivot, &candidates, limit))
    }

    async fn commit_ref(
        &self,
        workspace: &GitWorkspace,
        meta: CommitMeta,
        distance: i64,
    ) -> Result<CommitRef, FetchError> {
        let parent = meta.parents.first().map(String::as_str);
        let changed_files = workspace.changed_files(&meta.id, parent).await?;
        Ok(CommitRef {
            id: meta.id,
            timestamp: meta.timestamp,
            parents: meta.parents,
            changed_files,
            distance,
            author: meta.author,
            summary: meta.summary,
        })
    }
}

#[async_trait]
impl WindowFetcher for GitWindowFetcher {
    async fn fetch_window(
        &self,
        request: &WindowRequest,
    ) -> Result<Box<dyn HistoryWindow>, FetchError> {
        let workspace = GitWorkspace::create(
            self.git.clone(),
            self.retry,
            &request.repository,
            self.scratch_dir.as_deref(),
        )
        .await?;

        // Depth n+2 keeps the parents of the n-th generation, so every
        // ancestor in the window can be diffed against its first parent.
        workspace
            .fetch_commits(&[request.pivot.as_str()], request.ancestors + 2)
            .await?;
        let pivot_id = workspace.rev_parse("FETCH_HEAD").await?;

        let (pivot_meta, ancestor_metas) = walk_ancestors(
            workspace.path().to_path_buf(),
            pivot_id.clone(),
            request.ancestors,
        )
        .await?;

        let mut failures = Vec::new();
        let pivot = match self.commit_ref(&workspace, pivot_meta.clone(), 0).await {
            Ok(pivot) => pivot,
            Err(err) => {
                failures.push(FetchFailure::new(Some(pivot_id.as_str()), "changed_files", &err));
                CommitRef {
                    id: pivot_meta.id,
                    timestamp: pivot_meta.timestamp,
                    parents: pivot_meta.parents,
                    changed_files: Default::default(),
                    distance: 0,
                    author: pivot_meta.author,
                    summary: pivot_meta.summary,
                }
            }
        };

        let mut ancestors = Vec::with_capacity(ancestor_metas.len());
        for (meta, generation) in ancestor_metas {
            let id = meta.id.clone();
            match self
                .commit_ref(&workspace, meta, -(generation as i64))
                .await
            {
                Ok(commit) => ancestors.push(commit),
                Err(err) => failures.push(FetchFailure::new(Some(id.as_str()), "changed_files", err)),
            }
        }

        let mut descendants = Vec::new();
        if request.descendants > 0 {
            match self
                .find_descendants(&workspace, &request.repository, &pivot_id, request.descendants)
                .await
            {
                Ok(ranked) => {
                    let ids = ranked.iter().map(|(id, _)| id.clone()).collect();
                    let metas = read_commits(workspace.path().to_path_buf(), ids).await?;
                    for ((id, generation), meta) in ranked.into_iter().zip(metas) {
                        let meta = match meta {
                            Ok(meta) => meta,
                            Err(err) => {
                                failures.push(FetchFailure::new(Some(id.as_str()), "metadata", err));
                                continue;
                            }
                        };
                        match self.commit_ref(&workspace, meta, generation as i64).await {
                            Ok(commit) => descendants.push(commit),
                            Err(err) => {
                                failures.push(FetchFailure::new(Some(id.as_str()), "changed_files", err))
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        repository = %request.repository,
                        pivot = %pivot_id,
                        error = %err,
                        "descendant discovery failed"
                    );
                    failures.push(FetchFailure::new(None, "descendants", err));
                }
            }
        }

        tracing::info!(
            repository = %request.repository,
            pivot = %pivot.short_id(),
            ancestors = ancestors.len(),
            descendants = descendants.len(),
            failures = failures.len(),
            "fetched history window"
        );

        Ok(Box::new(GitWindow {
            repository: request.repository.clone(),
            workspace,
            pivot,
            ancestors,
            descendants,
            failures,
            limits: self.limits,
            permits: Semaphore::new(self.content_concurrency),
        }))
    }

    async fn resolve_head(&self, repository: &str) -> Result<String, FetchError> {
        let args = ["ls-remote", repository, "HEAD"];
        let stdout = self
            .retry
            .run("ls-remote", || self.git.run_text(None, &args))
            .await?;
        stdout
            .split_whitespace()
            .next()
            .map(str::to_owned)
            .ok_or_else(|| FetchError::RepositoryUnavailable(format!("{repository} has no HEAD")))
    }
}

struct GitWindow {
    repository: String,
    workspace: GitWorkspace,
    pivot: CommitRef,
    ancestors: Vec<CommitRef>,
    descendants: Vec<CommitRef>,
    failures: Vec<FetchFailure>,
    limits: ContentLimits,
    permits: Semaphore,
}

#[async_trait]
impl HistoryWindow for GitWindow {
    fn repository(&self) -> &str {
        &self.repository
    }

    fn pivot(&self) -> &CommitRef {
        &self.pivot
    }

    fn ancestors(&self) -> &[CommitRef] {
        &self.ancestors
    }

    fn descendants(&self) -> &[CommitRef] {
        &self.descendants
    }

    fn failures(&self) -> &[FetchFailure] {
        &self.failures
    }

    async fn content(
        &self,
        commit: &CommitRef,
        focus: &BTreeSet<String>,
    ) -> Result<CommitContent, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|err| FetchError::Protocol(format!("content permits closed: {err}")))?;

        let parent = commit.first_parent();
        let max_bytes = self.limits.max_file_bytes;
        let mut files = Vec::new();
        for (path, language) in self.limits.select_files(commit, focus) {
            let after = self.workspace.read_file(&commit.id, path, max_bytes).await?;
            let before = match parent {
                Some(parent) => self.workspace.read_file(parent, path, max_bytes).await?,
                None => None,
            };
            if after.is_none() && before.is_none() {
                continue;
            }
            files.push(FileChange {
                path: path.to_owned(),
                language: Some(language),
                before: before.unwrap_or_default(),
                after: after.unwrap_or_default(),
            });
        }

        Ok(CommitContent {
            commit_id: commit.id.clone(),
            files,
        })
    }
}
