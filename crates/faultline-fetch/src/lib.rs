//! Surgical history windows: the pivot commit, its closest ancestors and
//! descendants, and lazily loaded file content, fetched from a remote
//! without cloning it.

mod error;
mod fetcher;
mod git;
mod github;
mod history;
mod retry;
mod workspace;

pub use error::{FetchError, classify_git_failure, classify_http_status};
pub use fetcher::{
    ContentLimits, FetchFailure, GitWindowFetcher, HistoryWindow, WindowFetcher, WindowRequest,
};
pub use git::GitRunner;
pub use github::{CompareCommit, ComparePage, GithubClient, GithubSlug, ParentRef, parse_github_slug};
pub use retry::RetryPolicy;
pub use workspace::GitWorkspace;
