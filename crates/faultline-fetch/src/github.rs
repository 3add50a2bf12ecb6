use std::time::Duration;

use faultline_config::FetchConfig;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::FetchError;
use crate::error::classify_http_status;
use crate::history::rank_descendants;
use crate::retry::RetryPolicy;

const USER_AGENT: &str = concat!("faultline/", env!("CARGO_PKG_VERSION"));
const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";
const COMPARE_PAGE_SIZE: usize = 100;
const MAX_COMPARE_PAGES: usize = 10;
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubSlug {
    pub owner: String,
    pub repo: String,
}

/// Recognizes `https://github.com/o/r(.git)`, `git@github.com:o/r.git`,
/// `ssh://git@github.com/o/r` and bare `github.com/o/r`.
pub fn parse_github_slug(url: &str) -> Option<GithubSlug> {
    let trimmed = url.trim();
    let rest = ["https://", "http://", "ssh://", "git://"]
        .iter()
        .find_map(|scheme| trimmed.strip_prefix(scheme))
        .unwrap_or(trimmed);
    let rest = rest.strip_prefix("git@").unwrap_or(rest);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    let path = rest
        .strip_prefix("github.com/")
        .or_else(|| rest.strip_prefix("github.com:"))?;

    let mut segments = path.trim_end_matches('/').split('/');
    let owner = segments.next()?.trim();
    let repo = segments.next()?.trim();
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if owner.is_empty() || repo.is_empty() || segments.next().is_some() {
        return None;
    }

    Some(GithubSlug {
        owner: owner.to_owned(),
        repo: repo.to_owned(),
    })
}

#[derive(Debug, Clone, Deserialize)]
struct RepositoryInfo {
    default_branch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComparePage {
    pub status: String,
    #[serde(default)]
    pub total_commits: usize,
    #[serde(default)]
    pub commits: Vec<CompareCommit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompareCommit {
    pub sha: String,
    #[serde(default)]
    pub parents: Vec<ParentRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParentRef {
    pub sha: String,
}

impl CompareCommit {
    fn into_candidate(self) -> (String, Vec<String>) {
        (
            self.sha,
            self.parents.into_iter().map(|parent| parent.sha).collect(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct GithubClient {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_owned(),
            token,
        })
    }

    /// Reads the token from the environment variable the config names;
    /// unauthenticated access is allowed but heavily rate limited.
    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        let token = read_env_non_empty(&config.github_token_env);
        if token.is_none() {
            tracing::debug!(
                env = %config.github_token_env,
                "no GitHub token configured, using anonymous API access"
            );
        }
        Self::new(config.github_api_base.clone(), token)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let mut request = self
            .client
            .get(format!("{}{path}", self.api_base))
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let remaining = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_status(
                status.as_u16(),
                remaining.as_deref(),
                first_line(&body),
            ));
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn default_branch(&self, slug: &GithubSlug) -> Result<String, FetchError> {
        let info: RepositoryInfo = self
            .get_json(&format!("/repos/{}/{}", slug.owner, slug.repo), &[])
            .await?;
        Ok(info.default_branch)
    }

    pub async fn compare_page(
        &self,
        slug: &GithubSlug,
        base: &str,
        head: &str,
        page: usize,
    ) -> Result<ComparePage, FetchError> {
        self.get_json(
            &format!("/repos/{}/{}/compare/{base}...{head}", slug.owner, slug.repo),
            &[
                ("per_page", COMPARE_PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ],
        )
        .await
    }

    /// Commits between `pivot` and the default branch, oldest first with
    /// their parents, paging until `limit` of them are known to descend from
    /// the pivot or the comparison runs out.
    pub async fn descendant_candidates(
        &self,
        retry: &RetryPolicy,
        slug: &GithubSlug,
        pivot: &str,
        limit: usize,
    ) -> Result<Vec<(String, Vec<String>)>, FetchError> {
        let branch = retry
            .run("github repository", || self.default_branch(slug))
            .await?;

        let mut candidates = Vec::new();
        for page in 1..=MAX_COMPARE_PAGES {
            let compare = retry
                .run("github compare", || self.compare_page(slug, pivot, &branch, page))
                .await?;
            if matches!(compare.status.as_str(), "behind" | "identical") {
                break;
            }

            let received = compare.commits.len();
            candidates.extend(compare.commits.into_iter().map(CompareCommit::into_candidate));
            if received < COMPARE_PAGE_SIZE
                || candidates.len() >= compare.total_commits
                || rank_descendants(pivot, &candidates, limit).len() >= limit
            {
                break;
            }
        }

        tracing::debug!(
            owner = %slug.owner,
            repo = %slug.repo,
            branch = %branch,
            candidates = candidates.len(),
            "compared pivot against default branch"
        );
        Ok(candidates)
    }
}

fn read_env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn first_line(body: &str) -> &str {
    body.lines().next().unwrap_or_default().trim()
}
