use std::collections::BTreeSet;
use std::path::Path;

use tempfile::TempDir;

use crate::FetchError;
use crate::git::GitRunner;
use crate::retry::RetryPolicy;

const REMOTE: &str = "origin";

/// A throwaway partial clone. The directory lives exactly as long as the
/// value; dropping it (including on task cancellation) removes everything.
#[derive(Debug)]
pub struct GitWorkspace {
    dir: TempDir,
    git: GitRunner,
    retry: RetryPolicy,
}

impl GitWorkspace {
    pub async fn create(
        git: GitRunner,
        retry: RetryPolicy,
        remote_url: &str,
        scratch_dir: Option<&Path>,
    ) -> Result<Self, FetchError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("faultline-");
        let dir = match scratch_dir {
            Some(root) => {
                tokio::fs::create_dir_all(root).await?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        let workspace = Self { dir, git, retry };
        workspace.local(&["init", "--quiet"]).await?;
        workspace
            .local(&["remote", "add", REMOTE, remote_url])
            .await?;
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    async fn local(&self, args: &[&str]) -> Result<Vec<u8>, FetchError> {
        self.git.run(Some(self.path()), args).await
    }

    async fn remote(&self, operation: &str, args: &[&str]) -> Result<Vec<u8>, FetchError> {
        self.retry
            .run(operation, || self.git.run(Some(self.path()), args))
            .await
    }

    /// Blobless fetch of specific commits, `depth` generations deep each.
    pub async fn fetch_commits(&self, revs: &[&str], depth: usize) -> Result<(), FetchError> {
        if revs.is_empty() {
            return Ok(());
        }
        let depth_arg = format!("--depth={}", depth.max(1));
        let mut args = vec![
            "fetch",
            "--quiet",
            "--no-tags",
            "--filter=blob:none",
            depth_arg.as_str(),
            REMOTE,
        ];
        args.extend_from_slice(revs);
        self.remote("fetch commits", &args).await?;
        Ok(())
    }

    /// Blobless fetch of the remote default branch; returns its tip.
    pub async fn fetch_default_branch(&self) -> Result<String, FetchError> {
        self.remote(
            "fetch default branch",
            &["fetch", "--quiet", "--no-tags", "--filter=blob:none", REMOTE, "HEAD"],
        )
        .await?;
        self.rev_parse("FETCH_HEAD").await
    }

    pub async fn rev_parse(&self, rev: &str) -> Result<String, FetchError> {
        let spec = format!("{rev}^{{commit}}");
        let stdout = self.local(&["rev-parse", "--verify", &spec]).await?;
        let id = String::from_utf8_lossy(&stdout).trim().to_owned();
        if id.is_empty() {
            return Err(FetchError::Protocol(format!("{rev} did not resolve to a commit")));
        }
        Ok(id)
    }

    /// Paths whose tree entries differ between `parent` and `commit`; a root
    /// commit is compared against the empty tree.
    pub async fn changed_files(
        &self,
        commit: &str,
        parent: Option<&str>,
    ) -> Result<BTreeSet<String>, FetchError> {
        let mut args = vec!["diff-tree", "--no-commit-id", "--name-only", "-r", "-z"];
        match parent {
            Some(parent) => args.extend([parent, commit]),
            None => args.extend(["--root", commit]),
        }
        let stdout = self.local(&args).await?;
        Ok(split_nul(&stdout))
    }

    /// Commits on the ancestry path from `pivot` (exclusive) to `tip`, oldest
    /// first, each with its parent ids.
    pub async fn ancestry_path(
        &self,
        pivot: &str,
        tip: &str,
    ) -> Result<Vec<(String, Vec<String>)>, FetchError> {
        let range = format!("{pivot}..{tip}");
        let stdout = self
            .local(&["rev-list", "--ancestry-path", "--reverse", "--parents", &range])
            .await?;
        Ok(parse_parent_lines(&String::from_utf8_lossy(&stdout)))
    }

    /// Text of `path` at `rev`, or `None` when the path is absent, binary, or
    /// larger than `max_bytes`. Missing blobs are pulled from the promisor
    /// remote on demand.
    pub async fn read_file(
        &self,
        rev: &str,
        path: &str,
        max_bytes: u64,
    ) -> Result<Option<String>, FetchError> {
        let listing = self.local(&["ls-tree", rev, "--", path]).await?;
        let Some(blob_id) = blob_id_from_listing(&String::from_utf8_lossy(&listing)) else {
            return Ok(None);
        };

        let bytes = self
            .remote("read blob", &["cat-file", "blob", &blob_id])
            .await?;
        if bytes.len() as u64 > max_bytes {
            tracing::debug!(rev, path, size = bytes.len(), "skipping oversized file");
            return Ok(None);
        }
        if bytes.contains(&0) {
            tracing::debug!(rev, path, "skipping binary file");
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

fn split_nul(stdout: &[u8]) -> BTreeSet<String> {
    stdout
        .split(|byte| *byte == 0)
        .filter(|entry| !entry.is_empty())
        .map(|entry| String::from_utf8_lossy(entry).into_owned())
        .collect()
}

pub(crate) fn parse_parent_lines(stdout: &str) -> Vec<(String, Vec<String>)> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut ids = line.split_whitespace().map(str::to_owned);
            let id = ids.next()?;
            Some((id, ids.collect()))
        })
        .collect()
}

/// `<mode> SP <type> SP <object> TAB <path>`; only blobs count as files.
fn blob_id_from_listing(listing: &str) -> Option<String> {
    let line = listing.lines().next()?;
    let (meta, _path) = line.split_once('\t')?;
    let mut fields = meta.split_whitespace();
    let _mode = fields.next()?;
    let kind = fields.next()?;
    let id = fields.next()?;
    (kind == "blob").then(|| id.to_owned())
}
