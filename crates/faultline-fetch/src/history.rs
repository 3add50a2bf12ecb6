//! Commit-graph reads over a fetched partial clone.
//!
//! Distances are generational: the number of parent hops along any path,
//! so a merge's parents are all one generation away from it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;

use crate::FetchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommitMeta {
    pub id: String,
    pub parents: Vec<String>,
    pub timestamp: i64,
    pub author: String,
    pub summary: String,
}

pub(crate) fn read_commit(repo: &gix::Repository, id: &str) -> Result<CommitMeta, String> {
    let object_id = gix::ObjectId::from_hex(id.as_bytes())
        .map_err(|err| format!("invalid commit id {id}: {err}"))?;
    let commit = repo
        .find_commit(object_id)
        .map_err(|err| format!("failed to read commit {id}: {err}"))?;

    let parents = commit
        .parent_ids()
        .map(|parent| parent.detach().to_string())
        .collect();
    let timestamp = commit.time().map(|time| time.seconds).unwrap_or(0);
    let author = commit
        .author()
        .map(|signature| signature.name.to_string())
        .unwrap_or_default();
    let summary = String::from_utf8_lossy(commit.message_raw_sloppy())
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_owned();

    Ok(CommitMeta {
        id: id.to_owned(),
        parents,
        timestamp,
        author,
        summary,
    })
}

/// Breadth-first walk over every parent of `pivot`, closest generation
/// first, stopping after `limit` commits. Parents that `lookup` cannot
/// produce (the shallow boundary) end their branch of the walk.
pub(crate) fn ancestors_by_generation(
    pivot: &CommitMeta,
    limit: usize,
    mut lookup: impl FnMut(&str) -> Option<CommitMeta>,
) -> Vec<(CommitMeta, usize)> {
    let mut found = Vec::new();
    let mut visited = HashSet::from([pivot.id.clone()]);
    let mut queue = VecDeque::from([(pivot.parents.clone(), 1usize)]);

    while let Some((parents, generation)) = queue.pop_front() {
        for parent in parents {
            if found.len() >= limit {
                return found;
            }
            if !visited.insert(parent.clone()) {
                continue;
            }
            let Some(meta) = lookup(&parent) else {
                continue;
            };
            queue.push_back((meta.parents.clone(), generation + 1));
            found.push((meta, generation));
        }
    }

    found
}

/// Keeps the candidates that descend from `pivot` through candidate commits
/// and ranks them by generation, closest first. Input order breaks ties, so
/// an oldest-first candidate list keeps history order within a generation.
pub(crate) fn rank_descendants(
    pivot: &str,
    candidates: &[(String, Vec<String>)],
    limit: usize,
) -> Vec<(String, usize)> {
    let mut generation = HashMap::<&str, usize>::from([(pivot, 0)]);

    // Relaxation to a fixpoint; each pass settles at least one more level.
    for _ in 0..=candidates.len() {
        let mut changed = false;
        for (id, parents) in candidates {
            let Some(closest) = parents
                .iter()
                .filter_map(|parent| generation.get(parent.as_str()).copied())
                .min()
            else {
                continue;
            };
            let next = closest + 1;
            if id != pivot && generation.get(id.as_str()).is_none_or(|current| next < *current) {
                generation.insert(id.as_str(), next);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut ranked = candidates
        .iter()
        .filter(|(id, _)| id != pivot)
        .filter_map(|(id, _)| generation.get(id.as_str()).map(|depth| (id.clone(), *depth)))
        .collect::<Vec<_>>();
    ranked.sort_by_key(|(_, depth)| *depth);
    ranked.truncate(limit);
    ranked
}

pub(crate) async fn walk_ancestors(
    repo_path: PathBuf,
    pivot: String,
    limit: usize,
) -> Result<(CommitMeta, Vec<(CommitMeta, usize)>), FetchError> {
    tokio::task::spawn_blocking(move || {
        let repo = open(&repo_path)?;
        let pivot = read_commit(&repo, &pivot).map_err(FetchError::Protocol)?;
        let ancestors = ancestors_by_generation(&pivot, limit, |id| read_commit(&repo, id).ok());
        Ok((pivot, ancestors))
    })
    .await
    .map_err(|err| FetchError::Protocol(format!("history walk task failed: {err}")))?
}

/// Metadata for each id, in order; unreadable commits come back as errors
/// so the caller can record them individually.
pub(crate) async fn read_commits(
    repo_path: PathBuf,
    ids: Vec<String>,
) -> Result<Vec<Result<CommitMeta, String>>, FetchError> {
    tokio::task::spawn_blocking(move || {
        let repo = open(&repo_path)?;
        Ok(ids.iter().map(|id| read_commit(&repo, id)).collect())
    })
    .await
    .map_err(|err| FetchError::Protocol(format!("commit read task failed: {err}")))?
}

fn open(repo_path: &std::path::Path) -> Result<gix::Repository, FetchError> {
    gix::open(repo_path).map_err(|err| {
        FetchError::Protocol(format!(
            "failed to open fetched repository {}: {err}",
            repo_path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str, parents: &[&str]) -> CommitMeta {
        CommitMeta {
            id: id.to_owned(),
            parents: parents.iter().map(|parent| (*parent).to_owned()).collect(),
            timestamp: 0,
            author: String::new(),
            summary: String::new(),
        }
    }

    fn store(commits: &[CommitMeta]) -> HashMap<String, CommitMeta> {
        commits
            .iter()
            .map(|commit| (commit.id.clone(), commit.clone()))
            .collect()
    }

    fn ids(found: &[(CommitMeta, usize)]) -> Vec<(&str, usize)> {
        found
            .iter()
            .map(|(commit, depth)| (commit.id.as_str(), *depth))
            .collect()
    }

    #[test]
    fn merge_parents_share_a_generation() {
        //   a - b - m - p
        //    \     /
        //     c ---
        let commits = store(&[
            meta("a", &[]),
            meta("b", &["a"]),
            meta("c", &["a"]),
            meta("m", &["b", "c"]),
        ]);
        let pivot = meta("p", &["m"]);

        let found = ancestors_by_generation(&pivot, 10, |id| commits.get(id).cloned());
        assert_eq!(ids(&found), vec![("m", 1), ("b", 2), ("c", 2), ("a", 3)]);
    }

    #[test]
    fn ancestor_walk_stops_at_limit_and_shallow_boundary() {
        let commits = store(&[meta("c1", &["c0"]), meta("c2", &["c1"]), meta("c3", &["c2"])]);
        let pivot = meta("c4", &["c3"]);

        let capped = ancestors_by_generation(&pivot, 2, |id| commits.get(id).cloned());
        assert_eq!(ids(&capped), vec![("c3", 1), ("c2", 2)]);

        let bounded = ancestors_by_generation(&pivot, 10, |id| commits.get(id).cloned());
        assert_eq!(ids(&bounded), vec![("c3", 1), ("c2", 2), ("c1", 3)]);
    }

    #[test]
    fn descendants_exclude_commits_merged_from_older_branches() {
        // side branches off before the pivot and is merged after it.
        let candidates = vec![
            ("side".to_owned(), vec!["base".to_owned()]),
            ("d1".to_owned(), vec!["pivot".to_owned()]),
            ("merge".to_owned(), vec!["d1".to_owned(), "side".to_owned()]),
            ("d3".to_owned(), vec!["merge".to_owned()]),
        ];

        let ranked = rank_descendants("pivot", &candidates, 10);
        assert_eq!(
            ranked,
            vec![
                ("d1".to_owned(), 1),
                ("merge".to_owned(), 2),
                ("d3".to_owned(), 3)
            ]
        );
        assert_eq!(rank_descendants("pivot", &candidates, 2).len(), 2);
    }

    #[test]
    fn descendant_ranking_is_order_independent() {
        let candidates = vec![
            ("d2".to_owned(), vec!["d1".to_owned()]),
            ("d1".to_owned(), vec!["pivot".to_owned()]),
        ];
        let ranked = rank_descendants("pivot", &candidates, 5);
        assert_eq!(ranked, vec![("d1".to_owned(), 1), ("d2".to_owned(), 2)]);
        assert!(rank_descendants("pivot", &[], 5).is_empty());
    }
}
