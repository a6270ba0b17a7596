//! A file tree of edits to the repo.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};

use crate::error::{GitWhoError, Result};
use crate::tally::{rank, Combine, FinalTally, TalliesByPath, Tally, TallyMode};

#[derive(Debug, Default)]
pub struct TreeNode {
    /// Winning tally for this node, set by `rank`.
    pub tally: Option<FinalTally>,
    pub children: BTreeMap<String, TreeNode>,
    /// Whether any descendant leaf is in the git working tree.
    pub in_work_tree: bool,
    tallies: HashMap<String, Tally>,
}

impl TreeNode {
    fn new(in_work_tree: bool) -> Self {
        TreeNode {
            in_work_tree,
            ..Default::default()
        }
    }

    fn insert(&mut self, path: &str, key: &str, tally: Tally, in_work_tree: bool) {
        let Some((segment, rest)) = split_path(path) else {
            // Leaf
            self.tallies.insert(key.to_string(), tally);
            return;
        };

        let child = self
            .children
            .entry(segment.to_string())
            .or_insert_with(|| TreeNode::new(in_work_tree));
        child.in_work_tree = child.in_work_tree || in_work_tree;
        child.insert(rest, key, tally, in_work_tree);
    }

    /// Recursively sums child tallies into each node and picks the winning
    /// author per node for the given mode.
    pub fn rank(&mut self, mode: TallyMode) {
        for child in self.children.values_mut() {
            child.rank(mode);

            for (key, child_tally) in &child.tallies {
                let merged = match self.tallies.remove(key) {
                    Some(existing) => existing.combine(child_tally.clone()),
                    None => child_tally.clone(),
                };
                self.tallies.insert(key.clone(), merged);
            }
        }

        self.tally = rank(self.tallies.clone(), mode).into_iter().next();
    }
}

fn split_path(path: &str) -> Option<(&str, &str)> {
    if path.is_empty() {
        return None;
    }
    match path.split_once('/') {
        Some((dir, rest)) => Some((dir, rest)),
        None => Some((path, "")),
    }
}

/// Best-effort `to` relative to `from`; `None` when `to` is not under
/// `from` (paths outside the working directory are skipped).
fn rel_path(from: &Path, to: &Path) -> Option<PathBuf> {
    let mut from_parts = from.components();
    let mut rest = to.components();

    loop {
        let mut probe = rest.clone();
        match (from_parts.next(), probe.next()) {
            (None, _) => {
                let rel: PathBuf = rest.collect();
                return Some(rel);
            }
            (Some(a), Some(b)) if a == b => {
                rest = probe;
            }
            _ => return None,
        }
    }
}

/// Builds a tree of nodes mirroring the working directory with a tally for
/// each node. Paths are made relative to the current directory; anything
/// outside it is skipped.
pub fn tally_commits_tree_from_paths(
    tallies_by_path: TalliesByPath,
    worktree_paths: &std::collections::HashSet<String>,
    git_root_path: &str,
) -> Result<TreeNode> {
    let mut root = TreeNode::new(true);

    let wd = std::env::current_dir()?;

    for (key, path_tallies) in tallies_by_path.0 {
        for (path, tally) in path_tallies {
            let rel = if git_root_path.is_empty() {
                PathBuf::from(&path)
            } else {
                let abs = Path::new(git_root_path).join(&path);
                match rel_path(&wd, &abs) {
                    Some(rel) => rel,
                    None => continue, // outside the working dir
                }
            };

            if rel
                .components()
                .any(|c| matches!(c, Component::ParentDir))
            {
                continue;
            }

            let rel = rel.to_string_lossy().into_owned();
            let in_work_tree = worktree_paths.contains(&rel);
            root.insert(&rel, &key, tally, in_work_tree);
        }
    }

    if root.children.is_empty() {
        return Err(GitWhoError::EmptyTree);
    }

    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{Commit, FileDiff};
    use crate::tally::{tally_commits_by_path, AuthorKey, TallyOpts};
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;

    fn commit(hash: &str, name: &str, day: u32, diffs: Vec<FileDiff>) -> crate::error::Result<Commit> {
        Ok(Commit {
            hash: hash.to_string(),
            short_hash: hash.to_string(),
            author_name: name.to_string(),
            author_email: format!("{name}@mail.com"),
            date: Utc.with_ymd_and_hms(2024, 4, day, 12, 0, 0).unwrap(),
            file_diffs: diffs,
            ..Default::default()
        })
    }

    fn diff(path: &str, added: u64, removed: u64) -> FileDiff {
        FileDiff {
            path: path.to_string(),
            lines_added: added,
            lines_removed: removed,
        }
    }

    #[test]
    fn tree_sums_children_and_picks_winners() {
        let commits = vec![
            commit(
                "c1",
                "bob",
                1,
                vec![diff("foo/bim.txt", 4, 0), diff("foo/bar.txt", 8, 2)],
            ),
            commit("c2", "jim", 2, vec![diff("foo/bim.txt", 3, 1)]),
            commit("c3", "bob", 3, vec![diff("foo/bim.txt", 23, 0)]),
        ];

        let opts = TallyOpts {
            mode: TallyMode::Commits,
            key: AuthorKey::Name,
            count_merges: false,
        };
        let by_path = tally_commits_by_path(commits.into_iter(), &opts).unwrap();

        let worktree: HashSet<String> =
            ["foo/bim.txt".to_string(), "foo/bar.txt".to_string()].into();
        let mut root = tally_commits_tree_from_paths(by_path, &worktree, "").unwrap();
        root.rank(TallyMode::Commits);

        let root_tally = root.tally.as_ref().unwrap();
        assert_eq!(root_tally.author_name, "bob");
        assert_eq!(root_tally.commits, 2);
        assert_eq!(root_tally.lines_added, 35);
        assert_eq!(root_tally.lines_removed, 2);
        assert_eq!(root_tally.file_count, 2);

        let foo = root.children.get("foo").unwrap();
        assert!(foo.in_work_tree);
        let bim = foo.children.get("bim.txt").unwrap();
        let bim_tally = bim.tally.as_ref().unwrap();
        assert_eq!(bim_tally.author_name, "bob");
        assert_eq!(bim_tally.commits, 2);
        assert_eq!(bim_tally.lines_added, 27);
        assert_eq!(bim_tally.lines_removed, 0);
        assert_eq!(bim_tally.file_count, 1);
    }

    #[test]
    fn nodes_outside_worktree_are_marked() {
        let commits = vec![commit("c1", "bob", 1, vec![diff("gone/old.txt", 1, 0)])];
        let opts = TallyOpts {
            mode: TallyMode::Commits,
            key: AuthorKey::Name,
            count_merges: false,
        };
        let by_path = tally_commits_by_path(commits.into_iter(), &opts).unwrap();

        let mut root =
            tally_commits_tree_from_paths(by_path, &HashSet::new(), "").unwrap();
        root.rank(TallyMode::Commits);

        let gone = root.children.get("gone").unwrap();
        assert!(!gone.in_work_tree);
        assert!(!gone.children.get("old.txt").unwrap().in_work_tree);
    }

    #[test]
    fn empty_input_is_an_error() {
        let result = tally_commits_tree_from_paths(
            TalliesByPath::default(),
            &HashSet::new(),
            "",
        );
        assert!(matches!(result, Err(GitWhoError::EmptyTree)));
    }

    #[test]
    fn rel_path_strips_common_prefix() {
        assert_eq!(
            rel_path(Path::new("/repo"), Path::new("/repo/src/main.rs")),
            Some(PathBuf::from("src/main.rs"))
        );
        assert_eq!(rel_path(Path::new("/repo/sub"), Path::new("/repo/other.txt")), None);
    }
}
