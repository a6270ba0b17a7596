//! Summations over commits.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::debug;

use crate::error::{GitWhoError, Result};
use crate::git::Commit;

pub mod bucket;
pub mod tree;

pub use bucket::{calc_resolution, Resolution, TimeBucket, TimeSeries};
pub use tree::TreeNode;

/// Commits that introduce no diff (e.g. a merge with an empty first-parent
/// diff) are tallied under this pathname, which is excluded from file
/// counts.
pub const NO_DIFF_PATHNAME: &str = ".git-author-no-diff-commits";

/// Whether authors are ranked by commits, lines, files, or modification
/// time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TallyMode {
    Commits,
    Lines,
    Files,
    LastModified,
    FirstModified,
}

/// Which commit field identifies an author.
#[derive(Clone, Copy, Debug)]
pub enum AuthorKey {
    Name,
    Email,
}

impl AuthorKey {
    pub fn of(&self, commit: &Commit) -> String {
        match self {
            AuthorKey::Name => commit.author_name.clone(),
            AuthorKey::Email => commit.author_email.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TallyOpts {
    pub mode: TallyMode,
    pub key: AuthorKey,
    pub count_merges: bool,
}

impl TallyOpts {
    /// Whether this mode needs numstat data from git log.
    pub fn is_diff_mode(&self) -> bool {
        matches!(self.mode, TallyMode::Files | TallyMode::Lines)
    }
}

/// Values that can be merged pairwise in any order.
pub trait Combine {
    fn combine(self, other: Self) -> Self;
}

/// Running metrics for a single author.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tally {
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) commitset: HashSet<String>,
    pub(crate) added: u64,
    pub(crate) removed: u64,
    pub(crate) fileset: HashSet<String>,
    pub(crate) first_commit: Option<DateTime<Utc>>,
    pub(crate) last_commit: Option<DateTime<Utc>>,
    // Counts tallies when we don't need to disambiguate commits or files.
    pub(crate) num_tallied: usize,
}

fn or(a: String, b: String) -> String {
    if a.is_empty() {
        b
    } else {
        a
    }
}

fn min_time(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_time(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn union(mut a: HashSet<String>, b: HashSet<String>) -> HashSet<String> {
    if a.is_empty() {
        return b;
    }
    a.extend(b);
    a
}

impl Combine for Tally {
    fn combine(self, other: Tally) -> Tally {
        Tally {
            name: or(self.name, other.name),
            email: or(self.email, other.email),
            commitset: union(self.commitset, other.commitset),
            added: self.added + other.added,
            removed: self.removed + other.removed,
            fileset: union(self.fileset, other.fileset),
            first_commit: min_time(self.first_commit, other.first_commit),
            last_commit: max_time(self.last_commit, other.last_commit),
            num_tallied: self.num_tallied + other.num_tallied,
        }
    }
}

impl Tally {
    fn observe(&mut self, commit: &Commit) {
        if self.name.is_empty() {
            self.name = commit.author_name.clone();
        }
        if self.email.is_empty() {
            self.email = commit.author_email.clone();
        }
        self.first_commit = min_time(self.first_commit, Some(commit.date));
        self.last_commit = max_time(self.last_commit, Some(commit.date));
    }

    /// Finalizes the tally, losing the intermediate sets.
    ///
    /// Panics when both name and email are empty; the parser drops such
    /// commits before they can reach a tally.
    pub fn finalize(self) -> FinalTally {
        let commits = if self.commitset.is_empty() {
            self.num_tallied
        } else {
            self.commitset.len()
        };

        let files = if self.fileset.is_empty() {
            self.num_tallied
        } else {
            self.fileset.len()
        };

        if self.name.is_empty() && self.email.is_empty() {
            panic!("tally finalized but has no name and no email");
        }

        FinalTally {
            author_name: self.name,
            author_email: self.email,
            commits,
            lines_added: self.added,
            lines_removed: self.removed,
            file_count: files,
            first_commit_time: self.first_commit.unwrap_or(DateTime::UNIX_EPOCH),
            last_commit_time: self.last_commit.unwrap_or(DateTime::UNIX_EPOCH),
        }
    }
}

/// A finalized tally. Intermediate information is gone, so finals cannot
/// be combined with each other.
#[derive(Clone, Debug, PartialEq)]
pub struct FinalTally {
    pub author_name: String,
    pub author_email: String,
    pub commits: usize,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub file_count: usize,
    pub first_commit_time: DateTime<Utc>,
    pub last_commit_time: DateTime<Utc>,
}

impl FinalTally {
    fn sort_key(&self, mode: TallyMode) -> i64 {
        match mode {
            TallyMode::Commits => self.commits as i64,
            TallyMode::Files => self.file_count as i64,
            TallyMode::Lines => (self.lines_added + self.lines_removed) as i64,
            TallyMode::FirstModified => -self.first_commit_time.timestamp(),
            TallyMode::LastModified => self.last_commit_time.timestamp(),
        }
    }

    /// Orders by the mode's metric, breaking ties with last commit time.
    pub fn compare(&self, other: &FinalTally, mode: TallyMode) -> std::cmp::Ordering {
        self.sort_key(mode)
            .cmp(&other.sort_key(mode))
            .then(self.last_commit_time.cmp(&other.last_commit_time))
    }
}

/// author -> path -> tally
#[derive(Clone, Debug, Default)]
pub struct TalliesByPath(pub HashMap<String, HashMap<String, Tally>>);

impl Combine for TalliesByPath {
    fn combine(self, other: TalliesByPath) -> TalliesByPath {
        let TalliesByPath(mut merged) = other;

        for (key, path_tallies) in self.0 {
            let into = merged.entry(key).or_default();
            for (path, tally) in path_tallies {
                let combined = match into.remove(&path) {
                    Some(existing) => {
                        let mut t = tally.combine(existing);
                        t.num_tallied = t.num_tallied.min(1); // same path
                        t
                    }
                    None => tally,
                };
                into.insert(path, combined);
            }
        }

        TalliesByPath(merged)
    }
}

impl TalliesByPath {
    /// Reduces by-path tallies to a single tally per author.
    pub fn reduce(self) -> HashMap<String, Tally> {
        let mut tallies = HashMap::new();

        for (key, path_tallies) in self.0 {
            let mut running = Tally::default();
            for (_, tally) in path_tallies {
                running = running.combine(tally);
            }

            if !running.commitset.is_empty() {
                tallies.insert(key, running);
            }
        }

        tallies
    }
}

/// Tallies commits per author. Diff-less modes only need the commit
/// headers; diff modes delegate to the by-path kernel and reduce.
pub fn tally_commits(
    commits: impl Iterator<Item = Result<Commit>>,
    opts: &TallyOpts,
) -> Result<HashMap<String, Tally>> {
    let start = Instant::now();

    let tallies = if !opts.is_diff_mode() {
        let mut tallies: HashMap<String, Tally> = HashMap::new();

        for commit in commits {
            let commit = commit
                .map_err(|e| GitWhoError::Parse(format!("error iterating commits: {e}")))?;

            if commit.is_merge && !opts.count_merges {
                continue;
            }

            let tally = tallies.entry(opts.key.of(&commit)).or_default();
            tally.observe(&commit);
            tally.num_tallied += 1;
        }

        tallies
    } else {
        tally_commits_by_path(commits, opts)?.reduce()
    };

    debug!(duration_ms = start.elapsed().as_millis() as u64, "tallied commits");
    Ok(tallies)
}

/// Tallies metrics per author per path.
pub fn tally_commits_by_path(
    commits: impl Iterator<Item = Result<Commit>>,
    opts: &TallyOpts,
) -> Result<TalliesByPath> {
    let mut tallies = TalliesByPath::default();

    for commit in commits {
        let commit = commit
            .map_err(|e| GitWhoError::Parse(format!("error iterating commits: {e}")))?;

        if commit.is_merge && !opts.count_merges {
            continue;
        }

        let path_tallies = tallies.0.entry(opts.key.of(&commit)).or_default();

        if commit.file_diffs.is_empty() {
            // Still count commits that introduce no diff; they go under a
            // sentinel pathname that never counts toward files changed.
            let tally = path_tallies.entry(NO_DIFF_PATHNAME.to_string()).or_default();
            tally.observe(&commit);
            tally.commitset.insert(commit.short_hash.clone());
        } else {
            for diff in &commit.file_diffs {
                let tally = path_tallies.entry(diff.path.clone()).or_default();
                tally.observe(&commit);
                tally.commitset.insert(commit.short_hash.clone());

                if !commit.is_merge {
                    // Only non-merge commits contribute to files and lines.
                    tally.num_tallied = 1;
                    tally.added += diff.lines_added;
                    tally.removed += diff.lines_removed;
                }
            }
        }
    }

    Ok(tallies)
}

/// Sorts tallies into a ranking for the given mode.
pub fn rank(tallies: HashMap<String, Tally>, mode: TallyMode) -> Vec<FinalTally> {
    let mut finals: Vec<FinalTally> = tallies.into_values().map(Tally::finalize).collect();
    finals.sort_by(|a, b| b.compare(a, mode));
    finals
}
