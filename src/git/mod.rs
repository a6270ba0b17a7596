//! Access to the data we need from git.
//!
//! Git is always invoked as a subprocess and its output parsed; we never
//! read the object database directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::Result;

pub mod args;
pub mod cmd;
pub mod parse;
pub mod pathspec;

pub use args::parse_args;
pub use cmd::GitCmd;
pub use parse::CommitParser;
pub use pathspec::{is_supported_pathspec, PathspecFilter};

const LOG_FORMAT: &str = "--pretty=format:%H%n%h%n%p%n%aN%n%aE%n%ad%n";
const LOG_DIFF_FORMAT: &str = "--pretty=format:%H%n%h%n%p%n%aN%n%aE%n%ad";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub short_hash: String,
    pub is_merge: bool,
    pub author_name: String,
    pub author_email: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub date: DateTime<Utc>,
    pub file_diffs: Vec<FileDiff>,
}

impl Commit {
    /// A human-friendly identifier for error messages.
    pub fn name(&self) -> &str {
        if !self.short_hash.is_empty() {
            &self.short_hash
        } else if !self.hash.is_empty() {
            &self.hash
        } else {
            "unknown"
        }
    }
}

impl fmt::Display for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ hash:{} author:{} <{}> date:{} merge:{} }}",
            self.name(),
            self.author_name,
            self.author_email,
            self.date.format("%b %-d, %Y"),
            self.is_merge,
        )
    }
}

/// A file that was changed in a commit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub lines_added: u64,
    pub lines_removed: u64,
}

impl fmt::Display for FileDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ path:\"{}\" added:{} removed:{} }}",
            self.path, self.lines_added, self.lines_removed,
        )
    }
}

/// Filters passed through to `git log` / `git rev-list`.
#[derive(Clone, Debug, Default)]
pub struct LogFilters {
    pub since: String,
    pub until: String,
    pub authors: Vec<String>,
    pub nauthors: Vec<String>,
}

impl LogFilters {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if !self.since.is_empty() {
            args.push("--since".to_string());
            args.push(self.since.clone());
        }

        if !self.until.is_empty() {
            args.push("--until".to_string());
            args.push(self.until.clone());
        }

        for author in &self.authors {
            args.push("--author".to_string());
            args.push(author.clone());
        }

        if !self.nauthors.is_empty() {
            args.push("--perl-regexp".to_string());
            args.push("--author".to_string());
            args.push(format!("^((?!{}).*)$", self.nauthors.join("|")));
        }

        args
    }
}

fn log_args(
    revs: &[String],
    pathspecs: &[String],
    filters: &LogFilters,
    need_diffs: bool,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "log".to_string(),
        if need_diffs { LOG_DIFF_FORMAT } else { LOG_FORMAT }.to_string(),
        "-z".to_string(),
        "--date=unix".to_string(),
        "--reverse".to_string(),
        "--no-show-signature".to_string(),
    ];
    if need_diffs {
        args.push("--numstat".to_string());
    }

    args.extend(filters.to_args());
    args.extend(revs.iter().cloned());

    if !pathspecs.is_empty() {
        args.push("--".to_string());
        args.extend(pathspecs.iter().cloned());
    }

    args
}

/// Runs `git log` over the given revisions and pathspecs.
pub fn run_log(
    revs: &[String],
    pathspecs: &[String],
    filters: &LogFilters,
    need_diffs: bool,
) -> Result<GitCmd> {
    GitCmd::spawn(&log_args(revs, pathspecs, filters, need_diffs), false)
}

/// Runs `git log --stdin --no-walk`; revisions are piped in by the caller.
/// Pathspecs limit which diffs appear, not which commits.
pub fn run_stdin_log(pathspecs: &[String], need_diffs: bool) -> Result<GitCmd> {
    let mut args: Vec<String> = vec![
        "log".to_string(),
        if need_diffs { LOG_DIFF_FORMAT } else { LOG_FORMAT }.to_string(),
        "-z".to_string(),
        "--date=unix".to_string(),
        "--reverse".to_string(),
        "--no-show-signature".to_string(),
    ];
    if need_diffs {
        args.push("--numstat".to_string());
    }
    args.push("--stdin".to_string());
    args.push("--no-walk".to_string());

    if !pathspecs.is_empty() {
        args.push("--".to_string());
        args.extend(pathspecs.iter().cloned());
    }

    GitCmd::spawn(&args, true)
}

/// Returns an iterator over commits for the given revisions and pathspecs,
/// along with the subprocess handle to `wait()` on when done.
pub fn commits_with_opts(
    revs: &[String],
    pathspecs: &[String],
    filters: &LogFilters,
    populate_diffs: bool,
) -> Result<(CommitParser<cmd::LogTokens<std::process::ChildStdout>>, GitCmd)> {
    let mut subprocess = run_log(revs, pathspecs, filters, populate_diffs)?;
    let commits = CommitParser::new(subprocess.stdout_log_tokens());
    Ok((commits, subprocess))
}

/// Enumerates commit hashes in chronological order.
pub fn rev_list(
    revranges: &[String],
    pathspecs: &[String],
    filters: &LogFilters,
) -> Result<Vec<String>> {
    if revranges.is_empty() {
        return Err(crate::error::GitWhoError::Input(
            "git rev-list requires revision spec".to_string(),
        ));
    }

    let mut args: Vec<String> = vec!["rev-list".to_string(), "--reverse".to_string()];
    args.extend(filters.to_args());
    args.extend(revranges.iter().cloned());
    if !pathspecs.is_empty() {
        args.push("--".to_string());
        args.extend(pathspecs.iter().cloned());
    }

    let mut subprocess = GitCmd::spawn(&args, false)?;

    let mut revs = Vec::new();
    for line in subprocess.stdout_lines() {
        revs.push(line?);
    }

    subprocess.wait()?;
    Ok(revs)
}

/// Discovers the repository root via `git rev-parse --show-toplevel`.
pub fn get_root() -> Result<String> {
    let args = vec!["rev-parse".to_string(), "--show-toplevel".to_string()];
    let mut subprocess = GitCmd::spawn(&args, false)?;

    let mut root = String::new();
    for line in subprocess.stdout_lines() {
        let line = line?;
        if root.is_empty() {
            root = line;
        }
    }

    subprocess.wait()?;
    Ok(root.trim().to_string())
}

/// Returns all paths in the working tree under the given pathspecs.
pub fn working_tree_files(pathspecs: &[String]) -> Result<HashSet<String>> {
    let mut args: Vec<String> =
        vec!["ls-files".to_string(), "--exclude-standard".to_string()];
    args.extend(pathspecs.iter().cloned());

    let mut subprocess = GitCmd::spawn(&args, false)?;

    let mut wtreeset = HashSet::new();
    for line in subprocess.stdout_lines() {
        wtreeset.insert(line?.trim().to_string());
    }

    subprocess.wait()?;
    Ok(wtreeset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_map_to_git_flags() {
        let filters = LogFilters {
            since: "2 weeks ago".to_string(),
            until: String::new(),
            authors: vec!["bob".to_string(), "jim".to_string()],
            nauthors: vec![],
        };
        assert_eq!(
            filters.to_args(),
            vec!["--since", "2 weeks ago", "--author", "bob", "--author", "jim"]
        );
    }

    #[test]
    fn nauthors_become_a_negative_lookahead() {
        let filters = LogFilters {
            nauthors: vec!["bob".to_string(), "jim".to_string()],
            ..Default::default()
        };
        assert_eq!(
            filters.to_args(),
            vec!["--perl-regexp", "--author", "^((?!bob|jim).*)$"]
        );
    }

    #[test]
    fn log_args_place_pathspecs_after_separator() {
        let args = log_args(
            &["HEAD".to_string()],
            &["src/".to_string()],
            &LogFilters::default(),
            true,
        );
        assert!(args.contains(&"--numstat".to_string()));
        let sep = args.iter().position(|a| a == "--").unwrap();
        assert_eq!(&args[sep + 1..], &["src/".to_string()]);
        assert!(args[..sep].contains(&"HEAD".to_string()));
    }
}
