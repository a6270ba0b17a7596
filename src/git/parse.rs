//! Turns the token stream from `git log` into a stream of commits.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{GitWhoError, Result};
use crate::git::{Commit, FileDiff};

/// Returns true for a full-length git revision hash, optionally prefixed
/// with "^".
pub fn is_rev(s: &str) -> bool {
    (s.len() == 40 || s.len() == 41)
        && s.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f' | '^'))
}

fn parse_lines_changed(s: &str, line: &str) -> Result<u64> {
    s.parse::<u64>().map_err(|e| {
        GitWhoError::Parse(format!("could not parse {s} as int on line \"{line}\": {e}"))
    })
}

/// Streaming parser over `git log` output.
///
/// The expected record shape is six header lines (hash, short hash, parent
/// list, author name, author email, unix timestamp) followed by numstat
/// lines until a blank line or the next hash. The parser owns all of its
/// state: the commit under construction, a pending diff waiting for its
/// path, the per-commit line counter, and the wall clock captured at
/// construction (used to drop future-dated commits).
pub struct CommitParser<I> {
    tokens: I,
    commit: Commit,
    diff: Option<FileDiff>,
    lines_this_commit: usize,
    now: DateTime<Utc>,
    done: bool,
}

impl<I> CommitParser<I>
where
    I: Iterator<Item = std::io::Result<String>>,
{
    pub fn new(tokens: I) -> Self {
        CommitParser {
            tokens,
            commit: Commit::default(),
            diff: None,
            lines_this_commit: 0,
            now: Utc::now(),
            done: false,
        }
    }

    fn allow(&self, commit: &Commit) -> bool {
        if commit.author_name.is_empty() && commit.author_email.is_empty() {
            debug!(commit = commit.name(), "skipping commit with no author");
            return false;
        }

        if commit.date > self.now {
            debug!(commit = commit.name(), "skipping commit with date in the future");
            return false;
        }

        true
    }

    /// Finish the current commit and reset the per-commit state. Returns the
    /// commit if it passes the drop rules.
    fn finish_commit(&mut self) -> Option<Commit> {
        let commit = std::mem::take(&mut self.commit);
        self.diff = None;
        self.lines_this_commit = 0;

        if self.allow(&commit) {
            Some(commit)
        } else {
            None
        }
    }

    fn consume_line(&mut self, line: &str) -> Result<()> {
        match self.lines_this_commit {
            0 => self.commit.hash = line.to_string(),
            1 => self.commit.short_hash = line.to_string(),
            2 => self.commit.is_merge = line.split(' ').filter(|p| !p.is_empty()).count() > 1,
            3 => self.commit.author_name = line.to_string(),
            4 => self.commit.author_email = line.to_string(),
            5 => {
                let secs: i64 = line.parse().map_err(|e| {
                    GitWhoError::Parse(format!(
                        "error parsing date from commit {}: {e}",
                        self.commit.name()
                    ))
                })?;
                self.commit.date = DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                    GitWhoError::Parse(format!(
                        "timestamp out of range for commit {}",
                        self.commit.name()
                    ))
                })?;
            }
            _ => self.consume_diff_line(line)?,
        }

        self.lines_this_commit += 1;
        Ok(())
    }

    fn consume_diff_line(&mut self, line: &str) -> Result<()> {
        match self.diff.take() {
            None => {
                let parts: Vec<&str> =
                    line.splitn(3, '\t').filter(|p| !p.is_empty()).collect();

                match parts.len() {
                    3 => {
                        let mut diff = FileDiff::default();
                        if parts[0] != "-" {
                            diff.lines_added = parse_lines_changed(parts[0], line)?;
                        }
                        if parts[1] != "-" {
                            diff.lines_removed = parse_lines_changed(parts[1], line)?;
                        }
                        diff.path = parts[2].to_string();
                        self.commit.file_diffs.push(diff);
                    }
                    2 => {
                        // Rename record: counts now, path tokens follow.
                        let mut diff = FileDiff::default();
                        if parts[0] != "-" {
                            diff.lines_added = parse_lines_changed(parts[0], line)?;
                        }
                        if parts[1] != "-" {
                            diff.lines_removed = parse_lines_changed(parts[1], line)?;
                        }
                        self.diff = Some(diff);
                    }
                    n => {
                        return Err(GitWhoError::Parse(format!(
                            "wrong number of elements on line after split: {n}"
                        )));
                    }
                }
            }
            Some(mut diff) => {
                if diff.path.is_empty() {
                    // Provisional path; the next token overwrites it.
                    diff.path = line.to_string();
                    self.diff = Some(diff);
                } else {
                    diff.path = line.to_string();
                    self.commit.file_diffs.push(diff);
                }
            }
        }

        Ok(())
    }
}

impl<I> Iterator for CommitParser<I>
where
    I: Iterator<Item = std::io::Result<String>>,
{
    type Item = Result<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let line = match self.tokens.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(GitWhoError::Parse(format!(
                        "error reading commit {}: {e}",
                        self.commit.name()
                    ))));
                }
                None => {
                    self.done = true;
                    if self.lines_this_commit > 0 {
                        if let Some(commit) = self.finish_commit() {
                            return Some(Ok(commit));
                        }
                    }
                    return None;
                }
            };

            let boundary = self.lines_this_commit >= 6 && (line.is_empty() || is_rev(&line));
            let mut finished = None;
            if boundary {
                finished = self.finish_commit();
                if line.is_empty() {
                    if let Some(commit) = finished {
                        return Some(Ok(commit));
                    }
                    continue;
                }
            }

            if let Err(e) = self.consume_line(&line) {
                self.done = true;
                return Some(Err(GitWhoError::Parse(format!(
                    "error parsing file diffs from commit {}: {e}",
                    self.commit.name()
                ))));
            }

            if let Some(commit) = finished {
                return Some(Ok(commit));
            }
        }
    }
}
