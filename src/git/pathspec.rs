//! Pathspec classification and matching.
//!
//! Only the "exclude" magic (`:!`, `:^`, `:(exclude)`) is supported; any
//! other leading-colon magic is rejected before git is ever spawned.

use globset::{GlobBuilder, GlobMatcher};

use crate::error::Result;

pub fn is_supported_pathspec(pathspec: &str) -> bool {
    let bytes = pathspec.as_bytes();
    if bytes.first() != Some(&b':') {
        return true;
    }

    if pathspec.starts_with(":(exclude)") {
        return true;
    }

    if bytes.len() >= 3 && (bytes[1] == b'!' || bytes[1] == b'^') {
        let c = bytes[2];
        return c == b':' || !(c == b'!' || c == b'^' || c == b'/');
    }

    false
}

/// Splits include pathspecs from exclude pathspecs, stripping the leading
/// magic off the excludes.
pub fn split_pathspecs(pathspecs: &[String]) -> (Vec<String>, Vec<String>) {
    let mut includes = Vec::new();
    let mut excludes = Vec::new();

    for p in pathspecs {
        if p.is_empty() {
            continue; // git disallows this degenerate case
        }

        if p.starts_with(':') {
            excludes.push(strip_magic(p).to_string());
        } else {
            includes.push(p.clone());
        }
    }

    (includes, excludes)
}

fn strip_magic(p: &str) -> &str {
    if let Some(rest) = p.strip_prefix(":(exclude)") {
        return rest;
    }
    if let Some(rest) = p.strip_prefix(":!").or_else(|| p.strip_prefix(":^")) {
        return rest.strip_prefix(':').unwrap_or(rest);
    }
    p
}

/// One compiled pathspec. A pathspec matches a path when the pattern
/// matches directly, when `pattern/**` matches (directory prefix), or,
/// for patterns starting with `*`, when `**/pattern` matches.
#[derive(Clone)]
struct CompiledPathspec {
    matchers: Vec<GlobMatcher>,
}

impl CompiledPathspec {
    fn new(pattern: &str) -> Result<Self> {
        let mut variants = vec![pattern.to_string()];
        variants.push(format!("{}/**", pattern.trim_end_matches('/')));
        if pattern.starts_with('*') {
            variants.push(format!("**/{pattern}"));
        }

        let mut matchers = Vec::with_capacity(variants.len());
        for v in variants {
            // Like git's fnmatch, a single `*` must not cross a slash.
            let glob = GlobBuilder::new(&v).literal_separator(true).build()?;
            matchers.push(glob.compile_matcher());
        }

        Ok(CompiledPathspec { matchers })
    }

    fn matches(&self, path: &str) -> bool {
        self.matchers.iter().any(|m| m.is_match(path))
    }
}

/// A validated, compiled set of include and exclude pathspecs, reusable
/// across threads.
#[derive(Clone)]
pub struct PathspecFilter {
    includes: Vec<CompiledPathspec>,
    excludes: Vec<CompiledPathspec>,
}

impl PathspecFilter {
    pub fn new(pathspecs: &[String]) -> Result<Self> {
        for p in pathspecs {
            if !is_supported_pathspec(p) {
                return Err(crate::error::GitWhoError::Input(format!(
                    "unsupported magic in pathspec: \"{p}\""
                )));
            }
        }

        let (includes, excludes) = split_pathspecs(pathspecs);

        Ok(PathspecFilter {
            includes: includes
                .iter()
                .map(|p| CompiledPathspec::new(p))
                .collect::<Result<_>>()?,
            excludes: excludes
                .iter()
                .map(|p| CompiledPathspec::new(p))
                .collect::<Result<_>>()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }

    pub fn matches(&self, path: &str) -> bool {
        let included = self.includes.iter().any(|p| p.matches(path));
        let excluded = self.excludes.iter().any(|p| p.matches(path));
        included && !excluded
    }

    /// Strips file diffs not matching the filter out of the commit. The
    /// commit itself survives even when every diff is stripped, so commit
    /// counts stay intact.
    pub fn limit_diffs(&self, commit: &mut crate::git::Commit) {
        if self.is_empty() {
            return;
        }
        commit.file_diffs.retain(|diff| self.matches(&diff.path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_paths_and_exclude_magic_are_supported() {
        assert!(is_supported_pathspec("foo/bar.txt"));
        assert!(is_supported_pathspec("*.go"));
        assert!(is_supported_pathspec(":!vendor/"));
        assert!(is_supported_pathspec(":^vendor/"));
        assert!(is_supported_pathspec(":(exclude)vendor/"));
        assert!(is_supported_pathspec(":!:vendor/"));
    }

    #[test]
    fn other_magic_is_rejected() {
        assert!(!is_supported_pathspec(":(top)foo"));
        assert!(!is_supported_pathspec(":/foo"));
        assert!(!is_supported_pathspec(":!"));
        assert!(!is_supported_pathspec(":!/abs"));
    }

    #[test]
    fn split_strips_exclude_magic() {
        let pathspecs = vec![
            "src/".to_string(),
            ":!vendor/".to_string(),
            ":(exclude)dist/".to_string(),
            ":!:node_modules/".to_string(),
        ];
        let (includes, excludes) = split_pathspecs(&pathspecs);
        assert_eq!(includes, vec!["src/"]);
        assert_eq!(excludes, vec!["vendor/", "dist/", "node_modules/"]);
    }

    #[test]
    fn directory_pathspec_matches_contents() {
        let filter = PathspecFilter::new(&["src/".to_string()]).unwrap();
        assert!(filter.matches("src/main.rs"));
        assert!(filter.matches("src/git/cmd.rs"));
        assert!(!filter.matches("tests/smoke.rs"));
    }

    #[test]
    fn star_pattern_matches_any_depth() {
        let filter = PathspecFilter::new(&["*.txt".to_string()]).unwrap();
        assert!(filter.matches("a.txt"));
        assert!(filter.matches("deep/nested/b.txt"));
        assert!(!filter.matches("c.md"));
    }

    #[test]
    fn excludes_strip_matching_diffs() {
        use crate::git::{Commit, FileDiff};

        let filter =
            PathspecFilter::new(&["*.txt".to_string(), ":!vendor/".to_string()]).unwrap();

        let mut commit = Commit {
            file_diffs: vec![
                FileDiff { path: "a.txt".into(), ..Default::default() },
                FileDiff { path: "vendor/b.txt".into(), ..Default::default() },
                FileDiff { path: "c.md".into(), ..Default::default() },
            ],
            ..Default::default()
        };

        filter.limit_diffs(&mut commit);
        let paths: Vec<&str> = commit.file_diffs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt"]);
    }

    #[test]
    fn unsupported_magic_fails_construction() {
        assert!(PathspecFilter::new(&[":(top)foo".to_string()]).is_err());
    }
}
