//! Splits git revisions from pathspecs in a mixed argument list.

use crate::error::{GitWhoError, Result};
use crate::git::cmd::GitCmd;
use crate::git::parse::is_rev;

/// Disambiguates revisions from pathspecs by way of
/// `git rev-parse --no-flags`. Falls back to HEAD when no revision was
/// given.
pub fn parse_args(args: &[String]) -> Result<(Vec<String>, Vec<String>)> {
    let mut cmd_args = vec!["rev-parse".to_string(), "--no-flags".to_string()];
    cmd_args.extend(args.iter().cloned());

    let mut subprocess = GitCmd::spawn(&cmd_args, false)
        .map_err(|e| GitWhoError::Input(format!("could not parse args: {e}")))?;

    let mut revs = Vec::new();
    let mut pathspecs = Vec::new();
    let mut finished_revs = false;

    for line in subprocess.stdout_lines() {
        let line = line.map_err(|e| {
            GitWhoError::Input(format!("failed reading output of rev-parse: {e}"))
        })?;

        if !finished_revs && is_rev(&line) {
            revs.push(line);
        } else {
            finished_revs = true;
            if line != "--" {
                pathspecs.push(line);
            }
        }
    }

    subprocess.wait()?;

    if revs.is_empty() {
        revs.push("HEAD".to_string());
    }

    Ok((revs, pathspecs))
}
