//! Subcommand implementations.

use crate::error::{GitWhoError, Result};
use crate::tally::TallyMode;

pub mod dump;
pub mod hist;
pub mod parse;
pub mod table;
pub mod tree;

/// Resolves the mutually-exclusive sort flags into a tally mode.
pub(crate) fn pick_mode(
    lines: bool,
    files: bool,
    created: bool,
    modified: bool,
) -> Result<TallyMode> {
    let set = [lines, files, created, modified]
        .iter()
        .filter(|&&f| f)
        .count();
    if set > 1 {
        return Err(GitWhoError::Input(
            "all sort flags are mutually exclusive".to_string(),
        ));
    }

    Ok(if lines {
        TallyMode::Lines
    } else if files {
        TallyMode::Files
    } else if created {
        TallyMode::FirstModified
    } else if modified {
        TallyMode::LastModified
    } else {
        TallyMode::Commits
    })
}

pub(crate) fn check_pathspecs(pathspecs: &[String]) -> Result<()> {
    for p in pathspecs {
        if !crate::git::is_supported_pathspec(p) {
            return Err(GitWhoError::Input(format!(
                "unsupported magic in pathspec: \"{p}\"\nonly the \"exclude\" magic is supported"
            )));
        }
    }

    Ok(())
}

/// Allow overwriting output (progress indicator) only on a terminal.
pub(crate) fn allow_dynamic() -> bool {
    console::Term::stdout().is_term()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_flags_are_mutually_exclusive() {
        assert!(pick_mode(true, true, false, false).is_err());
        assert_eq!(pick_mode(false, false, false, false).unwrap(), TallyMode::Commits);
        assert_eq!(pick_mode(true, false, false, false).unwrap(), TallyMode::Lines);
        assert_eq!(pick_mode(false, false, true, false).unwrap(), TallyMode::FirstModified);
        assert_eq!(pick_mode(false, false, false, true).unwrap(), TallyMode::LastModified);
    }

    #[test]
    fn pathspec_magic_is_checked() {
        assert!(check_pathspecs(&["src/".to_string(), ":!vendor/".to_string()]).is_ok());
        assert!(check_pathspecs(&[":(top)src/".to_string()]).is_err());
    }
}
