//! The "parse" subcommand: prints parsed commits for debugging.

use anyhow::Context;
use std::io::{BufWriter, Write};
use tracing::debug;

use crate::cli::LogDebugArgs;
use crate::commands::check_pathspecs;
use crate::error::Result;
use crate::git;

pub fn exec(args: LogDebugArgs) -> anyhow::Result<()> {
    run(args).context("error running \"parse\"")
}

fn run(args: LogDebugArgs) -> Result<()> {
    let (revs, pathspecs) = git::parse_args(&args.revs.combined())?;
    check_pathspecs(&pathspecs)?;

    debug!(?revs, ?pathspecs, short = args.short, "called parse");

    let filters = args.filters.to_filters();
    let (commits, mut subprocess) =
        git::commits_with_opts(&revs, &pathspecs, &filters, !args.short)?;

    let stdout = std::io::stdout();
    let mut writer = BufWriter::new(stdout.lock());

    let mut num_commits = 0usize;
    for commit in commits {
        let commit = commit?;

        writeln!(writer, "{commit}")?;
        for diff in &commit.file_diffs {
            writeln!(writer, "  {diff}")?;
        }
        writeln!(writer)?;

        num_commits += 1;
    }
    writer.flush()?;

    println!("Parsed {num_commits} commits.");

    subprocess.wait()?;
    Ok(())
}
