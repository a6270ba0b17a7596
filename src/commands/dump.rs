//! The "dump" subcommand: prints the raw git log stream being parsed.

use anyhow::Context;
use std::io::{BufWriter, Write};
use tracing::debug;

use crate::cli::LogDebugArgs;
use crate::commands::check_pathspecs;
use crate::error::Result;
use crate::git;

pub fn exec(args: LogDebugArgs) -> anyhow::Result<()> {
    run(args).context("error running \"dump\"")
}

fn run(args: LogDebugArgs) -> Result<()> {
    let (revs, pathspecs) = git::parse_args(&args.revs.combined())?;
    check_pathspecs(&pathspecs)?;

    debug!(?revs, ?pathspecs, short = args.short, "called dump");

    let filters = args.filters.to_filters();
    let mut subprocess = git::run_log(&revs, &pathspecs, &filters, !args.short)?;

    let stdout = std::io::stdout();
    let mut writer = BufWriter::new(stdout.lock());

    for token in subprocess.stdout_log_tokens() {
        // Make the NUL separators visible.
        writeln!(writer, "{}", token?.replace('\0', "^@"))?;
    }
    writer.flush()?;

    subprocess.wait()?;
    Ok(())
}
