//! The "table" subcommand: a ranked summary of contributions by author.

use anyhow::Context;
use chrono::Utc;
use console::style;
use tracing::debug;

use crate::cli::TableArgs;
use crate::commands::{allow_dynamic, check_pathspecs, pick_mode};
use crate::concurrent;
use crate::error::{GitWhoError, Result};
use crate::format::{abbrev, fill_right, git_email, number, relative_time};
use crate::tally::{self, AuthorKey, FinalTally, TallyMode, TallyOpts};
use crate::{cache, git};

const NARROW_WIDTH: usize = 55;
const WIDE_WIDTH: usize = 80;

fn pick_width(mode: TallyMode, show_email: bool) -> usize {
    let wide = mode == TallyMode::Files || mode == TallyMode::Lines;
    if wide || show_email {
        WIDE_WIDTH
    } else {
        NARROW_WIDTH
    }
}

pub fn exec(args: TableArgs) -> anyhow::Result<()> {
    run(args).context("error running \"table\"")
}

fn run(args: TableArgs) -> Result<()> {
    let mode = pick_mode(args.lines, args.files, args.created, args.modified)?;

    if args.limit < 0 {
        return Err(GitWhoError::Input(
            "-n flag must be a positive integer".to_string(),
        ));
    }

    let (revs, pathspecs) = git::parse_args(&args.revs.combined())?;
    check_pathspecs(&pathspecs)?;

    debug!(?revs, ?pathspecs, ?mode, "called table");

    let opts = TallyOpts {
        mode,
        key: if args.email {
            AuthorKey::Email
        } else {
            AuthorKey::Name
        },
        count_merges: args.merges,
    };
    let filters = args.filters.to_filters();
    let populate_diffs = opts.is_diff_mode();

    let tallies = if populate_diffs && concurrent::num_cpus() > 1 {
        concurrent::tally_commits(
            &revs,
            &pathspecs,
            &filters,
            &opts,
            cache::get_cache(),
            allow_dynamic(),
        )?
    } else {
        // Fast enough in the no-diff case without parallelizing.
        let (commits, mut subprocess) =
            git::commits_with_opts(&revs, &pathspecs, &filters, populate_diffs)?;
        let tallies = tally::tally_commits(commits, &opts)?;
        subprocess.wait()?;
        tallies
    };

    let mut ranked = tally::rank(tallies, mode);

    let mut num_filtered_out = 0;
    let limit = args.limit as usize;
    if limit > 0 && limit < ranked.len() {
        num_filtered_out = ranked.len() - limit;
        ranked.truncate(limit);
    }

    if args.csv {
        write_csv(&ranked, &opts, args.email)?;
    } else {
        let colwidth = pick_width(mode, args.email);
        write_table(&ranked, colwidth, args.email, mode, num_filtered_out);
    }

    Ok(())
}

fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn write_csv(tallies: &[FinalTally], opts: &TallyOpts, show_email: bool) -> Result<()> {
    let mut headers = vec!["name"];
    if show_email {
        headers.push("email");
    }
    headers.push("commits");
    if opts.is_diff_mode() {
        headers.extend(["lines added", "lines removed", "files"]);
    }
    headers.extend(["last commit time", "first commit time"]);
    println!("{}", headers.join(","));

    for t in tallies {
        let mut record = vec![csv_field(&t.author_name)];
        if show_email {
            record.push(csv_field(&t.author_email));
        }
        record.push(t.commits.to_string());
        if opts.is_diff_mode() {
            record.push(t.lines_added.to_string());
            record.push(t.lines_removed.to_string());
            record.push(t.file_count.to_string());
        }
        record.push(t.last_commit_time.to_rfc3339());
        record.push(t.first_commit_time.to_rfc3339());
        println!("{}", record.join(","));
    }

    Ok(())
}

/// A string of exactly `width` columns describing the author.
fn format_author(t: &FinalTally, show_email: bool, width: usize) -> String {
    let author = if show_email {
        format!("{} {}", t.author_name, git_email(&t.author_email))
    } else {
        t.author_name.clone()
    };

    fill_right(&abbrev(&author, width), width)
}

fn write_table(
    tallies: &[FinalTally],
    colwidth: usize,
    show_email: bool,
    mode: TallyMode,
    num_filtered_out: usize,
) {
    if tallies.is_empty() {
        return;
    }

    let now = Utc::now();
    let rule = "─".repeat(colwidth - 2);
    let wide = mode == TallyMode::Lines || mode == TallyMode::Files;

    println!("┌{rule}┐");
    if wide {
        println!(
            "│{} {:<11} {:>7} {:>7}  {:>17}│",
            fill_right("Author", colwidth - 36 - 13),
            "Last Edit",
            "Commits",
            "Files",
            "Lines (+/-)",
        );
    } else if mode == TallyMode::FirstModified {
        println!(
            "│{} {:<11} {:>7}│",
            fill_right("Author", colwidth - 22),
            "First Edit",
            "Commits",
        );
    } else {
        println!(
            "│{} {:<11} {:>7}│",
            fill_right("Author", colwidth - 22),
            "Last Edit",
            "Commits",
        );
    }
    println!("├{rule}┤");

    for t in tallies {
        if wide {
            let lines = format!(
                "{} / {}",
                style(format!("{:>7}", number(t.lines_added as i64))).green(),
                style(format!("{:>7}", number(t.lines_removed as i64))).red(),
            );
            println!(
                "│{} {:<11} {:>7} {:>7}  {}│",
                format_author(t, show_email, colwidth - 36 - 13),
                relative_time(now, t.last_commit_time),
                number(t.commits as i64),
                number(t.file_count as i64),
                lines,
            );
        } else if mode == TallyMode::FirstModified {
            println!(
                "│{} {:<11} {:>7}│",
                format_author(t, show_email, colwidth - 22),
                relative_time(now, t.first_commit_time),
                number(t.commits as i64),
            );
        } else {
            println!(
                "│{} {:<11} {:>7}│",
                format_author(t, show_email, colwidth - 22),
                relative_time(now, t.last_commit_time),
                number(t.commits as i64),
            );
        }
    }

    if num_filtered_out > 0 {
        let msg = format!("...{} more...", number(num_filtered_out as i64));
        println!("│{}│", fill_right(&msg, colwidth - 2));
    }

    println!("└{rule}┘");
}
