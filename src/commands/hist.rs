//! The "hist" subcommand: a timeline bar plot of contributions.

use anyhow::Context;
use chrono::Local;
use console::style;
use tracing::debug;

use crate::cli::HistArgs;
use crate::commands::{allow_dynamic, check_pathspecs, pick_mode};
use crate::concurrent;
use crate::error::Result;
use crate::format::{abbrev, git_email, number};
use crate::tally::{self, AuthorKey, FinalTally, TallyMode, TallyOpts, TimeBucket};
use crate::{cache, git};

const BAR_WIDTH: u64 = 36;

pub fn exec(args: HistArgs) -> anyhow::Result<()> {
    run(args).context("error running \"hist\"")
}

fn run(args: HistArgs) -> Result<()> {
    let mode = pick_mode(args.lines, args.files, false, false)?;

    let (revs, pathspecs) = git::parse_args(&args.revs.combined())?;
    check_pathspecs(&pathspecs)?;

    debug!(?revs, ?pathspecs, ?mode, "called hist");

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

    // With no explicit revisions or --until, the timeline runs to now.
    let end = if revs == ["HEAD"] && filters.until.is_empty() {
        Some(Local::now())
    } else {
        None
    };

    let series = if populate_diffs && concurrent::num_cpus() > 1 {
        concurrent::tally_commits_timeline(
            &revs,
            &pathspecs,
            &filters,
            &opts,
            end,
            cache::get_cache(),
            allow_dynamic(),
        )?
    } else {
        let (commits, mut subprocess) =
            git::commits_with_opts(&revs, &pathspecs, &filters, populate_diffs)?;
        let series = tally::bucket::tally_commits_timeline(commits, &opts, end)?;
        subprocess.wait()?;
        series
    };

    // Pick a winner in each bucket.
    let buckets: Vec<TimeBucket> = series.0.into_iter().map(|b| b.rank(mode)).collect();

    let mut max_val = BAR_WIDTH;
    for bucket in &buckets {
        max_val = max_val.max(bucket.total_value(mode));
    }

    draw_plot(&buckets, max_val, mode, args.email);
    Ok(())
}

fn draw_plot(buckets: &[TimeBucket], max_val: u64, mode: TallyMode, show_email: bool) {
    let mut last_author = String::new();

    for bucket in buckets {
        let value = bucket.value(mode);
        if value == 0 {
            println!("{} ┤ ", bucket.name);
            continue;
        }

        let clamped = |v: u64| ((v as f64 / max_val as f64) * BAR_WIDTH as f64).ceil() as u64;
        let clamped_value = clamped(value);
        let clamped_total = clamped(bucket.total_value(mode));

        let value_bar = "#".repeat(clamped_value as usize);
        let total_bar = format!(
            "{:<width$}",
            "-".repeat((clamped_total - clamped_value) as usize),
            width = (BAR_WIDTH - clamped_value) as usize,
        );

        let winner = bucket.tally.as_ref().expect("ranked bucket with value has a winner");
        let tally_part = fmt_hist_tally(
            winner,
            mode,
            show_email,
            winner.author_name == last_author,
        );

        println!(
            "{} ┤ {}{}  {}",
            bucket.name,
            value_bar,
            style(total_bar).dim(),
            tally_part,
        );

        last_author = winner.author_name.clone();
    }
}

fn fmt_hist_tally(t: &FinalTally, mode: TallyMode, show_email: bool, fade: bool) -> String {
    let metric = match mode {
        TallyMode::Commits => format!("({})", number(t.commits as i64)),
        TallyMode::Files => format!("({})", number(t.file_count as i64)),
        TallyMode::Lines => format!(
            "({} / {})",
            style(number(t.lines_added as i64)).green(),
            style(number(t.lines_removed as i64)).red(),
        ),
        _ => panic!("unsupported tally mode for hist"),
    };

    let author = if show_email {
        abbrev(&git_email(&t.author_email), 25)
    } else {
        abbrev(&t.author_name, 25)
    };

    if fade {
        format!("{} {}", style(author).dim(), metric)
    } else {
        format!("{author} {metric}")
    }
}
