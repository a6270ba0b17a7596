//! The "tree" subcommand: contributions arranged as a file tree.

use anyhow::Context;
use chrono::Utc;
use console::style;
use tracing::debug;

use crate::cli::TreeArgs;
use crate::commands::{allow_dynamic, check_pathspecs, pick_mode};
use crate::concurrent;
use crate::error::{GitWhoError, Result};
use crate::format::{abbrev, git_email, number, relative_time};
use crate::tally::{self, AuthorKey, FinalTally, TallyMode, TallyOpts, TreeNode};
use crate::{cache, git};

const DEFAULT_MAX_DEPTH: u32 = 100;

struct PrintTreeOpts {
    mode: TallyMode,
    max_depth: u32,
    show_hidden: bool,
    show_email: bool,
}

struct TreeOutputLine {
    indent: String,
    path: String,
    metric: String,
    author: String,
    show_line: bool,
    show_tally: bool,
    dim_tally: bool,
    dim_path: bool,
}

pub fn exec(args: TreeArgs) -> anyhow::Result<()> {
    run(args).context("error running \"tree\"")
}

fn run(args: TreeArgs) -> Result<()> {
    let mode = pick_mode(args.lines, args.files, args.created, args.modified)?;

    let (revs, pathspecs) = git::parse_args(&args.revs.combined())?;
    check_pathspecs(&pathspecs)?;

    debug!(?revs, ?pathspecs, ?mode, depth = args.depth, "called tree");

    let wtreeset = git::working_tree_files(&pathspecs)?;
    let git_root = git::get_root()?;

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

    let tree_result = if concurrent::num_cpus() > 1 {
        concurrent::tally_commits_tree(
            &revs,
            &pathspecs,
            &filters,
            &opts,
            &wtreeset,
            &git_root,
            cache::get_cache(),
            allow_dynamic(),
        )
    } else {
        sequential_tree(&revs, &pathspecs, &filters, &opts, &wtreeset, &git_root)
    };

    let mut root = match tree_result {
        Ok(root) => root,
        Err(GitWhoError::EmptyTree) => {
            debug!("tree was empty");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    root.rank(mode);

    let max_depth = if args.depth == 0 {
        DEFAULT_MAX_DEPTH
    } else {
        args.depth
    };
    let opts = PrintTreeOpts {
        mode,
        max_depth,
        show_hidden: args.all,
        show_email: args.email,
    };

    let mut lines = Vec::new();
    to_lines(&root, ".", 0, "", &[], &opts, &mut lines);
    print_tree(&lines);

    Ok(())
}

fn sequential_tree(
    revs: &[String],
    pathspecs: &[String],
    filters: &git::LogFilters,
    opts: &TallyOpts,
    wtreeset: &std::collections::HashSet<String>,
    git_root: &str,
) -> Result<TreeNode> {
    let (commits, mut subprocess) = git::commits_with_opts(revs, pathspecs, filters, true)?;
    let by_path = tally::tally_commits_by_path(commits, opts)?;
    subprocess.wait()?;
    tally::tree::tally_commits_tree_from_paths(by_path, wtreeset, git_root)
}

fn tally_author(t: &FinalTally, show_email: bool) -> String {
    if show_email {
        abbrev(&git_email(&t.author_email), 25)
    } else {
        abbrev(&t.author_name, 25)
    }
}

fn fmt_tally_metric(t: &FinalTally, opts: &PrintTreeOpts) -> String {
    match opts.mode {
        TallyMode::Commits => format!("({})", number(t.commits as i64)),
        TallyMode::Files => format!("({})", number(t.file_count as i64)),
        TallyMode::Lines => format!(
            "({} / {})",
            style(number(t.lines_added as i64)).green(),
            style(number(t.lines_removed as i64)).red(),
        ),
        TallyMode::LastModified => {
            format!("({})", relative_time(Utc::now(), t.last_commit_time))
        }
        TallyMode::FirstModified => {
            format!("({})", relative_time(Utc::now(), t.first_commit_time))
        }
    }
}

/// Recursively descend the tree, turning nodes into output lines.
fn to_lines(
    node: &TreeNode,
    path: &str,
    depth: u32,
    last_author: &str,
    is_final_child: &[bool],
    opts: &PrintTreeOpts,
    lines: &mut Vec<TreeOutputLine>,
) {
    if path == tally::NO_DIFF_PATHNAME {
        return;
    }

    if depth > opts.max_depth {
        return;
    }

    if depth < opts.max_depth && node.children.len() == 1 {
        // Path ellision: collapse single-child directory chains.
        for (segment, child) in &node.children {
            let joined = if path == "." {
                segment.clone()
            } else {
                format!("{path}/{segment}")
            };
            to_lines(child, &joined, depth + 1, last_author, is_final_child, opts, lines);
        }
        return;
    }

    let mut indent = String::new();
    for (i, is_final) in is_final_child.iter().enumerate() {
        if i < is_final_child.len() - 1 {
            indent.push_str(if *is_final { "    " } else { "│   " });
        } else {
            indent.push_str(if *is_final { "└── " } else { "├── " });
        }
    }

    let display_path = if node.children.is_empty() {
        path.to_string()
    } else {
        format!("{path}/")
    };

    let (author, metric, node_author) = match &node.tally {
        Some(tally) => (
            tally_author(tally, opts.show_email),
            fmt_tally_metric(tally, opts),
            if opts.show_email {
                tally.author_email.clone()
            } else {
                tally.author_name.clone()
            },
        ),
        None => (String::new(), String::new(), String::new()),
    };

    let new_author = node_author != last_author;
    lines.push(TreeOutputLine {
        indent,
        path: display_path,
        metric,
        author,
        show_line: node.in_work_tree || opts.show_hidden,
        show_tally: opts.show_hidden || new_author || !node.children.is_empty(),
        dim_tally: !node.children.is_empty(),
        dim_path: !node.in_work_tree,
    });

    // Directories first, then alphabetically.
    let mut child_paths: Vec<&String> = node.children.keys().collect();
    child_paths.sort_by(|a, b| {
        let a_dir = !node.children[*a].children.is_empty();
        let b_dir = !node.children[*b].children.is_empty();
        b_dir.cmp(&a_dir).then(a.cmp(b))
    });

    // Find last visible child so the connector glyphs line up.
    let mut final_child_index = 0;
    for (i, p) in child_paths.iter().enumerate() {
        let child = &node.children[*p];
        if child.in_work_tree || opts.show_hidden {
            final_child_index = i;
        }
    }

    for (i, p) in child_paths.iter().enumerate() {
        let child = &node.children[*p];
        let mut flags = is_final_child.to_vec();
        flags.push(i == final_child_index);
        to_lines(child, p, depth + 1, &node_author, &flags, opts, lines);
    }
}

fn print_tree(lines: &[TreeOutputLine]) {
    let longest = lines
        .iter()
        .map(|l| console::measure_text_width(&l.indent) + console::measure_text_width(&l.path))
        .max()
        .unwrap_or(0);

    // At least four dots between the path and the tally.
    let tally_start = longest + 4;

    for line in lines {
        if !line.show_line {
            continue;
        }

        let path = if line.dim_path {
            style(line.path.clone()).dim().to_string()
        } else {
            line.path.clone()
        };

        if !line.show_tally {
            println!("{}{}", line.indent, path);
            continue;
        }

        let used = console::measure_text_width(&line.indent)
            + console::measure_text_width(&line.path);
        let separator = ".".repeat(tally_start - used);

        if line.dim_tally {
            println!(
                "{}{}{}{} {}",
                line.indent,
                path,
                style(separator).dim(),
                line.author,
                line.metric,
            );
        } else {
            println!(
                "{}{}{}{} {}",
                line.indent,
                path,
                style(separator).dim(),
                style(&line.author).dim(),
                line.metric,
            );
        }
    }
}
