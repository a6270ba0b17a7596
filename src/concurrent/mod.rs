//! Runs git log in parallel over chunks of the rev list.
//!
//! Dataflow:
//!
//! ```text
//! rev list -> chunk queue -> worker pool => results channel -> fold
//!                                        \-> cache queue -> cache writer
//! ```
//!
//! All channels are rendezvous channels, so a slow stage stalls its
//! upstream instead of buffering unboundedly.

use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::error::{GitWhoError, Result};
use crate::git::{self, Commit, LogFilters, PathspecFilter};
use crate::tally::{
    self, bucket, Combine, TalliesByPath, Tally, TallyOpts, TimeSeries, TreeNode,
};

mod worker;

/// One git log invocation covers this many revisions.
pub const CHUNK_SIZE: usize = 1024;

/// Hardware thread count, resolved once.
pub fn num_cpus() -> usize {
    static N: OnceLock<usize> = OnceLock::new();
    *N.get_or_init(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

/// Cooperative cancellation flag shared by every stage of a query.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A tally kernel usable from the worker pool.
pub type TallyFn<T> =
    fn(&mut dyn Iterator<Item = Result<Commit>>, &TallyOpts) -> Result<T>;

fn calc_total_chunks(rev_count: usize) -> usize {
    rev_count / CHUNK_SIZE + 1
}

fn handle_cache_failure(cache: &mut Cache, err: &GitWhoError) -> Result<()> {
    // Graceful handling: wipe the cache and move on without it.
    warn!("error reading from cache (maybe corrupt?): {err}");
    warn!("wiping cache and moving on");
    cache.clear()
}

fn accumulate_cached<T: Combine + Default>(
    cache: &mut Cache,
    revs: &[String],
    filter: &PathspecFilter,
    tally: TallyFn<T>,
    opts: &TallyOpts,
) -> Result<(T, Vec<String>)> {
    let rev_set: HashSet<String> = revs.iter().cloned().collect();
    let stream = cache.get(&rev_set)?;

    let mut found: HashSet<String> = HashSet::new();
    let mut commits = stream.map(|res| {
        res.map(|mut commit| {
            found.insert(commit.hash.clone());
            filter.limit_diffs(&mut commit);
            commit
        })
    });

    let accumulator = tally(&mut commits, opts)?;
    drop(commits);

    debug!(num = found.len(), "commits found in cache");

    let remaining = revs
        .iter()
        .filter(|rev| !found.contains(*rev))
        .cloned()
        .collect();
    Ok((accumulator, remaining))
}

fn progress_bar(show: bool, total_commits: usize) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total_commits as u64);
    pb.set_style(
        ProgressStyle::with_template("{percent:>3}% ({human_pos}/{human_len} commits)")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

fn tally_fan_out_fan_in<T: Combine + Default + Send + 'static>(
    revspec: &[String],
    pathspecs: &[String],
    filters: &LogFilters,
    tally: TallyFn<T>,
    opts: &TallyOpts,
    mut cache: Cache,
    allow_progress: bool,
) -> Result<T> {
    let revs = git::rev_list(revspec, pathspecs, filters)?;
    if revs.is_empty() {
        debug!("no commits found; no work to do");
        return Ok(T::default());
    }

    let filter = PathspecFilter::new(pathspecs)?;

    // Use cached commits if there are any.
    let mut accumulator = T::default();
    let mut remaining = revs.clone();

    match cache.open() {
        Ok(()) => match accumulate_cached(&mut cache, &revs, &filter, tally, opts) {
            Ok((acc, rem)) => {
                accumulator = acc;
                remaining = rem;
            }
            Err(e) => {
                handle_cache_failure(&mut cache, &e)?;
                accumulator = T::default();
                remaining = revs.clone();
            }
        },
        Err(e) => handle_cache_failure(&mut cache, &e)?,
    }

    if remaining.is_empty() {
        debug!("all commits read from cache");
        cache.close()?;
        return Ok(accumulator);
    }

    let n_cpu = num_cpus();
    let total_chunks = calc_total_chunks(remaining.len());
    let n_workers = n_cpu.min(total_chunks);
    debug!(rev_count = remaining.len(), n_cpu, "running concurrent tally");

    let progress = progress_bar(allow_progress && total_chunks > n_cpu, remaining.len());

    let cancel = CancelToken::new();
    let (chunk_tx, chunk_rx) = crossbeam_channel::bounded::<Vec<String>>(0);
    let (result_tx, result_rx) =
        crossbeam_channel::bounded::<std::result::Result<T, GitWhoError>>(0);
    let (cache_tx, cache_rx) = crossbeam_channel::bounded::<Vec<Commit>>(0);

    let mut first_err: Option<GitWhoError> = None;
    let mut cache_err: Option<GitWhoError> = None;

    std::thread::scope(|s| {
        // Chunk writer.
        {
            let cancel = cancel.clone();
            let chunks: Vec<Vec<String>> =
                remaining.chunks(CHUNK_SIZE).map(|c| c.to_vec()).collect();
            s.spawn(move || {
                debug!("writer started");
                for chunk in chunks {
                    if cancel.is_cancelled() || chunk_tx.send(chunk).is_err() {
                        break;
                    }
                }
                debug!("writer exited");
            });
        }

        // Worker pool.
        for id in 0..n_workers {
            let cancel = cancel.clone();
            let chunk_rx = chunk_rx.clone();
            let result_tx = result_tx.clone();
            let cache_tx = cache_tx.clone();
            let filter = filter.clone();
            let opts = *opts;
            s.spawn(move || {
                worker::run_worker(id, cancel, chunk_rx, result_tx, cache_tx, filter, opts, tally)
            });
        }
        drop(chunk_rx);
        drop(result_tx);
        drop(cache_tx);

        // Cache writer: the only task that mutates the cache.
        let cacher = {
            let cancel = cancel.clone();
            let cache = &mut cache;
            s.spawn(move || worker::run_cacher(cancel, cache, cache_rx))
        };

        // Fold partial results as they arrive; the first worker error
        // cancels the query.
        let mut chunks_complete = 0usize;
        for res in &result_rx {
            match res {
                Ok(partial) => {
                    accumulator = std::mem::take(&mut accumulator).combine(partial);
                    chunks_complete += 1;
                    progress.set_position(
                        ((chunks_complete * CHUNK_SIZE).min(remaining.len())) as u64,
                    );
                }
                Err(e) => {
                    debug!("error in concurrent tally; cancelling");
                    cancel.cancel();
                    first_err = Some(e);
                    break;
                }
            }
        }

        // Keep draining so no worker blocks on a send while unwinding.
        while result_rx.recv().is_ok() {}

        cache_err = match cacher.join() {
            Ok(result) => result.err(),
            Err(_) => Some(GitWhoError::Cache("cache writer panicked".to_string())),
        };
    });

    progress.finish_and_clear();

    if first_err.is_none() {
        if let Some(e) = cache_err.take() {
            first_err = Some(e);
        }
    }

    if let Some(e) = first_err {
        if let Err(close_err) = cache.close() {
            warn!("error closing cache: {close_err}");
        }
        return Err(e);
    }

    cache.close()?;
    Ok(accumulator)
}

fn by_path_kernel(
    commits: &mut dyn Iterator<Item = Result<Commit>>,
    opts: &TallyOpts,
) -> Result<TalliesByPath> {
    tally::tally_commits_by_path(commits, opts)
}

fn by_date_kernel(
    commits: &mut dyn Iterator<Item = Result<Commit>>,
    opts: &TallyOpts,
) -> Result<TimeSeries> {
    bucket::tally_commits_by_date(commits, opts)
}

/// Parallel equivalent of `tally::tally_commits` for diff modes.
pub fn tally_commits(
    revspec: &[String],
    pathspecs: &[String],
    filters: &LogFilters,
    opts: &TallyOpts,
    cache: Cache,
    allow_progress: bool,
) -> Result<HashMap<String, Tally>> {
    let by_path = tally_fan_out_fan_in::<TalliesByPath>(
        revspec,
        pathspecs,
        filters,
        by_path_kernel,
        opts,
        cache,
        allow_progress,
    )?;

    Ok(by_path.reduce())
}

/// Parallel tally arranged as a working-tree-shaped tree.
pub fn tally_commits_tree(
    revspec: &[String],
    pathspecs: &[String],
    filters: &LogFilters,
    opts: &TallyOpts,
    worktree_paths: &HashSet<String>,
    git_root_path: &str,
    cache: Cache,
    allow_progress: bool,
) -> Result<TreeNode> {
    let by_path = tally_fan_out_fan_in::<TalliesByPath>(
        revspec,
        pathspecs,
        filters,
        by_path_kernel,
        opts,
        cache,
        allow_progress,
    )?;

    tally::tree::tally_commits_tree_from_paths(by_path, worktree_paths, git_root_path)
}

/// Parallel tally bucketed over time.
pub fn tally_commits_timeline(
    revspec: &[String],
    pathspecs: &[String],
    filters: &LogFilters,
    opts: &TallyOpts,
    end: Option<DateTime<Local>>,
    cache: Cache,
    allow_progress: bool,
) -> Result<TimeSeries> {
    let series = tally_fan_out_fan_in::<TimeSeries>(
        revspec,
        pathspecs,
        filters,
        by_date_kernel,
        opts,
        cache,
        allow_progress,
    )?;

    Ok(bucket::rebucket_timeline(series, end))
}
