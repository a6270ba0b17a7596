//! Worker, cache-writer, and tee plumbing for the parallel tally.

use crossbeam_channel::{Receiver, Sender};
use std::io::{BufWriter, Write};
use tracing::debug;

use crate::cache::Cache;
use crate::concurrent::{CancelToken, TallyFn, CHUNK_SIZE};
use crate::error::{GitWhoError, Result};
use crate::git::{self, Commit, PathspecFilter};
use crate::tally::TallyOpts;

/// A tally worker that runs one git log per chunk of revisions.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_worker<T>(
    id: usize,
    cancel: CancelToken,
    chunks: Receiver<Vec<String>>,
    results: Sender<std::result::Result<T, GitWhoError>>,
    to_cache: Sender<Vec<Commit>>,
    filter: PathspecFilter,
    opts: TallyOpts,
    tally: TallyFn<T>,
) {
    debug!(worker_id = id, "worker started");

    for revs in &chunks {
        if cancel.is_cancelled() {
            break;
        }

        match process_chunk(&revs, &filter, &opts, tally, &to_cache, &cancel) {
            Ok(result) => {
                if results.send(Ok(result)).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(worker_id = id, "worker exiting with error");
                let _ = results.send(Err(e));
                break;
            }
        }
    }

    debug!(worker_id = id, "worker exited");
}

fn process_chunk<T>(
    revs: &[String],
    filter: &PathspecFilter,
    opts: &TallyOpts,
    tally: TallyFn<T>,
    to_cache: &Sender<Vec<Commit>>,
    cancel: &CancelToken,
) -> Result<T> {
    // No pathspecs here: even when the tally is limited to certain paths,
    // the cache must see every path a commit touched, so the diffs are
    // trimmed in-process after the tee.
    let mut subprocess = git::run_stdin_log(&[], true)?;

    {
        let stdin = subprocess
            .take_stdin()
            .ok_or_else(|| GitWhoError::Input("git log --stdin has no stdin pipe".to_string()))?;
        let mut writer = BufWriter::new(stdin);
        for rev in revs {
            writeln!(writer, "{rev}")?;
        }
        writer.flush()?;
    } // closes stdin

    let parser = git::CommitParser::new(subprocess.stdout_log_tokens());
    let tee = CacheTee::new(parser, to_cache.clone(), cancel.clone());
    let mut commits = tee.map(|res| {
        res.map(|mut commit| {
            filter.limit_diffs(&mut commit);
            commit
        })
    });

    let result = tally(&mut commits, opts)?;
    drop(commits);

    subprocess.wait()?;
    Ok(result)
}

/// Drains the cache queue, appending chunks to the cache. The first write
/// error cancels the query and is surfaced to the orchestrator.
pub(crate) fn run_cacher(
    cancel: CancelToken,
    cache: &mut Cache,
    chunks: Receiver<Vec<Commit>>,
) -> Result<()> {
    debug!("cacher started");

    for commits in &chunks {
        if let Err(e) = cache.add(&commits) {
            cancel.cancel();
            debug!("cacher exited with error");
            return Err(GitWhoError::Cache(format!("error in cacher: {e}")));
        }
    }

    debug!("cacher exited");
    Ok(())
}

/// Transparently splits commits off to the cache queue while passing them
/// through to the kernel. Commits are never shared by reference; the cache
/// gets its own copies.
struct CacheTee<I> {
    inner: I,
    chunk: Vec<Commit>,
    to_cache: Sender<Vec<Commit>>,
    cancel: CancelToken,
    broken: bool,
}

impl<I> CacheTee<I> {
    fn new(inner: I, to_cache: Sender<Vec<Commit>>, cancel: CancelToken) -> Self {
        CacheTee {
            inner,
            chunk: Vec::new(),
            to_cache,
            cancel,
            broken: false,
        }
    }
}

impl<I> Iterator for CacheTee<I>
where
    I: Iterator<Item = Result<Commit>>,
{
    type Item = Result<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cancel.is_cancelled() {
            self.broken = true;
            return None;
        }

        match self.inner.next() {
            Some(Ok(commit)) => {
                if !self.broken {
                    self.chunk.push(commit.clone());
                    if self.chunk.len() >= CHUNK_SIZE {
                        let chunk = std::mem::take(&mut self.chunk);
                        if self.to_cache.send(chunk).is_err() {
                            self.broken = true;
                        }
                    }
                }
                Some(Ok(commit))
            }
            Some(Err(e)) => {
                self.broken = true;
                Some(Err(e))
            }
            None => None,
        }
    }
}

impl<I> Drop for CacheTee<I> {
    fn drop(&mut self) {
        // Write any remainder.
        if !self.broken && !self.chunk.is_empty() {
            let _ = self.to_cache.send(std::mem::take(&mut self.chunk));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn commit(hash: &str) -> Commit {
        Commit {
            hash: hash.to_string(),
            short_hash: hash.to_string(),
            author_name: "bob".to_string(),
            author_email: "bob@mail.com".to_string(),
            date: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn tee_passes_commits_through_and_flushes_on_drop() {
        let (tx, rx) = crossbeam_channel::bounded::<Vec<Commit>>(4);

        let input: Vec<Result<Commit>> = vec![Ok(commit("a")), Ok(commit("b"))];
        let tee = CacheTee::new(input.into_iter(), tx, CancelToken::new());

        let passed: Vec<Commit> = tee.map(|r| r.unwrap()).collect();
        assert_eq!(passed.len(), 2);

        let cached = rx.try_recv().unwrap();
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0].hash, "a");
    }

    #[test]
    fn tee_stops_when_cancelled() {
        let (tx, _rx) = crossbeam_channel::bounded::<Vec<Commit>>(4);
        let cancel = CancelToken::new();
        cancel.cancel();

        let input: Vec<Result<Commit>> = vec![Ok(commit("a"))];
        let mut tee = CacheTee::new(input.into_iter(), tx, cancel);
        assert!(tee.next().is_none());
    }
}
