//! Framed binary cache backend.
//!
//! The file on disk is a series of bincode-encoded commit arrays, each
//! prefixed with a four-byte little-endian length. The framing repeats
//! encoding overhead per record but lets us append new commits instead of
//! rewriting the whole file. The file is gzipped while at rest and
//! unpacked for the duration of a query.

use std::collections::{HashSet, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::warn;

use crate::cache::{fnv1a32, repo_state_hash, CommitStream};
use crate::error::{GitWhoError, Result};
use crate::git::Commit;

pub const GOBS_BACKEND_NAME: &str = "gobs";

pub struct GobsBackend {
    dir: PathBuf,
    path: PathBuf,
    was_opened: bool,
    is_dirty: bool,
}

impl GobsBackend {
    pub fn new(dir: PathBuf, path: PathBuf) -> Self {
        GobsBackend {
            dir,
            path,
            was_opened: false,
            is_dirty: false,
        }
    }

    fn compressed_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".gz");
        PathBuf::from(name)
    }
}

impl crate::cache::Backend for GobsBackend {
    fn name(&self) -> &'static str {
        GOBS_BACKEND_NAME
    }

    fn open(&mut self) -> Result<()> {
        self.was_opened = true;

        // Unpack the gzipped file to the working location if it exists.
        let fin = match File::open(self.compressed_path()) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let fout = File::create(&self.path)?;
        let mut reader = GzDecoder::new(BufReader::new(fin));
        let mut writer = BufWriter::new(fout);
        std::io::copy(&mut reader, &mut writer)?;
        writer.flush()?;

        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.is_dirty {
            let fin = match File::open(&self.path) {
                Ok(f) => Some(f),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            };

            if let Some(fin) = fin {
                let fout = File::create(self.compressed_path())?;
                let mut reader = BufReader::new(fin);
                let mut writer = GzEncoder::new(BufWriter::new(fout), Compression::fast());
                std::io::copy(&mut reader, &mut writer)?;
                writer.finish()?.flush()?;
            }
        }

        // Remove the uncompressed working file.
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                return Err(e.into());
            }
        }

        // Remove any other dangling cache files for this repo state.
        let compressed = self.compressed_path();
        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                if entry.path() == compressed {
                    continue;
                }
                if let Err(e) = std::fs::remove_file(entry.path()) {
                    warn!("failed to delete old cache file: {e}");
                }
            }
        }

        Ok(())
    }

    fn get(&mut self, revs: &HashSet<String>) -> Result<CommitStream> {
        assert!(self.was_opened, "cache not yet open; did you forget to call open()?");

        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(Box::new(std::iter::empty()));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Box::new(FrameReader {
            reader: BufReader::new(file),
            looking_for: revs.clone(),
            seen: HashSet::new(),
            pending: VecDeque::new(),
            done: false,
        }))
    }

    fn add(&mut self, commits: &[Commit]) -> Result<()> {
        assert!(self.was_opened, "cache not yet open; did you forget to call open()?");

        self.is_dirty = true;

        let data = bincode::serialize(&commits.to_vec())?;
        if data.len() > 0x7FFF_FFFF {
            return Err(GitWhoError::Cache(
                "cannot add more than 2,147,483,647 bytes to cache at once".to_string(),
            ));
        }

        // The directory may have been wiped after a corruption failure.
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&(data.len() as u32).to_le_bytes())?;
        writer.write_all(&data)?;
        writer.flush()?;

        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Streams commits out of the framed cache file, yielding only those in
/// the requested rev set. A requested hash appearing twice is reported as
/// corruption.
struct FrameReader {
    reader: BufReader<File>,
    looking_for: HashSet<String>,
    seen: HashSet<String>,
    pending: VecDeque<Commit>,
    done: bool,
}

impl FrameReader {
    fn read_frame(&mut self) -> Result<Option<Vec<Commit>>> {
        let mut prefix = [0u8; 4];
        match self.reader.read_exact(&mut prefix) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let size = u32::from_le_bytes(prefix) as usize;
        let mut data = vec![0u8; size];
        self.reader.read_exact(&mut data)?;

        let commits: Vec<Commit> = bincode::deserialize(&data)?;
        Ok(Some(commits))
    }
}

impl Iterator for FrameReader {
    type Item = Result<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if let Some(commit) = self.pending.pop_front() {
                if self.seen.contains(&commit.hash) {
                    self.done = true;
                    return Some(Err(GitWhoError::Cache(format!(
                        "duplicate commit in cache: {}",
                        commit.hash
                    ))));
                }

                self.seen.insert(commit.hash.clone());
                return Some(Ok(commit));
            }

            match self.read_frame() {
                Ok(Some(commits)) => {
                    self.pending.extend(
                        commits
                            .into_iter()
                            .filter(|c| self.looking_for.contains(&c.hash)),
                    );
                }
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// The per-repo cache directory. The name includes a hash of the repo root
/// path so distinct repos never collide.
pub fn gobs_cache_dir(prefix: &Path, git_root_path: &str) -> PathBuf {
    let base = Path::new(git_root_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    prefix.join(format!("{base}-{:x}", fnv1a32(git_root_path.as_bytes())))
}

pub fn gobs_cache_filename(git_root_path: &str) -> Result<String> {
    let state_hash = repo_state_hash(git_root_path)?;
    Ok(format!("{state_hash}.gobs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Backend;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn commit(hash: &str) -> Commit {
        Commit {
            hash: hash.to_string(),
            short_hash: hash[..7.min(hash.len())].to_string(),
            author_name: "bob".to_string(),
            author_email: "bob@mail.com".to_string(),
            date: Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap(),
            file_diffs: vec![crate::git::FileDiff {
                path: "a.txt".to_string(),
                lines_added: 1,
                lines_removed: 0,
            }],
            ..Default::default()
        }
    }

    fn backend(dir: &Path) -> GobsBackend {
        GobsBackend::new(dir.to_path_buf(), dir.join("state.gobs"))
    }

    fn get_all(b: &mut GobsBackend, revs: &[&str]) -> Result<Vec<Commit>> {
        let revs: HashSet<String> = revs.iter().map(|r| r.to_string()).collect();
        b.get(&revs)?.collect()
    }

    #[test]
    fn get_returns_only_requested_commits() {
        let dir = tempdir().unwrap();
        let mut b = backend(dir.path());
        b.open().unwrap();

        b.add(&[commit("c1")]).unwrap();
        let got = get_all(&mut b, &["c1", "c2"]).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].hash, "c1");

        b.add(&[commit("c2")]).unwrap();
        let got = get_all(&mut b, &["c1", "c2"]).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].hash, "c1");
        assert_eq!(got[1].hash, "c2");
    }

    #[test]
    fn duplicate_commit_is_an_error() {
        let dir = tempdir().unwrap();
        let mut b = backend(dir.path());
        b.open().unwrap();

        b.add(&[commit("c1")]).unwrap();
        b.add(&[commit("c1")]).unwrap();

        let err = get_all(&mut b, &["c1"]).unwrap_err();
        assert!(err.to_string().contains("duplicate commit"));
        assert!(err.to_string().contains("c1"));
    }

    #[test]
    fn commits_survive_a_close_and_reopen() {
        let dir = tempdir().unwrap();

        let mut b = backend(dir.path());
        b.open().unwrap();
        b.add(&[commit("c1"), commit("c2")]).unwrap();
        b.close().unwrap();

        // Only the compressed file remains at rest.
        assert!(dir.path().join("state.gobs.gz").exists());
        assert!(!dir.path().join("state.gobs").exists());

        let mut b = backend(dir.path());
        b.open().unwrap();
        let got = get_all(&mut b, &["c1", "c2"]).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], commit("c1"));
    }

    #[test]
    fn close_prunes_stale_siblings() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("stale.gobs.gz"), b"old").unwrap();

        let mut b = backend(dir.path());
        b.open().unwrap();
        b.add(&[commit("c1")]).unwrap();
        b.close().unwrap();

        assert!(dir.path().join("state.gobs.gz").exists());
        assert!(!dir.path().join("stale.gobs.gz").exists());
    }

    #[test]
    fn clear_removes_the_cache_dir() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("repo-cache");
        std::fs::create_dir_all(&sub).unwrap();

        let mut b = GobsBackend::new(sub.clone(), sub.join("state.gobs"));
        b.open().unwrap();
        b.add(&[commit("c1")]).unwrap();
        b.clear().unwrap();

        assert!(!sub.exists());
        // Clearing twice is fine.
        b.clear().unwrap();
    }

    #[test]
    fn missing_file_yields_empty_stream() {
        let dir = tempdir().unwrap();
        let mut b = backend(dir.path());
        b.open().unwrap();
        assert!(get_all(&mut b, &["c1"]).unwrap().is_empty());
    }
}
