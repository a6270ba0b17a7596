//! Cache for storing commits we've already diffed and parsed.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, warn};

use crate::error::Result;
use crate::git::Commit;

pub mod gobs;
pub mod noop;

pub use gobs::GobsBackend;
pub use noop::NoopBackend;

/// A lazy stream of cached commits. Read errors and corruption surface as
/// `Err` items mid-stream.
pub type CommitStream = Box<dyn Iterator<Item = Result<Commit>> + Send>;

/// Storage strategy for the commit cache.
pub trait Backend: Send {
    fn name(&self) -> &'static str;
    fn open(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn get(&mut self, revs: &HashSet<String>) -> Result<CommitStream>;
    fn add(&mut self, commits: &[Commit]) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
}

pub struct Cache {
    backend: Box<dyn Backend>,
}

impl Cache {
    pub fn new(backend: Box<dyn Backend>) -> Cache {
        Cache { backend }
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn open(&mut self) -> Result<()> {
        let start = Instant::now();
        self.backend
            .open()
            .map_err(|e| crate::error::GitWhoError::Cache(format!("error opening cache: {e}")))?;
        debug!(duration_ms = start.elapsed().as_millis() as u64, "cache open");
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        let start = Instant::now();
        self.backend
            .close()
            .map_err(|e| crate::error::GitWhoError::Cache(format!("error closing cache: {e}")))?;
        debug!(duration_ms = start.elapsed().as_millis() as u64, "cache close");
        Ok(())
    }

    pub fn get(&mut self, revs: &HashSet<String>) -> Result<CommitStream> {
        let start = Instant::now();
        let stream = self.backend.get(revs).map_err(|e| {
            crate::error::GitWhoError::Cache(format!("failed to retrieve from cache: {e}"))
        })?;
        debug!(duration_ms = start.elapsed().as_millis() as u64, "cache get");
        Ok(stream)
    }

    pub fn add(&mut self, commits: &[Commit]) -> Result<()> {
        let start = Instant::now();
        self.backend.add(commits)?;
        debug!(duration_ms = start.elapsed().as_millis() as u64, "cache add");
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.backend.clear()?;
        debug!("cache clear");
        Ok(())
    }
}

pub fn is_caching_enabled() -> bool {
    std::env::var_os("GIT_WHO_DISABLE_CACHE")
        .map_or(true, |v| v.is_empty())
}

/// The directory where a cache backend stores its data, honoring
/// `XDG_CACHE_HOME` and falling back to `~/.cache`.
pub fn cache_storage_dir(name: &str) -> Result<PathBuf> {
    let cache_home = match std::env::var_os("XDG_CACHE_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .ok_or_else(|| {
                crate::error::GitWhoError::Cache(
                    "failed to determine cache storage path: no home directory".to_string(),
                )
            })?
            .join(".cache"),
    };

    Ok(cache_home.join("git-who").join(name))
}

/// Hash of repo state that, when changed, should invalidate the cache.
/// Currently that's just the mailmap file; an absent mailmap hashes to the
/// empty digest.
pub fn repo_state_hash(git_root_path: &str) -> Result<String> {
    let mailmap = PathBuf::from(git_root_path).join(".mailmap");

    let contents = match std::fs::read(&mailmap) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            return Err(crate::error::GitWhoError::Cache(format!(
                "could not read mailmap file: {e}"
            )))
        }
    };

    Ok(format!("{:08x}", fnv1a32(&contents)))
}

pub(crate) fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

fn warn_fail(err: impl std::fmt::Display) -> Cache {
    warn!("failed to initialize cache: {err}");
    warn!("disabling caching");
    Cache::new(Box::new(NoopBackend))
}

/// Builds the cache for the current repository. Falls back to the no-op
/// backend when caching is disabled or any initialization step fails.
pub fn get_cache() -> Cache {
    if !is_caching_enabled() {
        return Cache::new(Box::new(NoopBackend));
    }

    let storage_dir = match cache_storage_dir(gobs::GOBS_BACKEND_NAME) {
        Ok(dir) => dir,
        Err(e) => return warn_fail(e),
    };

    let git_root = match crate::git::get_root() {
        Ok(root) => root,
        Err(e) => return warn_fail(e),
    };

    let dirname = gobs::gobs_cache_dir(&storage_dir, &git_root);
    if let Err(e) = std::fs::create_dir_all(&dirname) {
        return warn_fail(e);
    }

    let filename = match gobs::gobs_cache_filename(&git_root) {
        Ok(name) => name,
        Err(e) => return warn_fail(e),
    };

    let path = dirname.join(filename);
    debug!(path = %path.display(), "cache initialized");
    Cache::new(Box::new(GobsBackend::new(dirname, path)))
}
