use std::collections::HashSet;

use crate::cache::CommitStream;
use crate::error::Result;
use crate::git::Commit;

/// Backend used when caching is disabled.
pub struct NoopBackend;

impl crate::cache::Backend for NoopBackend {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn get(&mut self, _revs: &HashSet<String>) -> Result<CommitStream> {
        Ok(Box::new(std::iter::empty()))
    }

    fn add(&mut self, _commits: &[Commit]) -> Result<()> {
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        Ok(())
    }
}
