pub mod cache;
pub mod cli;
pub mod commands;
pub mod concurrent;
pub mod error;
pub mod format;
pub mod git;
pub mod tally;

pub use error::{GitWhoError, Result};
