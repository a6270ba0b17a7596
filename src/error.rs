use thiserror::Error;

pub type Result<T> = std::result::Result<T, GitWhoError>;

#[derive(Error, Debug)]
pub enum GitWhoError {
    #[error("{0}")]
    Input(String),
    #[error("git exited with code {code}{}", fmt_stderr(.stderr))]
    Subprocess { code: i32, stderr: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("no commits; tree is empty")]
    EmptyTree,
    #[error("cancelled")]
    Cancelled,
    #[error("bad pathspec pattern: {0}")]
    Pattern(#[from] globset::Error),
    #[error("encoding error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn fmt_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(". Error output:\n{stderr}")
    }
}
