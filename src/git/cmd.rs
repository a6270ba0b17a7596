//! Runs git as a subprocess and exposes its output as token streams.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use tracing::debug;

use crate::error::{GitWhoError, Result};

/// A running git subprocess with piped stdio.
///
/// Dropping an unwaited `GitCmd` kills the child, which is how a cancelled
/// query tears down its subprocesses.
pub struct GitCmd {
    child: Child,
    waited: bool,
}

impl GitCmd {
    pub fn spawn(args: &[String], need_stdin: bool) -> Result<GitCmd> {
        debug!(?args, "running git subprocess");

        let stdin = if need_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        };

        let child = Command::new("git")
            .args(args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                GitWhoError::Input(format!("failed to start git subprocess: {e}"))
            })?;

        Ok(GitCmd {
            child,
            waited: false,
        })
    }

    /// Take the stdin handle. Closing it (by dropping) signals EOF to git.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Single-use iterator over stdout, line by line.
    pub fn stdout_lines(&mut self) -> impl Iterator<Item = std::io::Result<String>> {
        let stdout = self.child.stdout.take().expect("stdout not piped or already taken");
        BufReader::new(stdout).lines()
    }

    /// Single-use iterator over stdout tokens, split on both newline and NUL.
    pub fn stdout_log_tokens(&mut self) -> LogTokens<ChildStdout> {
        let stdout = self.child.stdout.take().expect("stdout not piped or already taken");
        LogTokens::new(stdout)
    }

    /// Drain stderr, wait for the process, and report a non-zero exit as an
    /// error carrying the trimmed stderr text.
    pub fn wait(&mut self) -> Result<()> {
        debug!("waiting for subprocess...");

        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            pipe.read_to_string(&mut stderr)?;
        }

        let status = self.child.wait()?;
        self.waited = true;
        debug!(code = status.code(), "subprocess exited");

        if status.success() {
            Ok(())
        } else {
            Err(GitWhoError::Subprocess {
                code: status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

impl Drop for GitCmd {
    fn drop(&mut self) {
        if !self.waited {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Splits a byte stream into tokens terminated by newline (0x0A) or NUL
/// (0x00), whichever comes first. Trailing bytes at end-of-stream form a
/// final token.
pub struct LogTokens<R: Read> {
    reader: BufReader<R>,
    done: bool,
}

impl<R: Read> LogTokens<R> {
    pub fn new(inner: R) -> Self {
        LogTokens {
            reader: BufReader::new(inner),
            done: false,
        }
    }
}

impl<R: Read> Iterator for LogTokens<R> {
    type Item = std::io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut token: Vec<u8> = Vec::new();
        loop {
            let buf = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            if buf.is_empty() {
                // EOF: any bytes collected so far form the final token.
                self.done = true;
                if token.is_empty() {
                    return None;
                }
                return Some(Ok(String::from_utf8_lossy(&token).into_owned()));
            }

            let delim = buf.iter().position(|&b| b == b'\n' || b == b'\0');
            match delim {
                Some(i) => {
                    token.extend_from_slice(&buf[..i]);
                    self.reader.consume(i + 1);
                    return Some(Ok(String::from_utf8_lossy(&token).into_owned()));
                }
                None => {
                    token.extend_from_slice(buf);
                    let n = buf.len();
                    self.reader.consume(n);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tokens(input: &[u8]) -> Vec<String> {
        LogTokens::new(Cursor::new(input.to_vec()))
            .map(|t| t.unwrap())
            .collect()
    }

    #[test]
    fn splits_on_newline_and_nul() {
        assert_eq!(tokens(b"a\nb\0c\n"), vec!["a", "b", "c"]);
    }

    #[test]
    fn trailing_bytes_form_final_token() {
        assert_eq!(tokens(b"a\nbcd"), vec!["a", "bcd"]);
    }

    #[test]
    fn adjacent_delimiters_yield_empty_tokens() {
        assert_eq!(tokens(b"a\n\nb\0"), vec!["a", "", "b"]);
    }

    #[test]
    fn empty_stream_yields_nothing() {
        assert!(tokens(b"").is_empty());
    }
}
