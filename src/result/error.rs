//! Error types for popen-expect

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while launching a process or expecting its output.
///
/// `NotFound` and `Timeout` leave the session usable: the buffer is kept and
/// the next call picks up where this one stopped. `Eof` is terminal, every
/// later call on the same session reports it again.
///
/// # Examples
///
/// ```no_run
/// use popen_expect::{ExpectError, Session};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = Session::builder()
///     .timeout(Duration::from_secs(5))
///     .spawn("some-command", &[])?;
///
/// match session.expect("done").await {
///     Ok(matched) => println!("Matched: {}", String::from_utf8_lossy(&matched)),
///     Err(ExpectError::Timeout { duration }) => {
///         eprintln!("Nothing arrived within {:?}", duration);
///     }
///     Err(ExpectError::Eof) => {
///         eprintln!("Process exited");
///     }
///     Err(e) => return Err(e.into()),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Error, Debug)]
pub enum ExpectError {
    /// `expect_cases` was called with an empty case list.
    #[error("cases expected")]
    NoCases,

    /// The buffer holds data but no case matched it.
    ///
    /// Returned only when no not-matched handler is installed, or the handler
    /// declined to skip any bytes.
    #[error("not matched")]
    NotFound,

    /// Nothing was buffered when the poll window elapsed.
    #[error("timed out (after {duration:?})")]
    Timeout {
        /// Length of the poll window that elapsed
        duration: Duration,
    },

    /// The process exited or its output stream closed.
    #[error("end of stream")]
    Eof,

    /// Malformed expression passed to `expect`.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Pseudo-terminal allocation or configuration failed.
    #[error("PTY error: {0}")]
    Pty(String),

    /// The child process could not be started.
    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    /// Waiting on the child process failed.
    #[error("Failed to wait for process: {0}")]
    Wait(String),
}

impl ExpectError {
    /// Whether a later `expect` call on the same session may still succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExpectError::NotFound | ExpectError::Timeout { .. })
    }
}
