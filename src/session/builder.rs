//! Session builder for configuration

use super::pump::{Pump, Transport};
use super::{NotMatchedHandler, Session};
use crate::buffer::Buffer;
use crate::process::{launch, launch_pty_sized};
use crate::result::ExpectError;
use portable_pty::PtySize;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Default per-poll timeout for expect operations
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Chunks the output thread may queue ahead of the engine
pub(crate) const INBOUND_CAPACITY: usize = 5;

/// Messages `send` may queue ahead of the input thread
pub(crate) const OUTBOUND_CAPACITY: usize = 64;

/// Bytes requested per read of the child's output
pub(crate) const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Pause after a read that found no data
pub(crate) const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Builder for configuring and spawning sessions.
///
/// # Defaults
///
/// - Timeout: 1 second per poll
/// - Colour stripping: disabled
/// - Not-matched handler: none
/// - Read chunk size: 1024 bytes
/// - Retry interval: 100 milliseconds
/// - PTY size: 24 rows × 80 columns
///
/// # Examples
///
/// ```no_run
/// use popen_expect::Session;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Session::builder()
///     .timeout(Duration::from_secs(10))
///     .strip_colors(true)
///     .env("TERM", "dumb")
///     .pty_size(40, 120)
///     .spawn_pty("bash", &["--norc"])?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    timeout: Duration,
    strip_colors: bool,
    env: HashMap<String, String>,
    not_matched: Option<NotMatchedHandler>,
    chunk_size: usize,
    retry_interval: Duration,
    pty_size: PtySize,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Create a builder with default configuration.
    ///
    /// See the [`SessionBuilder`] documentation for default values.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            strip_colors: false,
            env: HashMap::new(),
            not_matched: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            pty_size: crate::process::DEFAULT_PTY_SIZE,
        }
    }

    /// Set the per-poll timeout.
    ///
    /// An expect call fails with [`ExpectError::Timeout`] when a poll of
    /// this length ends with nothing buffered.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable stripping of ANSI colour and erase-line sequences.
    pub fn strip_colors(mut self, strip: bool) -> Self {
        self.strip_colors = strip;
        self
    }

    /// Add one environment variable on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add several environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Install a handler for scan passes that match no case.
    ///
    /// See [`NotMatchedHandler`].
    pub fn not_matched_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&[u8]) -> usize + Send + 'static,
    {
        self.not_matched = Some(Box::new(handler));
        self
    }

    /// Bytes requested per read of the child's output. At least 1.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// How long the output thread sleeps when a read finds no data.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the pseudo-terminal size. Ignored for plain pipes.
    pub fn pty_size(mut self, rows: u16, cols: u16) -> Self {
        self.pty_size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        self
    }

    /// Start `program` over plain pipes.
    ///
    /// # Errors
    ///
    /// Returns [`ExpectError::Spawn`] if the process cannot be started.
    pub fn spawn(self, program: &str, args: &[&str]) -> Result<Session, ExpectError> {
        self.build(Transport::Pipe, program, args)
    }

    /// Start `program` on a pseudo-terminal.
    ///
    /// # Errors
    ///
    /// Returns [`ExpectError::Pty`] if the terminal cannot be set up, or
    /// [`ExpectError::Spawn`] if the process cannot be started.
    pub fn spawn_pty(self, program: &str, args: &[&str]) -> Result<Session, ExpectError> {
        self.build(Transport::Pty, program, args)
    }

    fn build(
        self,
        transport: Transport,
        program: &str,
        args: &[&str],
    ) -> Result<Session, ExpectError> {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let strip_colors = Arc::new(AtomicBool::new(self.strip_colors));

        let pump = Arc::new(Pump::new(
            outbound_rx,
            inbound_tx,
            strip_colors.clone(),
            self.env,
            transport,
            self.chunk_size,
            self.retry_interval,
        ));

        let process = match transport {
            Transport::Pipe => launch(pump, program, args)?,
            Transport::Pty => launch_pty_sized(pump, program, args, self.pty_size)?,
        };

        Ok(Session {
            process,
            outbound: Some(outbound_tx),
            inbound: inbound_rx,
            buffer: Buffer::new(),
            timeout: self.timeout,
            strip_colors,
            not_matched: self.not_matched,
            eof: false,
        })
    }
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("timeout", &self.timeout)
            .field("strip_colors", &self.strip_colors)
            .field("env", &self.env)
            .field("not_matched", &self.not_matched.is_some())
            .field("chunk_size", &self.chunk_size)
            .field("retry_interval", &self.retry_interval)
            .field("pty_size", &(self.pty_size.rows, self.pty_size.cols))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let builder = SessionBuilder::default();
        assert_eq!(builder.timeout, Duration::from_secs(1));
        assert!(!builder.strip_colors);
        assert!(builder.env.is_empty());
        assert!(builder.not_matched.is_none());
        assert_eq!(builder.chunk_size, 1024);
        assert_eq!(builder.retry_interval, Duration::from_millis(100));
        assert_eq!((builder.pty_size.rows, builder.pty_size.cols), (24, 80));
    }

    #[test]
    fn test_options() {
        let builder = SessionBuilder::new()
            .timeout(Duration::from_millis(250))
            .strip_colors(true)
            .env("A", "1")
            .envs([("B", "2"), ("A", "3")])
            .not_matched_handler(|buf| buf.len())
            .chunk_size(0)
            .retry_interval(Duration::from_millis(5))
            .pty_size(40, 120);

        assert_eq!(builder.timeout, Duration::from_millis(250));
        assert!(builder.strip_colors);
        assert_eq!(builder.env.get("A").map(String::as_str), Some("3"));
        assert_eq!(builder.env.get("B").map(String::as_str), Some("2"));
        assert!(builder.not_matched.is_some());
        assert_eq!(builder.chunk_size, 1);
        assert_eq!(builder.retry_interval, Duration::from_millis(5));
        assert_eq!((builder.pty_size.rows, builder.pty_size.cols), (40, 120));
    }

    #[test]
    fn test_spawn_missing_program() {
        let err = SessionBuilder::new()
            .spawn("/nonexistent/popen-expect-test", &[])
            .unwrap_err();
        assert!(matches!(err, ExpectError::Spawn(_)));
    }

    #[test]
    fn test_debug_hides_handler() {
        let builder = SessionBuilder::new().not_matched_handler(|_| 0);
        let debug = format!("{builder:?}");
        assert!(debug.contains("not_matched: true"));
    }
}
