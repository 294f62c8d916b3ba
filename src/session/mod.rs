//! Expect sessions over a spawned process

mod builder;
mod pump;

pub use builder::SessionBuilder;

use crate::buffer::Buffer;
use crate::pattern::{scan, Case, Scan, Verdict};
use crate::process::ProcessHandle;
use crate::result::{ExpectError, MatchResult};
use bytes::Bytes;
use regex::bytes::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Called when a scan pass matches no case.
///
/// Receives the unconsumed buffer and returns how many bytes to discard from
/// its front before waiting for more output. Returning 0 makes the expect
/// call fail with [`ExpectError::NotFound`].
pub type NotMatchedHandler = Box<dyn FnMut(&[u8]) -> usize + Send>;

/// A running child process and the expect engine driving it.
///
/// Output is read on background threads and handed over in chunks; the
/// matching itself only runs inside the `expect*` calls, on the caller's
/// task.
///
/// # Examples
///
/// ```no_run
/// use popen_expect::Session;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = Session::builder()
///     .timeout(Duration::from_secs(5))
///     .spawn_pty("python3", &["-i"])?;
///
/// session.expect(">>> ").await?;
/// session.send_line("print('Hello')").await?;
/// let out = session.expect(r"Hello\r?\n").await?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    process: ProcessHandle,
    outbound: Option<mpsc::Sender<Vec<u8>>>,
    inbound: mpsc::Receiver<Bytes>,
    buffer: Buffer,
    timeout: Duration,
    strip_colors: Arc<AtomicBool>,
    not_matched: Option<NotMatchedHandler>,
    eof: bool,
}

/// What woke the matching loop
enum Event {
    Exited,
    Chunk(Option<Bytes>),
    Tick,
}

impl Session {
    /// Create a builder with default configuration.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Start `program` over plain pipes with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ExpectError::Spawn`] if the process cannot be started.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use popen_expect::Session;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let session = Session::spawn("cat", &[])?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn spawn(program: &str, args: &[&str]) -> Result<Self, ExpectError> {
        SessionBuilder::new().spawn(program, args)
    }

    /// Start `program` over plain pipes, adding `env` to the inherited
    /// environment.
    ///
    /// # Errors
    ///
    /// See [`Session::spawn`].
    pub fn spawn_with_env<I, K, V>(
        env: I,
        program: &str,
        args: &[&str],
    ) -> Result<Self, ExpectError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        SessionBuilder::new().envs(env).spawn(program, args)
    }

    /// Start `program` on a pseudo-terminal with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ExpectError::Pty`] if the terminal cannot be set up, or
    /// [`ExpectError::Spawn`] if the process cannot be started.
    pub fn spawn_pty(program: &str, args: &[&str]) -> Result<Self, ExpectError> {
        SessionBuilder::new().spawn_pty(program, args)
    }

    /// Start `program` on a pseudo-terminal, adding `env` to the inherited
    /// environment.
    ///
    /// # Errors
    ///
    /// See [`Session::spawn_pty`].
    pub fn spawn_pty_with_env<I, K, V>(
        env: I,
        program: &str,
        args: &[&str],
    ) -> Result<Self, ExpectError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        SessionBuilder::new().envs(env).spawn_pty(program, args)
    }

    /// Set how long each wait for output may last before the buffer is
    /// scanned anyway.
    ///
    /// This bounds a single poll, not a whole `expect*` call: a call keeps
    /// polling for as long as output keeps arriving without a match.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Strip ANSI colour and erase-line sequences from output read from now on.
    pub fn enable_color_stripping(&mut self) {
        self.strip_colors.store(true, Ordering::Relaxed);
    }

    /// Install a handler for scan passes that match no case.
    pub fn set_not_matched_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&[u8]) -> usize + Send + 'static,
    {
        self.not_matched = Some(Box::new(handler));
    }

    /// Queue `data` for the child's standard input.
    ///
    /// Returns once the data is queued, which only waits if the queue is
    /// full. Control characters are sent as-is:
    ///
    /// ```no_run
    /// use popen_expect::Session;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let session = Session::spawn_pty("sh", &[])?;
    /// // Ctrl-C
    /// session.send([0x03u8]).await?;
    /// session.send("password\r").await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ExpectError::Eof`] once the session is closed or the input
    /// stream has failed.
    pub async fn send(&self, data: impl AsRef<[u8]>) -> Result<(), ExpectError> {
        let outbound = self.outbound.as_ref().ok_or(ExpectError::Eof)?;
        let data = data.as_ref().to_vec();
        trace!(len = data.len(), "queueing input");
        outbound.send(data).await.map_err(|_| ExpectError::Eof)
    }

    /// Queue `line` followed by a newline.
    ///
    /// # Errors
    ///
    /// See [`Session::send`].
    pub async fn send_line(&self, line: &str) -> Result<(), ExpectError> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.send(data).await
    }

    /// Wait until `pattern` appears and return the matched bytes.
    ///
    /// Bytes after the match stay buffered for the next call.
    ///
    /// # Errors
    ///
    /// Returns [`ExpectError::Pattern`] if `pattern` does not compile, and
    /// otherwise the errors of [`Session::expect_cases`].
    pub async fn expect(&mut self, pattern: &str) -> Result<Vec<u8>, ExpectError> {
        let pattern = Regex::new(pattern)?;
        self.expect_regex(&pattern).await
    }

    /// Like [`Session::expect`], with `callback` deciding whether each match
    /// ends the call.
    ///
    /// # Errors
    ///
    /// See [`Session::expect`].
    pub async fn expect_with<F>(
        &mut self,
        pattern: &str,
        callback: F,
    ) -> Result<Vec<u8>, ExpectError>
    where
        F: FnMut(&[u8]) -> Verdict + Send + 'static,
    {
        let pattern = Regex::new(pattern)?;
        self.expect_regex_with(&pattern, callback).await
    }

    /// Wait until a compiled pattern appears and return the matched bytes.
    ///
    /// # Errors
    ///
    /// See [`Session::expect_cases`].
    pub async fn expect_regex(&mut self, pattern: &Regex) -> Result<Vec<u8>, ExpectError> {
        let mut cases = [Case::new(pattern.clone()).matched_only()];
        Ok(self.expect_cases(&mut cases).await?.matched)
    }

    /// Like [`Session::expect_regex`], with a match callback.
    ///
    /// # Errors
    ///
    /// See [`Session::expect_cases`].
    pub async fn expect_regex_with<F>(
        &mut self,
        pattern: &Regex,
        callback: F,
    ) -> Result<Vec<u8>, ExpectError>
    where
        F: FnMut(&[u8]) -> Verdict + Send + 'static,
    {
        let mut cases = [Case::new(pattern.clone()).matched_only().on_match(callback)];
        Ok(self.expect_cases(&mut cases).await?.matched)
    }

    /// Wait until one of `cases` matches.
    ///
    /// Each iteration waits for the first of: process exit, a chunk of
    /// output, or the session timeout. The buffer is then scanned with the
    /// cases in order, and the first case matching at the current position
    /// wins. Matches whose callback returns [`Verdict::Continue`] and
    /// skip-till discards rescan the rest of the buffer without waiting.
    ///
    /// # Errors
    ///
    /// - [`ExpectError::NoCases`] if `cases` is empty
    /// - [`ExpectError::Eof`] once the process has exited or its output has
    ///   closed; every later call fails the same way
    /// - [`ExpectError::Timeout`] if a poll timed out with nothing buffered
    /// - [`ExpectError::NotFound`] if nothing matched and no not-matched
    ///   handler discarded any bytes
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use popen_expect::{Case, Session, Verdict};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let mut session = Session::spawn("sh", &[])?;
    /// let mut cases = [
    ///     Case::regex(r"progress \d+%")?.skip_till(b'\n'),
    ///     Case::regex(r"warning: .*\n")?
    ///         .matched_only()
    ///         .on_match(|line| {
    ///             eprint!("{}", String::from_utf8_lossy(line));
    ///             Verdict::Continue
    ///         }),
    ///     Case::regex(r"\$ $")?.matched_only(),
    /// ];
    ///
    /// let result = session.expect_cases(&mut cases).await?;
    /// assert_eq!(result.case_index, 2);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn expect_cases(&mut self, cases: &mut [Case]) -> Result<MatchResult, ExpectError> {
        if cases.is_empty() {
            return Err(ExpectError::NoCases);
        }

        loop {
            if self.eof {
                return Err(ExpectError::Eof);
            }

            let exit = self.process.exit_signal().clone();
            let event = tokio::select! {
                biased;
                _ = exit.exited() => Event::Exited,
                chunk = self.inbound.recv() => Event::Chunk(chunk),
                () = tokio::time::sleep(self.timeout) => Event::Tick,
            };

            match event {
                Event::Exited => {
                    debug!(buffered = self.buffer.len(), "process exited while expecting");
                    self.eof = true;
                    return Err(ExpectError::Eof);
                }
                Event::Chunk(None) => {
                    debug!(buffered = self.buffer.len(), "output closed while expecting");
                    self.eof = true;
                    return Err(ExpectError::Eof);
                }
                Event::Chunk(Some(chunk)) => self.buffer.append(&chunk),
                Event::Tick => {}
            }

            if self.buffer.is_empty() {
                return Err(ExpectError::Timeout {
                    duration: self.timeout,
                });
            }

            match scan(&mut self.buffer, cases) {
                Scan::Matched(result) => {
                    debug!(case = result.case_index, len = result.matched.len(), "matched");
                    return Ok(result);
                }
                Scan::Pending => {}
                Scan::NoMatch => {
                    let skip = match self.not_matched.as_mut() {
                        Some(handler) => handler(self.buffer.as_bytes()),
                        None => 0,
                    };
                    if skip == 0 {
                        return Err(ExpectError::NotFound);
                    }
                    trace!(skip, "not-matched handler discarding");
                    self.buffer.consume(skip.min(self.buffer.len()));
                }
            }
        }
    }

    /// Wait for the child to exit and return its exit code.
    ///
    /// A child killed by a signal reports -1.
    ///
    /// # Errors
    ///
    /// Returns [`ExpectError::Wait`] if the OS wait call failed.
    pub async fn wait(&self) -> Result<i32, ExpectError> {
        self.process.wait().await
    }

    /// Kill the child and release its descriptors.
    ///
    /// Safe to call more than once. Later `send` calls fail with
    /// [`ExpectError::Eof`].
    pub fn close(&mut self) {
        self.outbound = None;
        self.process.close();
    }

    /// Whether the child is still running.
    pub fn is_alive(&self) -> bool {
        !self.process.has_exited()
    }

    /// OS process id of the child
    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    /// Output received but not yet consumed by a match.
    pub fn buffer(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    /// The per-poll timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("process", &self.process)
            .field("buffered", &self.buffer.len())
            .field("timeout", &self.timeout)
            .field("strip_colors", &self.strip_colors.load(Ordering::Relaxed))
            .field("not_matched", &self.not_matched.is_some())
            .field("eof", &self.eof)
            .finish()
    }
}
