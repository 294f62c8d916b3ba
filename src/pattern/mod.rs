//! Match rules for expect operations

mod scan;

pub(crate) use scan::{scan, Scan};

use regex::bytes::Regex;
use std::fmt;

/// What a matched callback wants the engine to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Consume the match and keep scanning the rest of the buffer.
    Continue,
    /// Return this match to the caller.
    Stop,
}

/// Callback invoked with the matched span of a case.
pub type MatchCallback = Box<dyn FnMut(&[u8]) -> Verdict + Send>;

/// One match rule evaluated by [`Session::expect_cases`](crate::Session::expect_cases).
///
/// Cases are tried in the order they are supplied, and the first one whose
/// pattern matches anywhere in the buffer wins the pass. A later case never
/// wins over an earlier one, even when its match starts sooner.
///
/// By default a case reports the whole buffer and clears it. Call
/// [`matched_only`](Case::matched_only) to report just the matched span and
/// keep the bytes after it.
///
/// # Examples
///
/// ```
/// use popen_expect::{Case, Verdict};
/// use regex::bytes::Regex;
///
/// // Drop status lines up to their newline instead of reporting them.
/// let status = Case::new(Regex::new(r"^\[status\]").unwrap()).skip_till(b'\n');
///
/// // Count warnings but keep waiting for the prompt.
/// let mut warnings = 0;
/// let warning = Case::new(Regex::new(r"warning: [^\n]*").unwrap())
///     .matched_only()
///     .on_match(move |_| {
///         warnings += 1;
///         Verdict::Continue
///     });
///
/// let prompt = Case::regex(r"\$ $").unwrap().matched_only();
/// # let _ = (status, warning, prompt);
/// ```
pub struct Case {
    pattern: Regex,
    skip_till: Option<u8>,
    matched_only: bool,
    on_match: Option<MatchCallback>,
}

impl Case {
    /// Create a whole-buffer case from a compiled pattern.
    pub fn new(pattern: Regex) -> Self {
        Self {
            pattern,
            skip_till: None,
            matched_only: false,
            on_match: None,
        }
    }

    /// Compile `expr` and create a whole-buffer case from it.
    ///
    /// # Errors
    ///
    /// Returns a regex error if `expr` is not a valid expression.
    pub fn regex(expr: &str) -> Result<Self, regex::Error> {
        Ok(Self::new(Regex::new(expr)?))
    }

    /// Report only the matched span and keep the bytes after it buffered.
    pub fn matched_only(mut self) -> Self {
        self.matched_only = true;
        self
    }

    /// Report the whole buffer and clear it (the default).
    pub fn whole_buffer(mut self) -> Self {
        self.matched_only = false;
        self
    }

    /// Instead of reporting a match, discard everything up to and including
    /// the first `byte` in the buffer.
    ///
    /// If `byte` is not buffered yet, a match reports the whole buffer, even
    /// on a [`matched_only`](Case::matched_only) case.
    pub fn skip_till(mut self, byte: u8) -> Self {
        self.skip_till = Some(byte);
        self
    }

    /// Install a callback that sees each matched span and decides whether the
    /// call returns.
    pub fn on_match<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&[u8]) -> Verdict + Send + 'static,
    {
        self.on_match = Some(Box::new(callback));
        self
    }

    /// The compiled pattern
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Whether the case reports only the matched span
    pub fn is_matched_only(&self) -> bool {
        self.matched_only
    }

    /// The skip-till sentinel, if any
    pub fn skip_till_byte(&self) -> Option<u8> {
        self.skip_till
    }

    fn verdict(&mut self, matched: &[u8]) -> Verdict {
        match self.on_match.as_mut() {
            Some(callback) => callback(matched),
            None => Verdict::Stop,
        }
    }
}

impl fmt::Debug for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Case")
            .field("pattern", &self.pattern.as_str())
            .field("skip_till", &self.skip_till)
            .field("matched_only", &self.matched_only)
            .field("on_match", &self.on_match.is_some())
            .finish()
    }
}
