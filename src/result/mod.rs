//! Result types for expect operations

mod error;

pub use error::ExpectError;

use std::borrow::Cow;

/// Result of a successful `expect_cases` call.
///
/// # Examples
///
/// ```no_run
/// use popen_expect::{Case, Regex, Session};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let mut session = Session::spawn("sh", &[])?;
/// let mut cases = [
///     Case::new(Regex::new("ok")?).matched_only(),
///     Case::new(Regex::new("error")?).whole_buffer(),
/// ];
/// let result = session.expect_cases(&mut cases).await?;
///
/// println!("Case {} matched: {}", result.case_index, result.text());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Index of the case that matched, in the order the cases were supplied.
    pub case_index: usize,

    /// The reported bytes.
    ///
    /// For a matched-only case this is exactly the matched span; for a
    /// whole-buffer case it is every unconsumed byte that was buffered when
    /// the match happened.
    pub matched: Vec<u8>,
}

impl MatchResult {
    /// The reported bytes as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.matched)
    }
}
