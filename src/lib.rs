//! popen-expect: drive interactive programs over pipes or a pseudo-terminal
//!
//! A [`Session`] starts a child process, pumps its standard streams on
//! background threads, and matches the accumulated output against ordered
//! [`Case`]s, in the spirit of the Unix `expect` utility.
//!
//! # Features
//!
//! - **Two transports**: plain OS pipes, or a raw-mode pseudo-terminal that
//!   the child sees as its controlling terminal
//! - **Async/await**: expect calls are `async` and built on tokio
//! - **Ordered cases**: the first case matching at the scan position wins
//! - **Skip-till and callbacks**: discard noise lines or react to a match
//!   and keep scanning, without waiting for new output
//! - **Backpressure**: at most a few chunks are read ahead of the matcher
//! - **Colour stripping**: optional removal of ANSI colour sequences
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use popen_expect::Session;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::builder()
//!         .timeout(Duration::from_secs(5))
//!         .spawn("cat", &[])?;
//!
//!     session.send("ping\n").await?;
//!     let echoed = session.expect("ping").await?;
//!     assert_eq!(echoed, b"ping");
//!
//!     session.close();
//!     Ok(())
//! }
//! ```
//!
//! # Cases
//!
//! [`Session::expect_cases`] takes a list of [`Case`]s. A case either
//! reports only its matched span ([`Case::matched_only`]) or the whole
//! buffer ([`Case::whole_buffer`]), may discard bytes up to a sentinel
//! instead of reporting ([`Case::skip_till`]), and may carry a callback that
//! decides whether the match ends the call ([`Case::on_match`]).
//!
//! ```rust,no_run
//! use popen_expect::{Case, Session, Verdict};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let mut session = Session::spawn_pty("sh", &[])?;
//! let mut cases = [
//!     Case::regex(r"^#.*")?.skip_till(b'\n'),
//!     Case::regex(r"login: $")?.matched_only(),
//!     Case::regex(r"Password: $")?.matched_only(),
//! ];
//! match session.expect_cases(&mut cases).await?.case_index {
//!     1 => session.send_line("admin").await?,
//!     2 => session.send_line("secret").await?,
//!     _ => unreachable!(),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Custom stream handling
//!
//! [`launch`] and [`launch_pty`] start a process for any
//! [`StreamConsumer`], for callers that want the streams without the
//! matching engine.

#![warn(missing_docs)]

mod buffer;
mod pattern;
mod process;
mod result;
mod session;

// Public API exports
pub use pattern::{Case, MatchCallback, Verdict};
pub use process::{
    launch, launch_pty, launch_pty_sized, ExitSignal, ExitState, ProcessHandle, StreamConsumer,
};
pub use result::{ExpectError, MatchResult};
pub use session::{NotMatchedHandler, Session, SessionBuilder};

// Re-export commonly used types
pub use portable_pty::PtySize;
pub use regex::bytes::Regex;
