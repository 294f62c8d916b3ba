//! One scan pass of the case list over the accumulation buffer
//!
//! This is kept free of I/O so the matching rules can be exercised directly
//! on a buffer. The engine calls [`scan`] once per received chunk or elapsed
//! poll window and acts on the returned [`Scan`].

use super::{Case, Verdict};
use crate::buffer::Buffer;
use crate::result::MatchResult;
use tracing::trace;

/// Outcome of scanning the buffer.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Scan {
    /// A case matched and the call returns with it.
    Matched(MatchResult),
    /// Bytes were skipped or consumed by a continuing callback, but no case
    /// ended the call. More input is needed.
    Pending,
    /// No case matched anywhere in the buffer.
    NoMatch,
}

/// Evaluate `cases` in order against the unconsumed bytes of `buffer`.
///
/// The scan keeps a cursor into the buffer. A skip-till discard or a callback
/// returning [`Verdict::Continue`] moves the cursor forward and restarts the
/// case list on the remaining bytes, without waiting for new input. Bytes
/// behind the cursor are consumed when the scan returns.
pub(crate) fn scan(buffer: &mut Buffer, cases: &mut [Case]) -> Scan {
    let mut cursor = 0;

    'pass: loop {
        let rest = &buffer.as_bytes()[cursor..];
        if rest.is_empty() {
            buffer.clear();
            return if cursor > 0 { Scan::Pending } else { Scan::NoMatch };
        }

        for (index, case) in cases.iter_mut().enumerate() {
            let Some(found) = case.pattern.find(rest) else {
                continue;
            };
            let (start, end) = (found.start(), found.end());

            if let Some(sentinel) = case.skip_till {
                if let Some(pos) = rest.iter().position(|&b| b == sentinel) {
                    if pos + 1 < rest.len() {
                        trace!(case = index, skipped = pos + 1, "skip-till discard");
                        cursor += pos + 1;
                        continue 'pass;
                    }
                    trace!(case = index, skipped = rest.len(), "skip-till discarded buffer");
                    buffer.clear();
                    return Scan::Pending;
                }
            }

            if case.verdict(&rest[start..end]) == Verdict::Continue {
                trace!(case = index, start, end, "match consumed, scanning on");
                // an empty match at the cursor must still make progress
                cursor += end.max(1);
                continue 'pass;
            }

            // a skip-till case without its sentinel always reports the whole buffer
            let matched = if case.matched_only && case.skip_till.is_none() {
                buffer.take_span(cursor + start, cursor + end)
            } else {
                buffer.take_from(cursor)
            };
            trace!(case = index, len = matched.len(), "case matched");
            return Scan::Matched(MatchResult {
                case_index: index,
                matched,
            });
        }

        if cursor > 0 {
            buffer.consume(cursor);
            return Scan::Pending;
        }
        return Scan::NoMatch;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn buffer(data: &[u8]) -> Buffer {
        let mut buffer = Buffer::new();
        buffer.append(data);
        buffer
    }

    fn matched(case_index: usize, bytes: &[u8]) -> Scan {
        Scan::Matched(MatchResult {
            case_index,
            matched: bytes.to_vec(),
        })
    }

    #[test]
    fn test_matched_only_keeps_tail() {
        let mut buf = buffer(b"$ ping\nnext");
        let mut cases = [Case::regex("ping").unwrap().matched_only()];

        assert_eq!(scan(&mut buf, &mut cases), matched(0, b"ping"));
        assert_eq!(buf.as_bytes(), b"\nnext");
    }

    #[test]
    fn test_whole_buffer_returns_everything() {
        let mut buf = buffer(b"leading junk OK trailing");
        let mut cases = [Case::regex("OK").unwrap()];

        assert_eq!(scan(&mut buf, &mut cases), matched(0, b"leading junk OK trailing"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_no_match_leaves_buffer() {
        let mut buf = buffer(b"nothing here");
        let mut cases = [Case::regex("PROMPT>").unwrap()];

        assert_eq!(scan(&mut buf, &mut cases), Scan::NoMatch);
        assert_eq!(buf.as_bytes(), b"nothing here");
    }

    #[test]
    fn test_skip_till_discards_noise_lines() {
        let mut buf = buffer(b"noise1\nnoise2\nPROMPT>");
        let mut cases = [
            Case::regex(r"noise\d").unwrap().skip_till(b'\n'),
            Case::regex("PROMPT>").unwrap().matched_only(),
        ];

        assert_eq!(scan(&mut buf, &mut cases), matched(1, b"PROMPT>"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_skip_till_sentinel_at_final_byte() {
        let mut buf = buffer(b"noise1\n");
        let mut cases = [
            Case::regex(r"noise\d").unwrap().skip_till(b'\n'),
            Case::regex("PROMPT>").unwrap(),
        ];

        assert_eq!(scan(&mut buf, &mut cases), Scan::Pending);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_skip_till_then_nothing_matches_is_pending() {
        let mut buf = buffer(b"noise1\npartial prom");
        let mut cases = [
            Case::regex(r"noise\d").unwrap().skip_till(b'\n'),
            Case::regex("PROMPT>").unwrap(),
        ];

        assert_eq!(scan(&mut buf, &mut cases), Scan::Pending);
        assert_eq!(buf.as_bytes(), b"partial prom");
    }

    #[test]
    fn test_skip_till_without_sentinel_reports_whole_buffer() {
        let mut buf = buffer(b"noise1 no newline yet");
        let mut cases = [Case::regex(r"noise\d").unwrap().skip_till(b'\n').matched_only()];

        // matched-only does not apply to a skip-till case
        assert_eq!(scan(&mut buf, &mut cases), matched(0, b"noise1 no newline yet"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_continue_callback_scans_past_matches() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let mut buf = buffer(b"status 1\nstatus 2\n$ ");
        let mut cases = [
            Case::regex(r"status \d\n").unwrap().matched_only().on_match(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Verdict::Continue
            }),
            Case::regex(r"\$ ").unwrap().matched_only(),
        ];

        assert_eq!(scan(&mut buf, &mut cases), matched(1, b"$ "));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_continue_callback_alone_never_returns() {
        let mut buf = buffer(b"tick tick tick");
        let mut cases = [Case::regex("tick")
            .unwrap()
            .matched_only()
            .on_match(|_| Verdict::Continue)];

        assert_eq!(scan(&mut buf, &mut cases), Scan::Pending);
        // consumed up to the last match end
        assert!(buf.is_empty());
    }

    #[test]
    fn test_continue_on_whole_buffer_case() {
        let mut buf = buffer(b"warn a|warn b|done");
        let mut cases = [
            Case::regex(r"warn \w\|").unwrap().on_match(|_| Verdict::Continue),
            Case::regex("done").unwrap(),
        ];

        assert_eq!(scan(&mut buf, &mut cases), matched(1, b"done"));
    }

    #[test]
    fn test_callback_stop_returns() {
        let mut buf = buffer(b"code=7;rest");
        let mut cases = [Case::regex(r"code=\d")
            .unwrap()
            .matched_only()
            .on_match(|m| {
                assert_eq!(m, b"code=7");
                Verdict::Stop
            })];

        assert_eq!(scan(&mut buf, &mut cases), matched(0, b"code=7"));
        assert_eq!(buf.as_bytes(), b";rest");
    }

    #[test]
    fn test_list_order_beats_position() {
        // A matches later in the buffer than B, and C's match is longer,
        // but A comes first in the list.
        let mut buf = buffer(b"bbb ccccccc aaa");
        let mut cases = [
            Case::regex("aaa").unwrap().matched_only(),
            Case::regex("bbb").unwrap().matched_only(),
            Case::regex("c+").unwrap().matched_only(),
        ];

        assert_eq!(scan(&mut buf, &mut cases), matched(0, b"aaa"));
    }

    #[test]
    fn test_first_case_wins_over_longer_later_case() {
        let mut buf = buffer(b"login: user login: admin");
        let mut cases = [
            Case::regex("login:").unwrap().matched_only(),
            Case::regex("login: admin").unwrap().matched_only(),
        ];

        assert_eq!(scan(&mut buf, &mut cases), matched(0, b"login:"));
        assert_eq!(buf.as_bytes(), b" user login: admin");
    }

    #[test]
    fn test_empty_match_continue_makes_progress() {
        let mut buf = buffer(b"abc");
        let mut cases = [Case::regex("x*")
            .unwrap()
            .matched_only()
            .on_match(|_| Verdict::Continue)];

        assert_eq!(scan(&mut buf, &mut cases), Scan::Pending);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_buffer_is_no_match() {
        let mut buf = Buffer::new();
        let mut cases = [Case::regex("x*").unwrap()];

        assert_eq!(scan(&mut buf, &mut cases), Scan::NoMatch);
    }

    #[test]
    fn test_binary_output() {
        let mut buf = buffer(b"\xff\xfe\x00READY\xff");
        let mut cases = [Case::regex("READY").unwrap().matched_only()];

        assert_eq!(scan(&mut buf, &mut cases), matched(0, b"READY"));
        assert_eq!(buf.as_bytes(), b"\xff");
    }

    proptest! {
        #[test]
        fn matched_only_returns_span_and_suffix(
            prefix in "[a-z ]{0,20}",
            digits in "[0-9]{1,6}",
            suffix in "[a-z ]{0,20}",
        ) {
            let data = format!("{prefix}{digits}{suffix}");
            let mut buf = buffer(data.as_bytes());
            let mut cases = [Case::regex(r"[0-9]+").unwrap().matched_only()];

            prop_assert_eq!(scan(&mut buf, &mut cases), matched(0, digits.as_bytes()));
            prop_assert_eq!(buf.as_bytes(), suffix.as_bytes());
        }

        #[test]
        fn whole_buffer_returns_all_and_clears(data in "[a-z ]{0,30}X[a-z ]{0,30}") {
            let mut buf = buffer(data.as_bytes());
            let mut cases = [Case::regex("X").unwrap()];

            prop_assert_eq!(scan(&mut buf, &mut cases), matched(0, data.as_bytes()));
            prop_assert!(buf.is_empty());
        }

        #[test]
        fn skip_till_never_reports_noise(lines in proptest::collection::vec("[a-z]{1,8}", 0..6)) {
            let mut data = String::new();
            for line in &lines {
                data.push_str("noise ");
                data.push_str(line);
                data.push('\n');
            }
            data.push_str("PROMPT>");

            let mut buf = buffer(data.as_bytes());
            let mut cases = [
                Case::regex("noise").unwrap().skip_till(b'\n'),
                Case::regex("PROMPT>").unwrap().matched_only(),
            ];

            prop_assert_eq!(scan(&mut buf, &mut cases), matched(1, b"PROMPT>"));
        }
    }
}
