//! Colour-code stripping

use bytes::Bytes;
use regex::bytes::Regex;
use std::sync::LazyLock;

/// `ESC [ <params> m` (SGR colours) and `ESC [ <params> K` (erase in line).
static COLOR_CODES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;]*[mK]").expect("colour code expression is valid")
});

/// Remove colour and erase-line control sequences from one chunk of output.
///
/// Other escape sequences pass through untouched, and a sequence split across
/// two chunks is not recognised.
pub fn strip_colors(data: &[u8]) -> Bytes {
    match COLOR_CODES.replace_all(data, &b""[..]) {
        std::borrow::Cow::Borrowed(untouched) => Bytes::copy_from_slice(untouched),
        std::borrow::Cow::Owned(stripped) => Bytes::from(stripped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strip_sgr() {
        let output = strip_colors(b"Hello \x1b[31mred\x1b[0m world");
        assert_eq!(&output[..], b"Hello red world");
    }

    #[test]
    fn test_strip_erase_line() {
        let output = strip_colors(b"\x1b[Kprogress 50%\x1b[2K");
        assert_eq!(&output[..], b"progress 50%");
    }

    #[test]
    fn test_multiple_params() {
        let output = strip_colors(b"\x1b[1;32;40mok\x1b[m");
        assert_eq!(&output[..], b"ok");
    }

    #[test]
    fn test_other_sequences_kept() {
        // cursor up and OSC title are not colour codes
        let input = b"\x1b[Aup \x1b]0;Title\x07";
        assert_eq!(&strip_colors(input)[..], &input[..]);
    }

    #[test]
    fn test_no_escape() {
        assert_eq!(&strip_colors(b"plain text")[..], b"plain text");
    }

    proptest! {
        #[test]
        fn stripped_output_has_no_color_codes(parts in proptest::collection::vec(
            prop_oneof![
                "[a-z ]{0,8}".prop_map(|s| s.into_bytes()),
                "[0-9;]{0,6}".prop_map(|p| format!("\x1b[{p}m").into_bytes()),
                "[0-9;]{0,6}".prop_map(|p| format!("\x1b[{p}K").into_bytes()),
            ],
            0..12,
        )) {
            let input: Vec<u8> = parts.concat();
            let output = strip_colors(&input);
            prop_assert!(!COLOR_CODES.is_match(&output));
            prop_assert!(output.len() <= input.len());
        }

        #[test]
        fn text_without_escape_is_unchanged(text in "[^\x1b]{0,64}") {
            prop_assert_eq!(&strip_colors(text.as_bytes())[..], text.as_bytes());
        }
    }
}
