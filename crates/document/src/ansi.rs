use std::borrow::Cow;

use nom::{
    bytes::complete::tag,
    character::complete::{char, digit1, one_of},
    combinator::recognize,
    multi::separated_list0,
    sequence::tuple,
    IResult,
};

const ESC: char = '\u{1b}';

/// `ESC [ n ; n ... m`, the color and style sequences kernels put in
/// tracebacks, plus the erase-in-line `K`.
fn escape_sequence(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        tag("\u{1b}["),
        separated_list0(char(';'), digit1),
        one_of("mMkK"),
    )))(input)
}

/// Removes terminal color and style sequences. Other escape bytes are kept.
pub fn strip(text: &str) -> Cow<'_, str> {
    if !text.contains(ESC) {
        return Cow::Borrowed(text);
    }

    let mut stripped = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(at) = rest.find(ESC) {
        stripped.push_str(&rest[..at]);
        rest = &rest[at..];

        match escape_sequence(rest) {
            Ok((remaining, _)) => rest = remaining,
            Err(_) => {
                stripped.push(ESC);
                rest = &rest[ESC.len_utf8()..];
            }
        }
    }

    stripped.push_str(rest);
    Cow::Owned(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;

    #[googletest::test]
    fn plain_text_is_borrowed() {
        expect_that!(matches!(strip("1 + 1"), Cow::Borrowed(_)), eq(true));
    }

    #[googletest::test]
    fn color_codes_are_removed() {
        let traceback = "\u{1b}[0;31mNameError\u{1b}[0m: name 'x' is not defined";

        expect_that!(strip(traceback), eq("NameError: name 'x' is not defined"));
    }

    #[googletest::test]
    fn extended_and_bare_sequences_are_removed() {
        expect_that!(strip("\u{1b}[38;5;208mwarn\u{1b}[m"), eq("warn"));
        expect_that!(strip("line\u{1b}[K"), eq("line"));
    }

    #[googletest::test]
    fn unknown_escapes_are_kept() {
        expect_that!(strip("a\u{1b}]0;title"), eq("a\u{1b}]0;title"));
        expect_that!(strip("a\u{1b}"), eq("a\u{1b}"));
    }
}
