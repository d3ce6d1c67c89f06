//! Cleanup of raw recognized text.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref EXCESS_BLANK_LINES: Regex = Regex::new(r"\n{3,}").unwrap();
    // U+FEFF is not White_Space in Unicode but OCR output carries it as a separator.
    static ref WHITESPACE_RUN: Regex = Regex::new(r"[\s\x{FEFF}]+").unwrap();
}

/// Normalize recognized text into a single line.
///
/// Steps run in a fixed order:
/// 1. `\r\n` and bare `\r` become `\n`
/// 2. runs of three or more `\n` become exactly two
/// 3. every remaining whitespace run (the preserved paragraph breaks included) becomes one space
/// 4. leading and trailing whitespace is trimmed
///
/// Step 3 flattens the paragraph breaks kept by step 2, so the output is
/// always a single line.
pub fn normalize(raw_text: &str) -> String {
    let unified = raw_text.replace("\r\n", "\n").replace('\r', "\n");
    let paragraphs = EXCESS_BLANK_LINES.replace_all(&unified, "\n\n");
    let collapsed = WHITESPACE_RUN.replace_all(&paragraphs, " ");
    collapsed
        .trim_matches(|c: char| c.is_whitespace() || c == '\u{FEFF}')
        .to_string()
}
