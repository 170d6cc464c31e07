//! Cleanup applied to an extracted body before it is relayed

use std::sync::LazyLock;

use regex::Regex;

/// `<br>`, `<br/>`, `<br />` in any letter case.
static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("line break pattern is valid"));

/// Replace HTML line break tags with newlines and trim surrounding whitespace.
///
/// Chat clients reject `<br>` in HTML mode, and the Markdown converter turns
/// each one into a blank line, so a plain newline is used instead.
pub fn normalize(body: &str) -> String {
    LINE_BREAK.replace_all(body, "\n").trim().to_string()
}
