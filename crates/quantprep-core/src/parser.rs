//! Section parser for streamed question text.
//!
//! The generation service is asked to reply with five sections, each introduced
//! by a `###` marker line (`### TITLE`, `### QUESTION`, `### HINT`,
//! `### SOLUTION`, `### TAKEAWAY`). [`parse`] extracts whatever is present in
//! the text received so far; callers re-run it on the full accumulated text
//! after every chunk.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::question::PartialQuestion;

/// Builds the extraction pattern for one marker word.
///
/// The body runs from just after the marker up to the next `###` or the end of
/// the input, so a `###` inside a body ends that field early.
fn section_pattern(marker: &str) -> Regex {
    // `(?is)`: case-insensitive, `.` matches newlines. The lazy body stops at
    // the first `###` or end of input.
    let pattern = format!(r"(?is)###\s*{marker}\s*(.*?)(?:###|\z)");
    match Regex::new(&pattern) {
        Ok(re) => re,
        // The pattern is assembled from fixed marker words below.
        Err(e) => unreachable!("invalid section pattern for {marker}: {e}"),
    }
}

static TITLE_RE: Lazy<Regex> = Lazy::new(|| section_pattern("TITLE"));
static QUESTION_RE: Lazy<Regex> = Lazy::new(|| section_pattern("QUESTION"));
static HINT_RE: Lazy<Regex> = Lazy::new(|| section_pattern("HINT"));
static SOLUTION_RE: Lazy<Regex> = Lazy::new(|| section_pattern("SOLUTION"));
static TAKEAWAY_RE: Lazy<Regex> = Lazy::new(|| section_pattern("TAKEAWAY"));

/// Returns the trimmed body of the first section matched by `re`, or an empty
/// string if the marker is absent.
fn extract(re: &Regex, raw: &str) -> String {
    re.captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Parses raw (possibly incomplete) reply text into question fields.
///
/// Every field of the result is `Some`; a missing marker yields an empty
/// string. Parsing never fails.
///
/// # Examples
///
/// ```
/// use quantprep_core::parser::parse;
///
/// let q = parse("### TITLE\nTwo Dice\n### QUESTION\nWhat is P(sum = 7)?");
/// assert_eq!(q.title.as_deref(), Some("Two Dice"));
/// assert_eq!(q.question_text.as_deref(), Some("What is P(sum = 7)?"));
/// assert_eq!(q.hint.as_deref(), Some(""));
/// ```
#[must_use]
pub fn parse(raw: &str) -> PartialQuestion {
    PartialQuestion {
        title: Some(extract(&TITLE_RE, raw)),
        question_text: Some(extract(&QUESTION_RE, raw)),
        hint: Some(extract(&HINT_RE, raw)),
        solution: Some(extract(&SOLUTION_RE, raw)),
        key_takeaway: Some(extract(&TAKEAWAY_RE, raw)),
    }
}
