use regex::{Regex, RegexBuilder};

/// Case-insensitive literal matcher for the search filter. `None` when the
/// filter is blank.
pub fn build_highlight_regex(filter: &str) -> Option<Regex> {
    if filter.is_empty() {
        return None;
    }
    RegexBuilder::new(&regex::escape(filter))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Splits `text` into runs, flagging the runs that match `regex`.
pub fn split_matches<'t>(text: &'t str, regex: Option<&Regex>) -> Vec<(&'t str, bool)> {
    let Some(regex) = regex else {
        return vec![(text, false)];
    };
    let mut segments = Vec::new();
    let mut cursor = 0;
    for found in regex.find_iter(text) {
        if found.start() > cursor {
            segments.push((&text[cursor..found.start()], false));
        }
        segments.push((found.as_str(), true));
        cursor = found.end();
    }
    if cursor < text.len() || segments.is_empty() {
        segments.push((&text[cursor..], false));
    }
    segments
}
