//! Whole-word keyword matching for product names.
//!
//! Word boundaries follow the usual `\b` convention (a word character is
//! alphanumeric or `_`). A stem match is anchored on a boundary, consumes the
//! stem plus any trailing lowercase Cyrillic letters, and must end on a
//! boundary, so "фильтр" matches "Фильтрованное" but never the inside of
//! "нефильтрованное".

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Keyword plus an optional grammatical suffix.
    Stem,
    /// Keyword exactly, delimited on both sides.
    Exact,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_suffix_letter(c: char) -> bool {
    matches!(c, 'а'..='я' | 'ё')
}

fn lowercase_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn is_boundary(chars: &[char], index: usize) -> bool {
    let before = index > 0 && is_word_char(chars[index - 1]);
    let after = index < chars.len() && is_word_char(chars[index]);
    before != after
}

/// Character ranges of every non-overlapping occurrence of `keyword` in `text`,
/// compared case-insensitively.
pub fn find_spans(text: &str, keyword: &str, mode: MatchMode) -> Vec<Range<usize>> {
    let chars: Vec<char> = text.chars().map(lowercase_char).collect();
    let needle: Vec<char> = keyword.chars().map(lowercase_char).collect();
    let mut spans = Vec::new();

    if needle.is_empty() || needle.len() > chars.len() {
        return spans;
    }

    let mut start = 0;
    while start + needle.len() <= chars.len() {
        if chars[start..start + needle.len()] != needle[..] || !is_boundary(&chars, start) {
            start += 1;
            continue;
        }

        let mut end = start + needle.len();
        if mode == MatchMode::Stem {
            while end < chars.len() && is_suffix_letter(chars[end]) {
                end += 1;
            }
        }

        if is_boundary(&chars, end) {
            spans.push(start..end);
            start = end;
        } else {
            start += 1;
        }
    }

    spans
}

/// `text` with the given character ranges cut out.
pub fn remove_spans(text: &str, spans: &[Range<usize>]) -> String {
    text.chars()
        .enumerate()
        .filter(|(index, _)| !spans.iter().any(|span| span.contains(index)))
        .map(|(_, c)| c)
        .collect()
}

/// Scans `table` in declaration order and returns the value of the first
/// keyword present in `text` together with all of its occurrences.
pub fn first_match<T: Copy>(
    text: &str,
    table: &[(&str, T)],
    mode: MatchMode,
) -> Option<(T, Vec<Range<usize>>)> {
    table.iter().find_map(|(keyword, value)| {
        let spans = find_spans(text, keyword, mode);
        (!spans.is_empty()).then_some((*value, spans))
    })
}

/// Applies [`first_match`] and strips the matched words from `text`.
pub fn take_first<T: Copy>(text: &mut String, table: &[(&str, T)], mode: MatchMode) -> Option<T> {
    let (value, spans) = first_match(text, table, mode)?;
    *text = remove_spans(text, &spans).trim().to_string();
    Some(value)
}
