//! Query analysis: shorthand expansion and keyword extraction.

mod abbreviations;
mod keywords;

pub use abbreviations::*;
pub use keywords::*;

use serde::{Deserialize, Serialize};

/// A practitioner request after expansion and keyword extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryAnalysis {
    pub original: String,
    pub expanded: String,
    pub keywords: Vec<Keyword>,
}

impl QueryAnalysis {
    /// Expand and extract keywords from a request.
    pub fn analyze(query: &str, expander: &AbbreviationExpander) -> Self {
        let original = query.trim().to_string();
        let expanded = expander.expand(&original);
        let keywords = KeywordExtractor::new(expander).extract(&original);
        Self {
            original,
            expanded,
            keywords,
        }
    }

    /// Text sent to the index: the request, followed by its expansion when different.
    pub fn searchable_text(&self) -> String {
        searchable(&self.original, &self.expanded)
    }

    /// Tooth/treatment keywords, in extraction order.
    pub fn priority_keywords(&self) -> impl Iterator<Item = &Keyword> {
        self.keywords.iter().filter(|k| k.is_priority())
    }

    /// Expansion/abbreviation keywords, in extraction order.
    pub fn secondary_keywords(&self) -> impl Iterator<Item = &Keyword> {
        self.keywords.iter().filter(|k| !k.is_priority())
    }
}

/// Join a text with its expansion when the expansion differs.
pub fn searchable(text: &str, expanded: &str) -> String {
    if expanded.trim().is_empty() || expanded.trim() == text.trim() {
        text.to_string()
    } else {
        format!("{text}\n{expanded}")
    }
}

/// Escape `term` and wrap it in `\b` where its edges are word characters.
pub(crate) fn word_bounded(term: &str) -> String {
    let escaped = regex::escape(term);
    let starts_word = term.chars().next().is_some_and(is_word_char);
    let ends_word = term.chars().last().is_some_and(is_word_char);
    format!(
        "{}{}{}",
        if starts_word { r"\b" } else { "" },
        escaped,
        if ends_word { r"\b" } else { "" }
    )
}

/// Whole-word, case-insensitive containment of `needle` in `haystack`.
pub fn contains_word(haystack: &str, needle: &str) -> bool {
    let haystack = haystack.to_lowercase();
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }
    let needle_starts_word = needle.chars().next().is_some_and(is_word_char);
    let needle_ends_word = needle.chars().last().is_some_and(is_word_char);

    haystack.match_indices(&needle).any(|(start, matched)| {
        let end = start + matched.len();
        let before_ok = !needle_starts_word
            || haystack[..start].chars().next_back().map_or(true, |c| !is_word_char(c));
        let after_ok = !needle_ends_word
            || haystack[end..].chars().next().map_or(true, |c| !is_word_char(c));
        before_ok && after_ok
    })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
