//! Dental shorthand expansion.
//!
//! Replaces whole-word shorthands (`CC`, `TR`, `F`, ...) with their canonical
//! phrases. Matching is case-insensitive and longest-shorthand-first. Spans of
//! the input that already read as a canonical phrase are left untouched, so
//! expanding twice gives the same text as expanding once.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use super::word_bounded;

/// On-disk abbreviation file: `{"abbreviations": {"CC": "Couronne céramique", ...}}`.
#[derive(Debug, Deserialize)]
struct AbbreviationFile {
    #[serde(default)]
    abbreviations: BTreeMap<String, String>,
}

/// Expander for practitioner shorthand.
#[derive(Debug, Clone, Default)]
pub struct AbbreviationExpander {
    /// Shorthand as written in the table → canonical phrase
    entries: BTreeMap<String, String>,
    /// Lowercased shorthand → canonical phrase
    lookup: HashMap<String, String>,
    shorthand_pattern: Option<Regex>,
    canonical_pattern: Option<Regex>,
}

impl AbbreviationExpander {
    /// Create an expander with an empty table (expansion is the identity).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an expander from `(shorthand, canonical)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut expander = Self::new();
        for (short, canonical) in pairs {
            expander.insert(short.into(), canonical.into());
        }
        expander.rebuild();
        expander
    }

    /// Parse an abbreviation file.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        let file: AbbreviationFile = serde_json::from_str(json)?;
        Ok(Self::from_pairs(file.abbreviations))
    }

    /// Load an abbreviation file. A missing or malformed file yields an empty table.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Abbreviation file unavailable, expansion disabled"
                );
                return Self::new();
            }
        };
        match Self::from_json_str(&text) {
            Ok(expander) => {
                tracing::info!(count = expander.len(), "Loaded abbreviations");
                expander
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Malformed abbreviation file, expansion disabled"
                );
                Self::new()
            }
        }
    }

    /// Add a custom shorthand mapping.
    pub fn add_abbreviation(&mut self, short: &str, canonical: &str) {
        self.insert(short.to_string(), canonical.to_string());
        self.rebuild();
    }

    /// Canonical phrase for a shorthand, case-insensitive.
    pub fn lookup(&self, short: &str) -> Option<&str> {
        self.lookup.get(&short.trim().to_lowercase()).map(String::as_str)
    }

    /// Iterate `(shorthand, canonical)` pairs in shorthand order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expand every whole-word shorthand in `text`.
    pub fn expand(&self, text: &str) -> String {
        let Some(shorthand) = &self.shorthand_pattern else {
            return text.to_string();
        };

        let protected: Vec<(usize, usize)> = self
            .canonical_pattern
            .as_ref()
            .map(|re| re.find_iter(text).map(|m| (m.start(), m.end())).collect())
            .unwrap_or_default();

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for m in shorthand.find_iter(text) {
            let inside_canonical = protected
                .iter()
                .any(|(start, end)| m.start() < *end && m.end() > *start);
            if inside_canonical {
                continue;
            }
            let Some(canonical) = self.lookup.get(&m.as_str().to_lowercase()) else {
                continue;
            };
            out.push_str(&text[last..m.start()]);
            out.push_str(canonical);
            last = m.end();
        }
        out.push_str(&text[last..]);
        out
    }

    fn insert(&mut self, short: String, canonical: String) {
        let short = short.trim().to_string();
        let canonical = canonical.trim().to_string();
        if short.is_empty() || canonical.is_empty() {
            return;
        }
        self.lookup.insert(short.to_lowercase(), canonical.clone());
        self.entries.insert(short, canonical);
    }

    fn rebuild(&mut self) {
        self.shorthand_pattern = alternation(self.lookup.keys());
        self.canonical_pattern = alternation(self.lookup.values());
    }
}

/// Case-insensitive whole-word alternation, longest term first.
fn alternation<'a>(terms: impl Iterator<Item = &'a String>) -> Option<Regex> {
    let mut terms: Vec<&String> = terms.collect();
    if terms.is_empty() {
        return None;
    }
    terms.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
    terms.dedup();
    let body = terms
        .iter()
        .map(|t| word_bounded(t))
        .collect::<Vec<_>>()
        .join("|");
    match Regex::new(&format!("(?i){body}")) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(error = %e, "Could not compile abbreviation pattern");
            None
        }
    }
}
