//! Treatment keyword extraction.
//!
//! Keywords come from three places, in this order of precedence:
//! 1. A leading tooth + code combination (`26 CC`), always first
//! 2. The built-in treatment vocabulary
//! 3. The abbreviation table (expansion, then the shorthand itself)

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{contains_word, AbbreviationExpander};

/// Treatment vocabulary: term as written in requests → canonical treatment name.
const TREATMENT_VOCABULARY: &[(&str, &str)] = &[
    ("facette", "Facette"),
    ("composite", "Composite"),
    ("couronne", "Couronne"),
    ("onlay", "Onlay"),
    ("inlay", "Inlay"),
    ("extraction", "Extraction"),
    ("implant", "Implant"),
    ("endodontie", "Endodontie"),
    ("traitement de racine", "Traitement de racine"),
    ("tr", "Traitement de racine"),
    ("cc", "Couronne céramique"),
    ("détartrage", "Détartrage"),
    ("blanchiment", "Blanchiment"),
    ("prothèse", "Prothèse"),
    ("bridge", "Bridge"),
    ("pont", "Pont"),
    ("obturation", "Obturation"),
    ("scellement", "Scellement"),
];

/// Words that join two tooth numbers rather than name a treatment.
const RANGE_CONNECTORS: &[&str] = &["à", "a", "au", "et"];

static TOOTH_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,2})\s+([^\W\d_]+)").expect("valid tooth pattern")
});

/// Where a keyword came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum KeywordKind {
    /// Leading tooth number + treatment code
    ToothCombination,
    /// Vocabulary treatment name
    Treatment,
    /// Canonical phrase of a shorthand found in the request
    Expansion,
    /// Shorthand as written in the request
    Abbreviation,
}

/// A treatment term extracted from a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Keyword {
    pub text: String,
    pub kind: KeywordKind,
}

impl Keyword {
    pub fn new(text: impl Into<String>, kind: KeywordKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    /// Tooth combinations and vocabulary treatments drive the primary retrieval passes.
    pub fn is_priority(&self) -> bool {
        matches!(
            self.kind,
            KeywordKind::ToothCombination | KeywordKind::Treatment
        )
    }
}

/// Extracts treatment keywords using the vocabulary and an abbreviation table.
pub struct KeywordExtractor<'a> {
    expander: &'a AbbreviationExpander,
}

impl<'a> KeywordExtractor<'a> {
    pub fn new(expander: &'a AbbreviationExpander) -> Self {
        Self { expander }
    }

    /// Extract keywords from a request. No keyword appears twice (case-insensitive).
    pub fn extract(&self, query: &str) -> Vec<Keyword> {
        let mut keywords = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |keyword: Keyword, keywords: &mut Vec<Keyword>| {
            if seen.insert(keyword.text.to_lowercase()) {
                keywords.push(keyword);
            }
        };

        if let Some(combo) = tooth_combination(query) {
            push(Keyword::new(combo, KeywordKind::ToothCombination), &mut keywords);
        }

        for (term, canonical) in TREATMENT_VOCABULARY {
            if contains_word(query, term) || contains_word(query, &format!("{term}s")) {
                push(Keyword::new(*canonical, KeywordKind::Treatment), &mut keywords);
            }
        }

        for (short, canonical) in self.expander.iter() {
            if contains_word(query, short) {
                push(Keyword::new(canonical, KeywordKind::Expansion), &mut keywords);
                push(Keyword::new(short, KeywordKind::Abbreviation), &mut keywords);
            }
        }

        keywords
    }
}

/// `"<tooth> <code>"` when the request starts with a tooth number followed by a code.
fn tooth_combination(query: &str) -> Option<String> {
    let caps = TOOTH_CODE.captures(query)?;
    let tooth = caps.get(1)?.as_str();
    let code = caps.get(2)?.as_str();
    if RANGE_CONNECTORS.contains(&code.to_lowercase().as_str()) {
        return None;
    }
    Some(format!("{tooth} {code}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expander() -> AbbreviationExpander {
        AbbreviationExpander::from_pairs([
            ("CC", "Couronne céramique"),
            ("TR", "Traitement de racine"),
            ("F", "Facette"),
        ])
    }

    fn texts(keywords: &[Keyword]) -> Vec<&str> {
        keywords.iter().map(|k| k.text.as_str()).collect()
    }

    #[test]
    fn test_tooth_combination_first() {
        let e = expander();
        let keywords = KeywordExtractor::new(&e).extract("26 CC");
        assert_eq!(keywords[0], Keyword::new("26 CC", KeywordKind::ToothCombination));
        assert_eq!(texts(&keywords), vec!["26 CC", "Couronne céramique", "CC"]);
    }

    #[test]
    fn test_vocabulary_match() {
        let e = AbbreviationExpander::new();
        let keywords = KeywordExtractor::new(&e).extract("Facette");
        assert_eq!(keywords, vec![Keyword::new("Facette", KeywordKind::Treatment)]);
    }

    #[test]
    fn test_plural_vocabulary_match() {
        let e = AbbreviationExpander::new();
        let keywords = KeywordExtractor::new(&e).extract("plusieurs facettes");
        assert_eq!(texts(&keywords), vec!["Facette"]);
    }

    #[test]
    fn test_no_duplicates() {
        let e = expander();
        let keywords = KeywordExtractor::new(&e).extract("TR traitement de racine 36");
        let mut lower: Vec<String> = keywords.iter().map(|k| k.text.to_lowercase()).collect();
        let before = lower.len();
        lower.sort();
        lower.dedup();
        assert_eq!(before, lower.len());
        assert!(keywords.iter().any(|k| k.text == "Traitement de racine" && k.is_priority()));
    }

    #[test]
    fn test_range_is_not_tooth_combination() {
        let e = expander();
        let keywords = KeywordExtractor::new(&e).extract("12 à 22 F");
        assert!(keywords.iter().all(|k| k.kind != KeywordKind::ToothCombination));
        assert_eq!(texts(&keywords), vec!["Facette", "F"]);
    }

    #[test]
    fn test_unrelated_text() {
        let e = expander();
        assert!(KeywordExtractor::new(&e).extract("bonjour").is_empty());
    }

    #[test]
    fn test_substrings_do_not_match() {
        let e = AbbreviationExpander::new();
        // "tr" inside "extraction" must not yield Traitement de racine
        let keywords = KeywordExtractor::new(&e).extract("extraction 38");
        assert_eq!(texts(&keywords), vec!["Extraction"]);
    }
}
