//! Section markers separating reasoning from the plan JSON.

use serde::{Deserialize, Serialize};

/// Spellings of the plan marker, tried most specific first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MarkerVariant {
    /// `### TREATMENT_PLAN_JSON ###`
    Canonical,
    /// `TREATMENT_PLAN_JSON ###`
    TrailingHashes,
    /// `###TREATMENT_PLAN_JSON###`
    Compact,
    /// `TREATMENT_PLAN_JSON`
    Bare,
}

impl MarkerVariant {
    /// Variants in priority order.
    pub const ALL: [MarkerVariant; 4] = [
        MarkerVariant::Canonical,
        MarkerVariant::TrailingHashes,
        MarkerVariant::Compact,
        MarkerVariant::Bare,
    ];

    pub fn pattern(&self) -> &'static str {
        match self {
            MarkerVariant::Canonical => "### TREATMENT_PLAN_JSON ###",
            MarkerVariant::TrailingHashes => "TREATMENT_PLAN_JSON ###",
            MarkerVariant::Compact => "###TREATMENT_PLAN_JSON###",
            MarkerVariant::Bare => "TREATMENT_PLAN_JSON",
        }
    }
}

/// A marker located in generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerMatch {
    pub variant: MarkerVariant,
    pub start: usize,
    pub end: usize,
}

/// Find the highest-priority marker variant present in `text`.
pub fn find_marker(text: &str) -> Option<MarkerMatch> {
    MarkerVariant::ALL.iter().find_map(|variant| {
        text.find(variant.pattern()).map(|start| MarkerMatch {
            variant: *variant,
            start,
            end: start + variant.pattern().len(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_preferred() {
        let text = "raisonnement\n### TREATMENT_PLAN_JSON ###\n{}";
        let m = find_marker(text).unwrap();
        assert_eq!(m.variant, MarkerVariant::Canonical);
        assert_eq!(&text[..m.start], "raisonnement\n");
        assert_eq!(&text[m.end..], "\n{}");
    }

    #[test]
    fn test_fallback_variants() {
        assert_eq!(
            find_marker("a TREATMENT_PLAN_JSON ### {}").unwrap().variant,
            MarkerVariant::TrailingHashes
        );
        assert_eq!(
            find_marker("a ###TREATMENT_PLAN_JSON### {}").unwrap().variant,
            MarkerVariant::Compact
        );
        assert_eq!(
            find_marker("a TREATMENT_PLAN_JSON: {}").unwrap().variant,
            MarkerVariant::Bare
        );
        assert!(find_marker("no marker here").is_none());
    }
}
