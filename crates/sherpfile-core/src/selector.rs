//! Label selectors
//!
//! A selector string such as `tier=web,name!=legacy` is a conjunction of
//! terms. Several selector strings passed together are OR'd: a release is in
//! scope when any one of them matches its labels.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CoreError, Result};
use crate::release::ReleaseSpec;

static LABEL_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9_.\-/]*[A-Za-z0-9])?$").expect("valid regex"));

/// A single `key=value` or `key!=value` term
#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Equals(String, String),
    NotEquals(String, String),
}

impl Term {
    fn matches(&self, labels: &IndexMap<String, String>) -> bool {
        match self {
            Term::Equals(key, value) => labels.get(key).is_some_and(|v| v == value),
            Term::NotEquals(key, value) => labels.get(key).is_none_or(|v| v != value),
        }
    }
}

/// Conjunction of label terms parsed from one selector string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFilter {
    source: String,
    terms: Vec<Term>,
}

impl LabelFilter {
    /// Parse a comma-separated list of `key=value` / `key!=value` terms
    pub fn parse(selector: &str) -> Result<Self> {
        let invalid = |message: &str| CoreError::InvalidSelector {
            selector: selector.to_string(),
            message: message.to_string(),
        };

        let mut terms = Vec::new();
        for raw in selector.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }

            let term = if let Some((key, value)) = raw.split_once("!=") {
                Term::NotEquals(key.trim().to_string(), value.trim().to_string())
            } else if let Some((key, value)) = raw.split_once('=') {
                Term::Equals(key.trim().to_string(), value.trim().to_string())
            } else {
                return Err(invalid(&format!("term '{}' must be key=value or key!=value", raw)));
            };

            let (Term::Equals(key, _) | Term::NotEquals(key, _)) = &term;
            if !LABEL_KEY.is_match(key) {
                return Err(invalid(&format!("invalid label key '{}'", key)));
            }
            terms.push(term);
        }

        if terms.is_empty() {
            return Err(invalid("selector is empty"));
        }

        Ok(Self {
            source: selector.to_string(),
            terms,
        })
    }

    /// All terms must hold
    pub fn matches(&self, labels: &IndexMap<String, String>) -> bool {
        self.terms.iter().all(|t| t.matches(labels))
    }
}

impl std::fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// A set of label filters, OR'd together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    filters: Vec<LabelFilter>,
}

impl Selector {
    /// A selector that matches every release
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse each selector string
    pub fn parse<S: AsRef<str>>(selectors: &[S]) -> Result<Self> {
        let filters = selectors
            .iter()
            .map(|s| LabelFilter::parse(s.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { filters })
    }

    /// True when no filters were given
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Whether the release is in scope
    pub fn matches(&self, release: &ReleaseSpec) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        let labels = release.selector_labels();
        self.filters.iter().any(|f| f.matches(&labels))
    }

    /// The original selector strings
    pub fn sources(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(name: &str, tier: &str) -> ReleaseSpec {
        let mut r = ReleaseSpec::new(name, "charts/app");
        r.namespace = "default".to_string();
        r.labels.insert("tier".to_string(), tier.to_string());
        r
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let selector = Selector::all();
        assert!(selector.matches(&release("a", "web")));
    }

    #[test]
    fn test_terms_are_anded() {
        let selector = Selector::parse(&["tier=web,name=frontend"]).unwrap();
        assert!(selector.matches(&release("frontend", "web")));
        assert!(!selector.matches(&release("frontend", "db")));
        assert!(!selector.matches(&release("other", "web")));
    }

    #[test]
    fn test_selectors_are_ored() {
        let selector = Selector::parse(&["tier=web", "name=postgres"]).unwrap();
        assert!(selector.matches(&release("frontend", "web")));
        assert!(selector.matches(&release("postgres", "db")));
        assert!(!selector.matches(&release("redis", "cache")));
    }

    #[test]
    fn test_not_equals() {
        let selector = Selector::parse(&["tier!=db"]).unwrap();
        assert!(selector.matches(&release("frontend", "web")));
        assert!(!selector.matches(&release("postgres", "db")));

        // Missing label satisfies a negative term
        let selector = Selector::parse(&["team!=payments"]).unwrap();
        assert!(selector.matches(&release("frontend", "web")));
    }

    #[test]
    fn test_invalid_selectors() {
        assert!(LabelFilter::parse("tier").is_err());
        assert!(LabelFilter::parse("").is_err());
        assert!(LabelFilter::parse("=value").is_err());
        assert!(LabelFilter::parse("bad key=value").is_err());
    }

    #[test]
    fn test_sources_roundtrip() {
        let selector = Selector::parse(&["tier=web", "name=api"]).unwrap();
        assert_eq!(selector.sources(), vec!["tier=web", "name=api"]);
    }
}
