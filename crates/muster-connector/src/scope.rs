//! Scope include/exclude filtering.

use serde::{Deserialize, Serialize};

/// Include/exclude filter over platform scopes (namespaces, regions,
/// resource groups, zones, datacenters).
///
/// Matching is case-insensitive. An empty include list means "all scopes";
/// exclude always wins over include.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFilter {
    /// Scopes to enumerate. Empty means all.
    #[serde(default)]
    pub include: Vec<String>,
    /// Scopes to skip, even when included.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl ScopeFilter {
    /// A filter that allows every scope.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Set the include list.
    #[must_use]
    pub fn with_include<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the exclude list.
    #[must_use]
    pub fn with_exclude<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Whether discovery should enumerate the named scope.
    #[must_use]
    pub fn allows(&self, scope: &str) -> bool {
        if self.exclude.iter().any(|e| e.eq_ignore_ascii_case(scope)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|i| i.eq_ignore_ascii_case(scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_allows_everything() {
        let filter = ScopeFilter::allow_all();
        assert!(filter.allows("default"));
        assert!(filter.allows("kube-system"));
    }

    #[test]
    fn include_restricts() {
        let filter = ScopeFilter::default().with_include(["payments", "checkout"]);
        assert!(filter.allows("payments"));
        assert!(!filter.allows("default"));
    }

    #[test]
    fn exclude_wins_over_include() {
        let filter = ScopeFilter::default()
            .with_include(["payments"])
            .with_exclude(["payments"]);
        assert!(!filter.allows("payments"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let filter = ScopeFilter::default().with_include(["Payments"]);
        assert!(filter.allows("payments"));
        assert!(filter.allows("PAYMENTS"));

        let filter = ScopeFilter::default().with_exclude(["KUBE-system"]);
        assert!(!filter.allows("kube-system"));
    }

    #[test]
    fn deserializes_with_missing_fields() {
        let filter: ScopeFilter = serde_json::from_str(r#"{"include":["us-east-1"]}"#).unwrap();
        assert!(filter.allows("us-east-1"));
        assert!(!filter.allows("eu-west-1"));
        assert!(filter.exclude.is_empty());
    }
}
