//! Regex-based method allow-list.

use regex::Regex;

/// Immutable allow-list of compiled method patterns.
///
/// A method is permitted when at least one pattern finds a match anywhere in
/// the method string; patterns are not anchored, so `eth_get.*` also admits
/// anything *containing* `eth_get`. Built once at startup, never mutated.
#[derive(Debug)]
pub struct MethodMatcher {
    rules: Vec<Regex>,
}

impl MethodMatcher {
    /// Compiles the given patterns, failing fast on the first invalid one.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`regex::Error`] for the first pattern that
    /// does not compile.
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Returns true iff the method matches at least one configured pattern.
    ///
    /// The empty string never matches, regardless of the pattern set.
    #[must_use]
    pub fn matches_any(&self, method: &str) -> bool {
        if method.is_empty() {
            return false;
        }
        self.rules.iter().any(|rule| rule.is_match(method))
    }
}
