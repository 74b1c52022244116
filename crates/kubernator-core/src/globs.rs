//! An insertion-ordered set of compiled shell-glob patterns, with a frozen flag.
//!
//! Mirrors the directory walker's per-directory include/exclude lists: each directory
//! inherits its parent's globs through the context tree's copy-on-write list semantics
//! (see `context`), and mutates its own copy freely once cloned.

use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
struct Entry {
    pattern: String,
    compiled: glob::Pattern,
}

/// Ordered set of glob patterns. Insertion order is preserved and duplicates are
/// ignored (matching set semantics) rather than re-ordered.
#[derive(Debug, Clone, Default)]
pub struct Globs {
    entries: Vec<Entry>,
    frozen: bool,
}

impl Globs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_patterns<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut globs = Self::new();
        globs.extend(patterns)?;
        Ok(globs)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Freeze the set; all further mutating calls return `CoreError::FrozenGlobs`.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    fn check_mutable(&self) -> Result<()> {
        if self.frozen {
            return Err(CoreError::FrozenGlobs);
        }
        Ok(())
    }

    fn compile(pattern: &str) -> Result<glob::Pattern> {
        glob::Pattern::new(pattern).map_err(|e| CoreError::InvalidGlob {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
    }

    fn contains_pattern(&self, pattern: &str) -> bool {
        self.entries.iter().any(|e| e.pattern == pattern)
    }

    /// Append a pattern at the end if not already present.
    pub fn add(&mut self, pattern: impl Into<String>) -> Result<()> {
        self.check_mutable()?;
        let pattern = pattern.into();
        if self.contains_pattern(&pattern) {
            return Ok(());
        }
        let compiled = Self::compile(&pattern)?;
        self.entries.push(Entry { pattern, compiled });
        Ok(())
    }

    /// Insert a pattern at the front if not already present.
    pub fn add_first(&mut self, pattern: impl Into<String>) -> Result<()> {
        self.check_mutable()?;
        let pattern = pattern.into();
        if self.contains_pattern(&pattern) {
            return Ok(());
        }
        let compiled = Self::compile(&pattern)?;
        self.entries.insert(0, Entry { pattern, compiled });
        Ok(())
    }

    pub fn extend<I, S>(&mut self, patterns: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for pattern in patterns {
            self.add(pattern)?;
        }
        Ok(())
    }

    pub fn extend_first<I, S>(&mut self, patterns: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        // Preserve the caller's relative order at the front: insert in reverse so
        // the first item of `patterns` ends up first overall.
        let collected: Vec<String> = patterns.into_iter().map(Into::into).collect();
        for pattern in collected.into_iter().rev() {
            self.add_first(pattern)?;
        }
        Ok(())
    }

    pub fn discard(&mut self, pattern: &str) -> Result<bool> {
        self.check_mutable()?;
        let before = self.entries.len();
        self.entries.retain(|e| e.pattern != pattern);
        Ok(self.entries.len() != before)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.pattern.as_str())
    }

    /// Whether `name` matches any pattern in the set, in insertion order.
    pub fn matches(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.compiled.matches(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let globs = Globs::from_patterns(["*.yaml", "*.yml", "*.json"]).unwrap();
        assert_eq!(globs.patterns().collect::<Vec<_>>(), vec!["*.yaml", "*.yml", "*.json"]);
    }

    #[test]
    fn add_first_prepends() {
        let mut globs = Globs::from_patterns(["*.yaml"]).unwrap();
        globs.add_first("*.yml").unwrap();
        assert_eq!(globs.patterns().collect::<Vec<_>>(), vec!["*.yml", "*.yaml"]);
    }

    #[test]
    fn extend_first_preserves_relative_order() {
        let mut globs = Globs::from_patterns(["*.json"]).unwrap();
        globs.extend_first(["*.yaml", "*.yml"]).unwrap();
        assert_eq!(
            globs.patterns().collect::<Vec<_>>(),
            vec!["*.yaml", "*.yml", "*.json"]
        );
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut globs = Globs::from_patterns(["*.yaml"]).unwrap();
        globs.add("*.yaml").unwrap();
        assert_eq!(globs.len(), 1);
    }

    #[test]
    fn frozen_set_rejects_mutation() {
        let mut globs = Globs::from_patterns(["*.yaml"]).unwrap();
        globs.freeze();
        let err = globs.add("*.yml").unwrap_err();
        assert!(matches!(err, CoreError::FrozenGlobs));
    }

    #[test]
    fn matches_against_patterns() {
        let globs = Globs::from_patterns(["*.yaml", "*.yml"]).unwrap();
        assert!(globs.matches("deployment.yaml"));
        assert!(!globs.matches("deployment.json"));
    }
}
