use std::collections::HashSet;

/// Base keys proven to repeat during the current scan pass.
///
/// Once a base key is registered every later field sharing it classifies as a section
/// repeater, so incremental re-scans of the same page cannot flip it back to atomic.
/// Created at pass start, dropped at pass end.
#[derive(Debug, Default, Clone)]
pub struct RepeaterRegistry {
    proven: HashSet<String>,
}

impl RepeaterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the key was newly registered.
    pub fn insert(&mut self, base_key: impl Into<String>) -> bool {
        self.proven.insert(base_key.into())
    }

    #[must_use]
    pub fn contains(&self, base_key: &str) -> bool {
        self.proven.contains(base_key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.proven.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proven.is_empty()
    }

    pub fn clear(&mut self) {
        self.proven.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.proven.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let mut registry = RepeaterRegistry::new();
        assert!(registry.insert("school_name"));
        assert!(!registry.insert("school_name"));
        assert!(registry.contains("school_name"));
        assert_eq!(registry.len(), 1);
        registry.clear();
        assert!(registry.is_empty());
    }
}
