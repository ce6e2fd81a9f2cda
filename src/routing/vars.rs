//! Path variable capture table.

use std::str::FromStr;
use std::sync::Arc;

use crate::pool::Recycle;

/// Values captured from a request path by variable and wildcard segments.
///
/// Entries keep pattern order, so values can be read by name or position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathVars {
    entries: Vec<(Arc<str>, String)>,
}

impl PathVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Value captured for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| &**key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Value captured at `index`, in pattern order.
    pub fn get_index(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|(_, value)| value.as_str())
    }

    /// Parse the value captured for `name`.
    pub fn parse<T: FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.parse().ok())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (&**k, v.as_str()))
    }

    pub(crate) fn push(&mut self, name: Arc<str>, value: impl Into<String>) {
        self.entries.push((name, value.into()));
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }
}

impl Recycle for PathVars {
    fn reset(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_position() {
        let mut vars = PathVars::with_capacity(2);
        vars.push(Arc::from("post"), "42");
        vars.push(Arc::from("comment"), "7");

        assert_eq!(vars.get("comment"), Some("7"));
        assert_eq!(vars.get_index(0), Some("42"));
        assert_eq!(vars.parse::<u32>("post"), Some(42));
        assert_eq!(vars.get("missing"), None);

        vars.reset();
        assert!(vars.is_empty());
    }
}
