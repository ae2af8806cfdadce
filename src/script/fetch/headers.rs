//! Case-insensitive header map with deterministic iteration

use std::collections::BTreeMap;

/// HTTP headers keyed by lowercase name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: BTreeMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Replace any existing value
    pub fn set(&mut self, name: &str, value: &str) {
        self.entries.insert(name.to_lowercase(), value.to_string());
    }

    /// Add a value, joining with `, ` when the header exists
    pub fn append(&mut self, name: &str, value: &str) {
        self.entries
            .entry(name.to_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_lowercase())
    }

    pub fn delete(&mut self, name: &str) {
        self.entries.remove(&name.to_lowercase());
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<String> {
        self.entries.values().cloned().collect()
    }

    /// Sorted `(name, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Headers {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_append_and_delete() {
        let mut headers = Headers::new();
        headers.append("Accept", "text/plain");
        headers.append("accept", "application/json");
        assert_eq!(headers.get("ACCEPT"), Some("text/plain, application/json"));
        headers.delete("Accept");
        assert!(!headers.has("accept"));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_iteration_is_sorted() {
        let headers: Headers = [("X-B", "2"), ("x-a", "1"), ("Content-Type", "t")]
            .into_iter()
            .collect();
        assert_eq!(headers.keys(), vec!["content-type", "x-a", "x-b"]);
        assert_eq!(headers.values(), vec!["t", "1", "2"]);
        assert_eq!(headers.iter().next(), Some(("content-type", "t")));
    }

    proptest! {
        #[test]
        fn prop_lookup_ignores_case(name in "[A-Za-z][A-Za-z0-9-]{0,15}", value in "[ -~]{0,20}") {
            let mut headers = Headers::new();
            headers.set(&name, &value);
            prop_assert_eq!(headers.get(&name.to_uppercase()), Some(value.as_str()));
            prop_assert_eq!(headers.get(&name.to_lowercase()), Some(value.as_str()));
            prop_assert!(headers.has(&name.to_uppercase()));
        }
    }
}
