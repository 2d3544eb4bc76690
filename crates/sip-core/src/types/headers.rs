//! Case-insensitive multi-valued header map

use std::fmt;

/// Ordered collection of `(name, value)` header pairs
///
/// Lookups ignore ASCII case. A name may appear more than once (e.g. several
/// `Via` headers); [`Headers::insert`] replaces every occurrence while
/// [`Headers::append`] adds another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `name`, in insertion order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Set `name` to a single value
    ///
    /// The value takes the position of the first existing occurrence, so
    /// replacing a header does not reorder the message.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter().position(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(idx) => {
                self.entries[idx].1 = value;
                let mut seen = 0usize;
                self.entries.retain(|(n, _)| {
                    if n.eq_ignore_ascii_case(&name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Set `name` only when it is not present yet
    pub fn insert_default(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.entries.push((name, value.into()));
        }
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Remove every occurrence of `name`, returning whether any existed
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before != self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write!(f, "{}: {}\r\n", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let mut headers = Headers::new();
        headers.append("Call-ID", "abc");
        assert_eq!(headers.get("call-id"), Some("abc"));
        assert!(headers.contains("CALL-ID"));
    }

    #[test]
    fn test_insert_replaces_all_occurrences_in_place() {
        let mut headers: Headers =
            [("Via", "a"), ("Expires", "10"), ("via", "b")].into_iter().collect();
        headers.insert("VIA", "c");

        let all: Vec<_> = headers.iter().collect();
        assert_eq!(all, vec![("Via", "c"), ("Expires", "10")]);
    }

    #[test]
    fn test_multi_values_and_remove() {
        let mut headers = Headers::new();
        headers.append("Via", "a");
        headers.append("Via", "b");
        assert_eq!(headers.get_all("via").collect::<Vec<_>>(), vec!["a", "b"]);

        headers.insert_default("Via", "ignored");
        assert_eq!(headers.len(), 2);

        assert!(headers.remove("VIA"));
        assert!(!headers.remove("VIA"));
        assert!(headers.is_empty());
    }
}
