//! HTTP header map with case-insensitive name lookup.
//!
//! Header fields are order-preserving, multi-valued, and case-insensitive by
//! name per RFC 9110 §5. Replaying a cached response must reproduce the exact
//! sequence of `(name, value)` pairs the handler produced, so the map is a
//! flat list rather than a keyed structure.

use std::fmt;

/// A case-insensitive, order-preserving, multi-value HTTP header map.
///
/// Supports both additive mutation ([`append`](Self::append), matching
/// repeated header fields on the wire) and replacement
/// ([`set`](Self::set), matching `Header.Set`-style APIs).
///
/// # Examples
///
/// ```
/// use cacheflight::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.append("X-Test", "one");
/// headers.append("X-Test", "two");
/// assert_eq!(headers.get_all("x-test").collect::<Vec<_>>(), vec!["one", "two"]);
///
/// headers.set("X-Test", "three");
/// assert_eq!(headers.get_all("x-test").collect::<Vec<_>>(), vec!["three"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header field, preserving any existing values for the name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Replaces all values for `name` with a single value.
    ///
    /// The new field is placed where the first old value was, keeping header
    /// ordering stable under replacement; a previously absent name is
    /// appended at the end.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(at) => {
                self.fields
                    .retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
                self.fields.insert(at.min(self.fields.len()), (name, value));
            }
            None => self.fields.push((name, value)),
        }
    }

    /// Returns the first value for `name` (case-insensitive), if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|at| self.fields[at].1.as_str())
    }

    /// Returns all values for `name` (case-insensitive), in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if at least one field with `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Removes every field named `name`, returning `true` if any was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.fields.len() < before
    }

    /// Total number of fields, counting repeated names once per value.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the map holds no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.fields {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a str, &'a str);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (String, String)>,
        fn(&'a (String, String)) -> (&'a str, &'a str),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
