//! Insertion-ordered header multimap
//!
//! Captured traffic must survive a round trip: duplicate header names are
//! legal, insertion order is what gets re-serialised, and name matching is
//! case-insensitive. `hyper::HeaderMap` canonicalises names, so the capture
//! path carries this thin multimap instead.

use serde::{Deserialize, Serialize};

/// Case-insensitive, order-preserving header multimap
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderList(Vec<(String, String)>);

impl HeaderList {
    /// Create an empty header list
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of header entries (duplicates counted)
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no headers are present
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append an entry, preserving existing duplicates
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value whose name matches case-insensitively
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values whose name matches case-insensitively, in insertion order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.0
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True when any entry matches the name case-insensitively
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Drop all entries whose name matches case-insensitively.
    /// Returns the number of entries removed.
    pub fn remove_all(&mut self, name: &str) -> usize {
        let before = self.0.len();
        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before - self.0.len()
    }

    /// Replace every value of `name` in place, or append when absent
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let mut replaced = false;
        for (n, v) in &mut self.0 {
            if n.eq_ignore_ascii_case(&name) {
                *v = value.clone();
                replaced = true;
            }
        }
        if !replaced {
            self.0.push((name, value));
        }
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Mutable iteration over values, preserving order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut String)> {
        self.0.iter_mut().map(|(n, v)| (&*n, v))
    }

    /// Declared `Content-Length`, when present and parseable
    pub fn content_length(&self) -> Option<usize> {
        self.get("content-length").and_then(|v| v.trim().parse().ok())
    }

    /// True when `Transfer-Encoding` includes `chunked`
    pub fn is_chunked(&self) -> bool {
        self.get("transfer-encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false)
    }

    /// Content type with any parameters stripped
    pub fn content_type(&self) -> Option<String> {
        self.get("content-type")
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
    }
}

impl FromIterator<(String, String)> for HeaderList {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a HeaderList {
    type Item = (&'a str, &'a str);
    type IntoIter = std::vec::IntoIter<(&'a str, &'a str)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut headers = HeaderList::new();
        headers.append("Content-Type", "text/html");
        assert_eq!(headers.get("content-type"), Some("text/html"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/html"));
        assert_eq!(headers.get("accept"), None);
    }

    #[test]
    fn duplicates_preserved_in_order() {
        let mut headers = HeaderList::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("X-Other", "x");
        headers.append("set-cookie", "b=2");
        let cookies: Vec<_> = headers.get_all("Set-Cookie").collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn remove_all_drops_every_match() {
        let mut headers = HeaderList::new();
        headers.append("X-Trace", "1");
        headers.append("x-trace", "2");
        headers.append("Host", "example.test");
        assert_eq!(headers.remove_all("X-TRACE"), 2);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains("host"));
    }

    #[test]
    fn framing_helpers() {
        let mut headers = HeaderList::new();
        headers.append("Content-Length", " 42 ");
        headers.append("Transfer-Encoding", "gzip, Chunked");
        headers.append("Content-Type", "application/json; charset=utf-8");
        assert_eq!(headers.content_length(), Some(42));
        assert!(headers.is_chunked());
        assert_eq!(headers.content_type().as_deref(), Some("application/json"));
    }
}
