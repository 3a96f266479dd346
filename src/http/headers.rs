//! Header list shared by outbound requests and origin responses.
//!
//! Names compare case-insensitively. Entries keep the order they were added
//! in, which is the order they go on the wire; [`Headers::canonical`] is the
//! form that feeds the request fingerprint.

use std::collections::BTreeMap;

/// Ordered, multi-valued header list with case-insensitive names.
///
/// # Examples
///
/// ```
/// use rcache::http::Headers;
///
/// let headers: Headers = [("Accept", "application/json"), ("X-Tag", "b"), ("x-tag", "a")]
///     .into_iter()
///     .collect();
///
/// assert_eq!(headers.get("ACCEPT"), Some("application/json"));
/// assert_eq!(headers.canonical()["x-tag"], vec!["b", "a"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty list with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Adds an entry; an existing entry with the same name is kept.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find_map(|(k, v)| k.eq_ignore_ascii_case(name).then_some(v))
    }

    /// Returns `true` if any entry is named `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of entries, counting repeated names separately.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Lowercased names, sorted, each mapped to its trimmed values in the
    /// order they were added.
    ///
    /// Name casing, surrounding whitespace and the interleaving of different
    /// names do not matter. The order of a repeated name's values does:
    /// `Accept-Language: fr` then `en` is not the same request as `en` then
    /// `fr`.
    pub fn canonical(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in self.iter() {
            map.entry(name.to_ascii_lowercase())
                .or_default()
                .push(value.trim().to_owned());
        }
        map
    }
}

impl<N, V> FromIterator<(N, V)> for Headers
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}
