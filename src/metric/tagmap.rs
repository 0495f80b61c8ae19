//! tagmap is the map of key, value pairs that sits inside each `Metric`. Think
//! of it as a specialized, order-preserving hashmap. The tags distinguish
//! identically named series scraped from the same or other targets.
//!
//! Pairs are kept in the order they were first inserted. That order survives
//! serialization, so two maps holding the same pairs in a different order
//! serialize to different text and name different series.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json;
use std::iter::FromIterator;
use std::slice::Iter;

/// The tagmap key, value collection. Behaves similarly to
/// `std::collections::HashMap` but with a specialized implementation for
/// searching a small collection while remembering insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TagMap<K, V> {
    inner: Vec<(K, V)>,
}

impl<K, V> Default for TagMap<K, V> {
    fn default() -> TagMap<K, V> {
        TagMap { inner: Vec::new() }
    }
}

impl<K, V> TagMap<K, V>
where
    K: PartialEq,
{
    /// Create a `tagmap::Iter`, yielding pairs in insertion order.
    pub fn iter(&self) -> Iter<(K, V)> {
        self.inner.iter()
    }

    /// Get a value from the tagmap, if it exists.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner
            .iter()
            .find(|&&(ref k, _)| k == key)
            .map(|&(_, ref v)| v)
    }

    /// Insert a value into the tagmap.
    ///
    /// A new key is appended after every existing key. An existing key keeps
    /// its position and has its value replaced; the old value is returned.
    pub fn insert(&mut self, key: K, val: V) -> Option<V> {
        match self.inner.iter().position(|&(ref k, _)| *k == key) {
            Some(idx) => {
                let old = ::std::mem::replace(&mut self.inner[idx].1, val);
                Some(old)
            }
            None => {
                self.inner.push((key, val));
                None
            }
        }
    }

    /// Return the number of pairs stored.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Return true if no pairs are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for TagMap<K, V>
where
    K: PartialEq,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = TagMap::default();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<'a, K, V> IntoIterator for &'a TagMap<K, V> {
    type Item = &'a (K, V);
    type IntoIter = Iter<'a, (K, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl<K, V> Serialize for TagMap<K, V>
where
    K: Serialize,
    V: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.inner.len()))?;
        for &(ref k, ref v) in &self.inner {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl TagMap<String, String> {
    /// Serialize the tags into compact JSON, keys in insertion order.
    ///
    /// This text is what a `Metric` carries and what series identity is
    /// computed over.
    pub fn to_json(&self) -> String {
        // String keys and values cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> TagMap<String, String> {
        pairs
            .iter()
            .map(|&(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn insertion_order_is_kept() {
        let tags = map(&[("zeta", "1"), ("alpha", "2"), ("mid", "3")]);
        let keys: Vec<&str> = tags.iter().map(|&(ref k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(tags.to_json(), r#"{"zeta":"1","alpha":"2","mid":"3"}"#);
    }

    #[test]
    fn insert_existing_key_replaces_in_place() {
        let mut tags = map(&[("a", "1"), ("b", "2")]);
        assert_eq!(tags.insert("a".to_string(), "9".to_string()), Some("1".to_string()));
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get(&"a".to_string()), Some(&"9".to_string()));
        assert_eq!(tags.to_json(), r#"{"a":"9","b":"2"}"#);
    }

    #[test]
    fn order_matters_for_equality() {
        let fwd = map(&[("a", "1"), ("b", "2")]);
        let bck = map(&[("b", "2"), ("a", "1")]);
        assert!(fwd != bck);
        assert!(fwd.to_json() != bck.to_json());
    }

    #[test]
    fn empty_map_is_empty_object() {
        let tags: TagMap<String, String> = TagMap::default();
        assert!(tags.is_empty());
        assert_eq!(tags.to_json(), "{}");
    }

    #[test]
    fn json_escapes_quotes() {
        let tags = map(&[("path", "a\"b")]);
        assert_eq!(tags.to_json(), r#"{"path":"a\"b"}"#);
    }
}
