//! Normalized directory entries.
//!
//! Directory attributes are multi-valued. Most consumers treat them as scalars, so a raw
//! attribute is flattened by its value count:
//!
//! - one value becomes [`AttributeValue::Single`],
//! - several values become [`AttributeValue::Multiple`], in server order,
//! - no value drops the attribute.

use crate::connection::{RawEntry, ResultSet};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};

/// Value of a normalized attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Attribute with exactly one value.
    Single(String),
    /// Attribute with more than one value.
    Multiple(Vec<String>),
}

impl AttributeValue {
    /// Returns the value when the attribute is single-valued.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            Self::Multiple(_) => None,
        }
    }

    /// Returns every value, whatever the cardinality.
    #[must_use]
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(value) => vec![value.as_str()],
            Self::Multiple(values) => values.iter().map(String::as_str).collect(),
        }
    }

    /// Returns true for multi-valued attributes.
    #[must_use]
    pub const fn is_multiple(&self) -> bool {
        matches!(self, Self::Multiple(_))
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multiple(values)
    }
}

/// Attribute name to value mapping for one entry.
///
/// Serializes as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedEntry {
    attributes: BTreeMap<String, AttributeValue>,
}

impl NormalizedEntry {
    /// Flattens a raw entry.
    #[must_use]
    pub fn from_raw(entry: &RawEntry) -> Self {
        let attributes = entry
            .attributes()
            .iter()
            .filter_map(|attribute| {
                let value = match attribute.values.as_slice() {
                    [] => return None,
                    [single] => AttributeValue::Single(single.clone()),
                    many => AttributeValue::Multiple(many.to_vec()),
                };
                Some((attribute.name.clone(), value))
            })
            .collect();
        Self { attributes }
    }

    /// Flattens every entry of a result set, keeping server order.
    #[must_use]
    pub fn from_result_set(results: &ResultSet) -> Vec<Self> {
        if results.count() < 1 {
            return Vec::new();
        }
        results.entries().iter().map(Self::from_raw).collect()
    }

    /// Value of an attribute.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&AttributeValue> {
        self.attributes.get(attribute)
    }

    /// Value of a single-valued attribute.
    #[must_use]
    pub fn get_str(&self, attribute: &str) -> Option<&str> {
        self.get(attribute).and_then(AttributeValue::as_str)
    }

    /// Returns true if the attribute is present.
    #[must_use]
    pub fn contains(&self, attribute: &str) -> bool {
        self.attributes.contains_key(attribute)
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns true when no attribute is present (nothing matched).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterates attributes by name.
    pub fn iter(&self) -> btree_map::Iter<'_, String, AttributeValue> {
        self.attributes.iter()
    }

    /// Consumes the entry and returns the underlying map.
    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, AttributeValue> {
        self.attributes
    }
}

impl From<&RawEntry> for NormalizedEntry {
    fn from(entry: &RawEntry) -> Self {
        Self::from_raw(entry)
    }
}

impl<'a> IntoIterator for &'a NormalizedEntry {
    type Item = (&'a String, &'a AttributeValue);
    type IntoIter = btree_map::Iter<'a, String, AttributeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<(String, AttributeValue)> for NormalizedEntry {
    fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RawEntry {
        RawEntry::new("cn=test.user,ou=people,dc=test,dc=com")
            .with_attribute("cn", ["test.user"])
            .with_attribute("objectClass", ["top", "person", "inetOrgPerson"])
            .with_attribute("description", std::iter::empty::<&str>())
    }

    #[test]
    fn single_values_are_unwrapped() {
        let entry = NormalizedEntry::from_raw(&sample());
        assert_eq!(
            entry.get("cn"),
            Some(&AttributeValue::Single("test.user".to_string()))
        );
        assert_eq!(entry.get_str("cn"), Some("test.user"));
    }

    #[test]
    fn multiple_values_keep_positional_order() {
        let entry = NormalizedEntry::from_raw(&sample());
        let classes = entry.get("objectClass").unwrap();
        assert!(classes.is_multiple());
        assert_eq!(classes.values(), vec!["top", "person", "inetOrgPerson"]);
        assert_eq!(entry.get_str("objectClass"), None);
    }

    #[test]
    fn empty_attributes_are_omitted() {
        let entry = NormalizedEntry::from_raw(&sample());
        assert!(!entry.contains("description"));
        assert_eq!(entry.len(), 2);
    }

    #[test]
    fn empty_result_set_gives_no_entries() {
        assert!(NormalizedEntry::from_result_set(&ResultSet::default()).is_empty());
    }

    #[test]
    fn result_set_order_is_preserved() {
        let set = ResultSet::new(vec![
            RawEntry::new("cn=zeta,dc=test,dc=com").with_attribute("cn", ["zeta"]),
            RawEntry::new("cn=alpha,dc=test,dc=com").with_attribute("cn", ["alpha"]),
        ]);
        let entries = NormalizedEntry::from_result_set(&set);
        let names: Vec<_> = entries.iter().filter_map(|e| e.get_str("cn")).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn serializes_as_plain_object() {
        let entry = NormalizedEntry::from_raw(&sample());
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "cn": "test.user",
                "objectClass": ["top", "person", "inetOrgPerson"]
            })
        );
        assert_eq!(
            serde_json::to_value(NormalizedEntry::default()).unwrap(),
            json!({})
        );
    }
}
