//! The shapes for filtering cloud resources by tag

use std::collections::HashMap;

/// A single tag filter
///
/// A resource matches a filter when it carries a tag with the filter's key
/// and, unless `values` is empty, one of the filter's values.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    /// The tag key to require
    pub key: String,
    /// The tag values to accept, or empty to accept any value
    #[serde(default)]
    pub values: Vec<String>,
}

impl TagFilter {
    /// Create a filter requiring a tag key with one specific value
    ///
    /// # Arguments
    ///
    /// * `key` - The tag key to require
    /// * `value` - The tag value to require
    pub fn new<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        TagFilter {
            key: key.into(),
            values: vec![value.into()],
        }
    }

    /// Create a filter requiring only that a tag key is present
    ///
    /// # Arguments
    ///
    /// * `key` - The tag key to require
    pub fn key_only<K: Into<String>>(key: K) -> Self {
        TagFilter {
            key: key.into(),
            values: Vec::default(),
        }
    }
}

/// A cloud resource and its tags
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TaggedResource {
    /// The id of this resource
    pub id: String,
    /// The tags on this resource
    #[serde(default)]
    pub tags: HashMap<String, String>,
}
