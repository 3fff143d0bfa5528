//! Structural query keys.
//!
//! A key is an ordered tuple of JSON values. Each segment is stored in its
//! canonical rendering (object members sorted), so keys built from equal
//! values compare and hash equal no matter how they were constructed.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Identifies one cached query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    /// The empty key. It is a prefix of every key.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Builds a key from already-converted segments.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self(values.into_iter().map(|v| v.to_string()).collect())
    }

    /// Appends a segment.
    ///
    /// Segments that cannot be represented as JSON become `null`.
    #[must_use]
    pub fn push(mut self, segment: impl Serialize) -> Self {
        let value = serde_json::to_value(segment).unwrap_or(Value::Null);
        self.0.push(value.to_string());
        self
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the root key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if `prefix` matches this key segment by segment.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// The segments as JSON values.
    pub fn segments(&self) -> Vec<Value> {
        self.0
            .iter()
            .map(|s| serde_json::from_str(s).unwrap_or(Value::Null))
            .collect()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(","))
    }
}

/// Builds a [`QueryKey`] from a list of serializable segments.
///
/// ```
/// use slotwise_query::query_key;
///
/// let key = query_key!["clients", "detail", 42];
/// assert_eq!(key.to_string(), r#"["clients","detail",42]"#);
/// ```
#[macro_export]
macro_rules! query_key {
    () => { $crate::QueryKey::root() };
    ($($segment:expr),+ $(,)?) => {
        $crate::QueryKey::root()$(.push(&$segment))+
    };
}

/// The key taxonomy of one entity collection.
///
/// `all ⊃ lists ⊃ list(filters)` and `all ⊃ details ⊃ detail(id)`, so
/// invalidating a shorter key reaches every descendant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityKeys {
    entity: &'static str,
}

impl EntityKeys {
    /// Taxonomy rooted at `entity`.
    pub const fn new(entity: &'static str) -> Self {
        Self { entity }
    }

    /// The collection name.
    pub const fn entity(&self) -> &'static str {
        self.entity
    }

    /// `[entity]`
    pub fn all(&self) -> QueryKey {
        QueryKey::root().push(self.entity)
    }

    /// `[entity, "list"]`
    pub fn lists(&self) -> QueryKey {
        self.all().push("list")
    }

    /// `[entity, "list", filters]`
    pub fn list(&self, filters: impl Serialize) -> QueryKey {
        self.lists().push(filters)
    }

    /// `[entity, "detail"]`
    pub fn details(&self) -> QueryKey {
        self.all().push("detail")
    }

    /// `[entity, "detail", id]`
    pub fn detail(&self, id: impl Serialize) -> QueryKey {
        self.details().push(id)
    }
}
