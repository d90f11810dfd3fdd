//! Dotted model names

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// A model's logical name: one or more non-empty segments joined by dots,
/// mirroring the file's place under the models tree (`silver/orders.sql`
/// registers as `silver.orders`). The final segment is the warehouse object
/// name; the prefix, when present, is the schema layer the model
/// materialises into unless its config overrides it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelName(String);

impl ModelName {
    /// Validate and wrap a dotted name.
    ///
    /// Returns `None` for the empty string and for names with an empty
    /// segment (`".a"`, `"a."`, `"a..b"`).
    pub fn try_new(name: impl Into<String>) -> Option<Self> {
        let s = name.into();
        if s.is_empty() || s.split('.').any(str::is_empty) {
            return None;
        }
        Some(Self(s))
    }

    /// Wrap a name known to be well-formed.
    ///
    /// Panics on malformed input; use [`try_new`](Self::try_new) for
    /// anything user-supplied.
    pub fn new(name: impl Into<String>) -> Self {
        let s = name.into();
        match Self::try_new(s.as_str()) {
            Some(name) => name,
            None => panic!("malformed model name '{}'", s),
        }
    }

    /// Assemble a name from already-split path segments.
    pub fn from_segments<I, S>(segments: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut joined = String::new();
        for segment in segments {
            if !joined.is_empty() {
                joined.push('.');
            }
            joined.push_str(segment.as_ref());
        }
        Self::try_new(joined)
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper, returning the inner `String`.
    pub fn into_inner(self) -> String {
        self.0
    }

    /// The dot-separated segments, in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// The final segment: the warehouse object name.
    pub fn leaf(&self) -> &str {
        // Invariant: segments are non-empty, so the last split always exists
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// The dotted prefix before the leaf, if any.
    pub fn layer(&self) -> Option<&str> {
        self.0.rfind('.').map(|pos| &self.0[..pos])
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// str-keyed map lookups (`entries.get("silver.orders")`) go through Borrow
impl Borrow<str> for ModelName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ModelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ModelName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ModelName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_new_validates_segments() {
        assert!(ModelName::try_new("orders").is_some());
        assert!(ModelName::try_new("silver.orders").is_some());
        assert!(ModelName::try_new("gold.sales.daily").is_some());

        assert!(ModelName::try_new("").is_none());
        assert!(ModelName::try_new(".orders").is_none());
        assert!(ModelName::try_new("orders.").is_none());
        assert!(ModelName::try_new("a..b").is_none());
    }

    #[test]
    #[should_panic(expected = "malformed model name")]
    fn test_new_panics_on_malformed() {
        ModelName::new("a..b");
    }

    #[test]
    fn test_from_segments() {
        let name = ModelName::from_segments(["silver", "orders"]).unwrap();
        assert_eq!(name, "silver.orders");

        assert!(ModelName::from_segments(["silver", ""]).is_none());
        assert!(ModelName::from_segments(Vec::<&str>::new()).is_none());
    }

    #[test]
    fn test_segments_leaf_layer() {
        let name = ModelName::new("gold.sales.daily");
        assert_eq!(name.segments().collect::<Vec<_>>(), vec!["gold", "sales", "daily"]);
        assert_eq!(name.leaf(), "daily");
        assert_eq!(name.layer(), Some("gold.sales"));

        let flat = ModelName::new("orders");
        assert_eq!(flat.leaf(), "orders");
        assert_eq!(flat.layer(), None);
    }

    #[test]
    fn test_display_and_comparisons() {
        let name = ModelName::new("silver.orders");
        assert_eq!(name.to_string(), "silver.orders");
        assert_eq!(name, "silver.orders");
        assert_eq!(name.as_str(), "silver.orders");
        assert_eq!(name.clone().into_inner(), "silver.orders");
    }

    #[test]
    fn test_str_keyed_lookup() {
        use std::collections::HashMap;
        let mut map: HashMap<ModelName, i32> = HashMap::new();
        map.insert(ModelName::new("silver.orders"), 7);
        assert_eq!(map.get("silver.orders"), Some(&7));
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let mut names = vec![
            ModelName::new("silver.b"),
            ModelName::new("gold.a"),
            ModelName::new("silver.a"),
        ];
        names.sort();
        let sorted: Vec<&str> = names.iter().map(ModelName::as_str).collect();
        assert_eq!(sorted, vec!["gold.a", "silver.a", "silver.b"]);
    }

    #[test]
    fn test_serde_is_transparent() {
        let name = ModelName::new("silver.orders");
        assert_eq!(serde_json::to_string(&name).unwrap(), r#""silver.orders""#);
        let back: ModelName = serde_json::from_str(r#""silver.orders""#).unwrap();
        assert_eq!(back, name);
    }
}
