//! Structured resource properties.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Prefix used for tag-derived properties.
pub const TAG_PREFIX: &str = "tag";

/// Ordered mapping of property names to values.
///
/// Keys are kept sorted so that rendering and rule evaluation are stable
/// regardless of the order an adapter inserted them in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property.
    pub fn set(&mut self, key: impl Into<String>, value: impl fmt::Display) -> &mut Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    /// Set a property only when the value is present.
    pub fn set_opt<V: fmt::Display>(
        &mut self,
        key: impl Into<String>,
        value: Option<V>,
    ) -> &mut Self {
        if let Some(value) = value {
            self.set(key, value);
        }
        self
    }

    /// Set `prefix:key`.
    pub fn set_with_prefix(
        &mut self,
        prefix: &str,
        key: &str,
        value: impl fmt::Display,
    ) -> &mut Self {
        self.set(format!("{prefix}:{key}"), value)
    }

    /// Set `tag:key`.
    pub fn set_tag(&mut self, key: &str, value: impl fmt::Display) -> &mut Self {
        self.set_with_prefix(TAG_PREFIX, key, value)
    }

    /// Set `tag:prefix:key`, used when one resource carries tags of several
    /// underlying objects.
    pub fn set_tag_with_prefix(
        &mut self,
        prefix: &str,
        key: &str,
        value: impl fmt::Display,
    ) -> &mut Self {
        self.set(format!("{TAG_PREFIX}:{prefix}:{key}"), value)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Look up `tag:key`.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.get(&format!("{TAG_PREFIX}:{key}"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}: \"{value}\"")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_get_namespace_prefix() {
        let mut props = Properties::new();
        props.set_tag("Owner", "team-a");
        props.set_tag_with_prefix("igw", "Name", "main");

        assert_eq!(props.get("tag:Owner"), Some("team-a"));
        assert_eq!(props.tag("Owner"), Some("team-a"));
        assert_eq!(props.get("tag:igw:Name"), Some("main"));
    }

    #[test]
    fn absent_optional_values_are_skipped() {
        let mut props = Properties::new();
        props.set_opt("OwnerID", None::<String>);
        props.set_opt("VpcID", Some("vpc-1"));

        assert_eq!(props.len(), 1);
        assert_eq!(props.get("VpcID"), Some("vpc-1"));
        assert!(props.get("OwnerID").is_none());
    }

    #[test]
    fn display_is_sorted() {
        let mut props = Properties::new();
        props.set("b", 2).set("a", true).set_with_prefix("vpc", "OwnerID", "123");

        assert_eq!(
            props.to_string(),
            r#"[a: "true", b: "2", vpc:OwnerID: "123"]"#
        );
    }
}
