//! Cache keys.

use std::fmt;

/// Key of one cache entry: an entity (`course/c1`), a composite
/// (`c1:enrollment`) or a well-known singleton (`me`).
///
/// Keys are compared by their normalized string: surrounding whitespace and
/// slashes are trimmed and repeated slashes collapse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let normalized = raw
            .as_ref()
            .trim()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self(normalized)
    }

    /// `{kind}/{id}`
    pub fn entity(kind: &str, id: &str) -> Self {
        Self::new(format!("{}/{}", kind, id))
    }

    /// `{id}:{facet}`
    pub fn composite(id: &str, facet: &str) -> Self {
        Self::new(format!("{}:{}", id, facet))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_slashes_and_whitespace() {
        assert_eq!(CacheKey::new(" /course//c1/ "), CacheKey::new("course/c1"));
        assert_eq!(CacheKey::entity("course", "c1").as_str(), "course/c1");
    }

    #[test]
    fn composite_keys() {
        assert_eq!(
            CacheKey::composite("c1", "enrollment").to_string(),
            "c1:enrollment"
        );
    }
}
