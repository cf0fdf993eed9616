use std::fmt;
use std::sync::Arc;

/// An immutable, ordered list of `key:value` metric tags.
///
/// Extending a tag set never touches the original: `with` and `extend`
/// allocate a fresh sequence, so a base set can be shared across devices
/// and sessions without one resource's tags leaking into another's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: Arc<[String]>,
}

impl TagSet {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a comma-separated list such as `"env:prod,region:eu"`.
    pub fn parse(raw: &str) -> Self {
        Self::new(raw.split(',').map(str::trim).filter(|t| !t.is_empty()))
    }

    /// Returns a copy with one more tag appended.
    pub fn with(&self, tag: impl Into<String>) -> Self {
        self.extend([tag])
    }

    pub fn extend<I, S>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<String> = self
            .tags
            .iter()
            .cloned()
            .chain(extra.into_iter().map(Into::into))
            .collect();
        Self { tags: tags.into() }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.tags
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.iter().any(|t| t == tag)
    }

    /// Splits every tag into `(key, value)`. Bare tags get the value `"true"`.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter()
            .map(|tag| tag.split_once(':').unwrap_or((tag, "true")))
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tags.join(","))
    }
}
