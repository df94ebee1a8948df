use std::collections::BTreeMap;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

/// How the segments of a tag-value record are separated.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// `tag=value; tag=value` (DMARC, DKIM key records).
    Semicolon,
    /// `tag=value tag=value` (SPF modifiers).
    Whitespace,
}

/// Lower-cased tag names mapped to trimmed values.
///
/// A repeated tag keeps its last value.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMap {
    tags: BTreeMap<String, String>,
}

impl TagMap {
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.tags.get(tag).map(String::as_str)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Parse `record` into a [`TagMap`].
///
/// Segments without `=` or with an empty tag name are dropped; this never
/// fails, whatever the operator published.
pub fn parse_tags(record: &str, delimiter: Delimiter) -> TagMap {
    let mut tags = BTreeMap::new();
    let segments: Box<dyn Iterator<Item = &str>> = match delimiter {
        Delimiter::Semicolon => Box::new(record.split(';')),
        Delimiter::Whitespace => Box::new(record.split_whitespace()),
    };

    for segment in segments {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        tags.insert(key.to_ascii_lowercase(), value.trim().to_string());
    }

    TagMap { tags }
}

pub(crate) fn starts_with_ignore_ascii_case(input: &str, prefix: &str) -> bool {
    input
        .get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}
