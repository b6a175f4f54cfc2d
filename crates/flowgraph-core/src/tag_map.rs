//! Tag-indexed port collections.
//!
//! A node declares its ports as a list of `TAG:index:name` strings (see
//! [`crate::tag`]). [`TagMap`] turns that list into a dense numbering: every
//! `(tag, index)` pair gets one [`CollectionItemId`], the ids of one tag form
//! a contiguous range, and tags are laid out in sorted order with the
//! untagged collection (empty tag) first.
//!
//! ```rust
//! use flowgraph_core::TagMap;
//!
//! let map = TagMap::new(&["VIDEO:1:right", "audio", "VIDEO:left"]).unwrap();
//! assert_eq!(map.num_entries(), 3);
//! assert_eq!(map.names(), &["audio", "left", "right"]);
//! assert_eq!(map.get_id("VIDEO", 1).map(|id| id.index()), Some(2));
//! ```

use core::fmt;
use std::collections::BTreeMap;

use thiserror::Error;

use crate::tag::{NameError, parse_tag_index_name};

/// Flat ordinal of a `(tag, index)` pair within a [`TagMap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionItemId(u32);

impl CollectionItemId {
    /// Wraps a raw ordinal.
    #[inline]
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Returns the ordinal as a `usize` for slice indexing.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CollectionItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Range of ids owned by one tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagData {
    /// First id of the tag.
    pub id: CollectionItemId,
    /// Number of indices under the tag.
    pub count: usize,
}

/// Errors raised while building a [`TagMap`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TagMapError {
    /// An entry failed the name grammar.
    #[error(transparent)]
    Name(#[from] NameError),

    /// Two entries claimed the same `(tag, index)` slot.
    #[error(
        "tag \"{tag}\" index {index} already had a name \"{existing}\" but is being reassigned a name \"{name}\""
    )]
    DuplicateIndex {
        /// Tag of the slot.
        tag: String,
        /// Index of the slot.
        index: usize,
        /// Name assigned first.
        existing: String,
        /// Name that tried to take the slot.
        name: String,
    },

    /// Indices under a tag do not cover `0..count`.
    #[error("indices for tag \"{tag}\" are not contiguous: missing {missing:?}")]
    MissingIndices {
        /// The tag with gaps.
        tag: String,
        /// Every index below the highest one that has no name.
        missing: Vec<usize>,
    },
}

/// Immutable mapping from `(tag, index)` to [`CollectionItemId`].
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TagMap {
    mapping: BTreeMap<String, TagData>,
    names: Vec<String>,
}

impl TagMap {
    /// Builds a map from `TAG:index:name` entries.
    ///
    /// Entries without an index take the next free position of their tag in
    /// the order they appear. Reusing an index or leaving a gap is an error.
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Result<Self, TagMapError> {
        let mut slots_by_tag: BTreeMap<String, Vec<Option<String>>> = BTreeMap::new();

        for entry in entries {
            let parsed = parse_tag_index_name(entry.as_ref())?;
            let slots = slots_by_tag.entry(parsed.tag.clone()).or_default();
            let index = parsed.index.map_or(slots.len(), |i| i as usize);
            if index >= slots.len() {
                slots.resize(index + 1, None);
            }
            if let Some(existing) = &slots[index] {
                return Err(TagMapError::DuplicateIndex {
                    tag: parsed.tag,
                    index,
                    existing: existing.clone(),
                    name: parsed.name,
                });
            }
            slots[index] = Some(parsed.name);
        }

        let mut mapping = BTreeMap::new();
        let mut names = Vec::with_capacity(entries.len());
        for (tag, slots) in slots_by_tag {
            let missing: Vec<usize> = slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.is_none())
                .map(|(i, _)| i)
                .collect();
            if !missing.is_empty() {
                return Err(TagMapError::MissingIndices { tag, missing });
            }
            mapping.insert(
                tag,
                TagData {
                    id: CollectionItemId::new(names.len()),
                    count: slots.len(),
                },
            );
            names.extend(slots.into_iter().flatten());
        }

        Ok(Self { mapping, names })
    }

    /// Returns an empty map.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Total number of ids.
    pub fn num_entries(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no entries were declared.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns true if the tag has at least one entry.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.mapping.contains_key(tag)
    }

    /// Number of indices under `tag` (0 for unknown tags).
    pub fn num_entries_for(&self, tag: &str) -> usize {
        self.mapping.get(tag).map_or(0, |data| data.count)
    }

    /// Id of `(tag, index)`, or `None` if the pair is out of range.
    pub fn get_id(&self, tag: &str, index: u32) -> Option<CollectionItemId> {
        let data = self.mapping.get(tag)?;
        let index = index as usize;
        (index < data.count).then(|| CollectionItemId::new(data.id.index() + index))
    }

    /// First id of `tag`.
    pub fn begin_id(&self, tag: &str) -> Option<CollectionItemId> {
        self.mapping.get(tag).map(|data| data.id)
    }

    /// One past the last id of `tag`.
    pub fn end_id(&self, tag: &str) -> Option<CollectionItemId> {
        self.mapping
            .get(tag)
            .map(|data| CollectionItemId::new(data.id.index() + data.count))
    }

    /// Ids of `tag` in index order; empty for unknown tags.
    pub fn ids_for(&self, tag: &str) -> impl Iterator<Item = CollectionItemId> + '_ {
        let range = self
            .mapping
            .get(tag)
            .map_or(0..0, |data| data.id.index()..data.id.index() + data.count);
        range.map(CollectionItemId::new)
    }

    /// All ids in order.
    pub fn ids(&self) -> impl Iterator<Item = CollectionItemId> {
        (0..self.names.len()).map(CollectionItemId::new)
    }

    /// Reverse lookup of an id.
    pub fn tag_and_index_from_id(&self, id: CollectionItemId) -> Option<(&str, u32)> {
        self.mapping.iter().find_map(|(tag, data)| {
            let offset = id.index().checked_sub(data.id.index())?;
            (offset < data.count).then_some((tag.as_str(), offset as u32))
        })
    }

    /// Names in id order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Name assigned to `id`.
    pub fn name(&self, id: CollectionItemId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    /// Tags with their id ranges, sorted by tag.
    pub fn mapping(&self) -> impl Iterator<Item = (&str, TagData)> {
        self.mapping.iter().map(|(tag, data)| (tag.as_str(), *data))
    }

    /// Tags in sorted order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.mapping.keys().map(String::as_str)
    }

    /// Structural equivalence: same tags with the same counts, names ignored.
    pub fn is_equivalent_to(&self, other: &TagMap) -> bool {
        self.mapping.len() == other.mapping.len()
            && self
                .mapping
                .iter()
                .zip(other.mapping.iter())
                .all(|((tag_a, a), (tag_b, b))| tag_a == tag_b && a.count == b.count)
    }

    /// Canonical entry strings in id order.
    ///
    /// Untagged entries render as bare names, tagged ones as `TAG:index:name`.
    pub fn canonical_entries(&self) -> Vec<String> {
        let mut entries = Vec::with_capacity(self.names.len());
        for (tag, data) in &self.mapping {
            for offset in 0..data.count {
                let name = &self.names[data.id.index() + offset];
                if tag.is_empty() {
                    entries.push(name.clone());
                } else {
                    entries.push(format!("{tag}:{offset}:{name}"));
                }
            }
        }
        entries
    }
}

impl fmt::Display for TagMap {
    /// Compact `{TAG:count, ...}` summary used in diagnostics.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .mapping
            .iter()
            .map(|(tag, data)| format!("{tag}:{}", data.count))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}
