/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use memchr::memchr2;

mod cache;
pub use cache::TagCache;

/// A single parsed `key=value` tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// An interned, immutable tag set shared by every metric whose key carries
/// the exact same raw tag text.
///
/// Two tag sets built from textually different raw strings are distinct
/// objects with distinct indices even when their parsed content matches.
#[derive(Debug)]
pub struct TagSet {
    index: u32,
    tag_len: usize,
    tags: Vec<Tag>,
}

impl TagSet {
    /// Parse raw tag text into a candidate tag set.
    ///
    /// Fragments are split on `,`. Each fragment is split on `=` with runs of
    /// consecutive `=` collapsed into one separator. A fragment that does not
    /// yield both a non-empty key and a non-empty value is discarded, but its
    /// bytes still count toward `tag_len`.
    pub fn parse(raw: &str) -> Self {
        let mut tags = Vec::new();
        for fragment in raw.split(',') {
            if let Some(tag) = parse_fragment(fragment) {
                tags.push(tag);
            }
        }
        TagSet {
            index: 0,
            tag_len: raw.len(),
            tags,
        }
    }

    /// Globally unique intern index, assigned once at first insertion.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Byte length of the raw tag-text span this set was parsed from,
    /// malformed fragments included.
    #[inline]
    pub fn tag_len(&self) -> usize {
        self.tag_len
    }

    #[inline]
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }
}

fn parse_fragment(fragment: &str) -> Option<Tag> {
    let mut parts = fragment.split('=').filter(|s| !s.is_empty());
    let key = parts.next()?;
    let value = parts.next()?;
    Some(Tag {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Find the byte offset of the first tag delimiter in a metric key.
///
/// Both the InfluxDB (`,`) and Librato (`#`) conventions are recognized.
/// Returns `None` when the key carries no tags.
pub fn tag_offset(key: &str) -> Option<usize> {
    memchr2(b',', b'#', key.as_bytes())
}
