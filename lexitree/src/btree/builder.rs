//! Index construction
//!
//! [`IndexedWords`] gathers folded headwords in memory; [`build_index`] lays
//! them out as a balanced btree of compressed nodes. The builder is
//! single-shot: it writes a complete tree in one pass and never revisits it.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::iter::Peekable;

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;

use super::node::{write_node, INTERNAL_NODE_MARK, U32_SIZE};
use super::{IndexInfo, WordArticleLink};
use crate::folding;
use crate::io::file::IndexFile;

const BTREE_MIN_ELEMENTS: usize = 64;
const BTREE_MAX_ELEMENTS: usize = 4096;

/// Middle matches stop accumulating on a chain once it holds this many
/// records; whole-headword records are always kept.
const MAX_MIDDLE_MATCHES: usize = 1024;

type WordIter<'w> = Peekable<btree_map::Iter<'w, String, Vec<WordArticleLink>>>;

/// In-memory builder state: folded keys mapped to their chains, sorted in
/// byte-lexicographic order.
#[derive(Debug, Default)]
pub struct IndexedWords {
    words: BTreeMap<String, Vec<WordArticleLink>>,
}

impl IndexedWords {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct folded keys.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether any key has been added.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Register a headword under its folded key, and additionally under the
    /// folded tail starting at each interior token, so that "york" in
    /// "New York City" is reachable. Interior entries carry the preceding
    /// text as their prefix.
    pub fn add_word(&mut self, word: &str, article_offset: u32) {
        let trimmed = word.trim_matches(|c: char| folding::is_whitespace(c));

        let mut in_token = false;
        let mut starts = Vec::new();
        for (pos, c) in trimmed.char_indices() {
            let boundary = folding::is_whitespace(c) || folding::is_punct(c);
            if !boundary && !in_token {
                starts.push(pos);
            }
            in_token = !boundary;
        }

        for start in starts {
            let tail = &trimmed[start..];
            let chain = self.words.entry(folding::apply(tail)).or_default();

            // Don't overpopulate chains with middle matches; the
            // whole-headword entry always goes in.
            if chain.len() < MAX_MIDDLE_MATCHES || start == 0 {
                chain.push(WordArticleLink::with_prefix(
                    tail,
                    article_offset,
                    &trimmed[..start],
                ));
            }
        }
    }

    /// Register exactly one entry under the word's folded key, with no
    /// middle-match expansion.
    pub fn add_single_word(&mut self, word: &str, article_offset: u32) {
        self.words
            .entry(folding::apply(word))
            .or_default()
            .push(WordArticleLink::new(word, article_offset));
    }

    pub(crate) fn chain(&self, folded: &str) -> Option<&[WordArticleLink]> {
        self.words.get(folded).map(|chain| chain.as_slice())
    }

    fn iter(&self) -> WordIter<'_> {
        self.words.iter().peekable()
    }
}

/// Write `words` as a btree at the file's current position and return where
/// its root landed.
///
/// Empty keys are skipped; an input with no usable keys still produces a
/// valid (single empty leaf) tree. The fanout is chosen so that most
/// real-world dictionaries get a two-level tree.
pub async fn build_index(words: &IndexedWords, file: &mut IndexFile) -> Result<IndexInfo> {
    let mut iter = words.iter();
    let mut index_size = words.len();

    // Skip any empty words. No point in indexing those, and some source
    // dictionaries are known to contain buggy empty-headword entries.
    while index_size > 0 && iter.peek().is_some_and(|(key, _)| key.is_empty()) {
        iter.next();
        index_size -= 1;
    }

    let max_elements =
        ((index_size as f64).sqrt() as usize + 1).clamp(BTREE_MIN_ELEMENTS, BTREE_MAX_ELEMENTS);

    tracing::debug!(
        entries = index_size,
        fanout = max_elements,
        "building btree index"
    );

    let mut last_leaf_link_offset = 0;
    let root_offset = build_node(
        &mut iter,
        index_size,
        file,
        max_elements,
        &mut last_leaf_link_offset,
    )
    .await?;

    Ok(IndexInfo {
        fanout: max_elements as u32,
        root_offset,
    })
}

/// Recursively serialize one subtree, consuming exactly `index_size` entries
/// from the iterator, and return the subtree root's offset.
///
/// `last_leaf_link_offset` tracks where the previously written leaf's
/// forward-link word sits on disk; each new leaf patches it to point at
/// itself and leaves its own link behind.
fn build_node<'a, 'w: 'a>(
    iter: &'a mut WordIter<'w>,
    index_size: usize,
    file: &'a mut IndexFile,
    max_elements: usize,
    last_leaf_link_offset: &'a mut u32,
) -> BoxFuture<'a, Result<u32>> {
    async move {
        let is_leaf = index_size <= max_elements;

        let mut payload = Vec::new();

        if is_leaf {
            payload.extend_from_slice(&(index_size as u32).to_le_bytes());

            for _ in 0..index_size {
                let (_, chain) = iter
                    .next()
                    .ok_or_else(|| anyhow!("btree partition ran out of entries"))?;

                let size_pos = payload.len();
                payload.extend_from_slice(&0u32.to_le_bytes());

                let mut size = 0;
                for link in chain {
                    payload.extend_from_slice(link.word.as_bytes());
                    payload.push(0);
                    payload.extend_from_slice(link.prefix.as_bytes());
                    payload.push(0);
                    payload.extend_from_slice(&link.article_offset.to_le_bytes());
                    size += (link.word.len() + 1 + link.prefix.len() + 1 + U32_SIZE) as u32;
                }
                payload[size_pos..size_pos + U32_SIZE].copy_from_slice(&size.to_le_bytes());
            }
        } else {
            payload.extend_from_slice(&INTERNAL_NODE_MARK.to_le_bytes());
            // Reserve the child offset array; pivots follow it.
            payload.resize(U32_SIZE * (max_elements + 2), 0);
            let mut pivots = Vec::new();

            let mut prev_entry = 0;
            for x in 0..max_elements {
                let cur_entry = index_size * (x + 1) / (max_elements + 1);

                let child = build_node(
                    iter,
                    cur_entry - prev_entry,
                    file,
                    max_elements,
                    last_leaf_link_offset,
                )
                .await?;
                payload[U32_SIZE * (x + 1)..U32_SIZE * (x + 2)]
                    .copy_from_slice(&child.to_le_bytes());

                // The iterator now rests on the first key of the next slice:
                // that key is this child's pivot.
                let (key, _) = iter
                    .peek()
                    .ok_or_else(|| anyhow!("btree partition ran out of pivot keys"))?;
                pivots.extend_from_slice(key.as_bytes());
                pivots.push(0);

                prev_entry = cur_entry;
            }

            // Rightmost child takes the remainder.
            let child = build_node(
                iter,
                index_size - prev_entry,
                file,
                max_elements,
                last_leaf_link_offset,
            )
            .await?;
            payload[U32_SIZE * (max_elements + 1)..U32_SIZE * (max_elements + 2)]
                .copy_from_slice(&child.to_le_bytes());

            payload.extend_from_slice(&pivots);
        }

        let offset = write_node(file, &payload).await?;

        if is_leaf {
            // A link to the next leaf, which is zero and which will be
            // patched should another leaf follow.
            file.write_u32(0).await?;

            let here = file.tell().await?;
            if *last_leaf_link_offset != 0 {
                file.seek(*last_leaf_link_offset as u64).await?;
                file.write_u32(offset).await?;
                file.seek(here).await?;
            }
            *last_leaf_link_offset = (here as u32) - U32_SIZE as u32;
        }

        Ok(offset)
    }
    .boxed()
}
