//! B-tree index reader
//!
//! [`BtreeIndex`] descends a built tree to find the chain for a folded
//! target, walking under the index file's mutex because the seek cursor is
//! shared between every concurrent reader. The root node is decompressed
//! once, on the first lookup, and kept for the reader's lifetime; all other
//! nodes are read transiently.

use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use tokio::sync::{Mutex, MutexGuard};

use super::node::{read_cstr_at, read_node, read_u32_at, INTERNAL_NODE_MARK, U32_SIZE};
use super::search;
use super::{IndexError, IndexInfo, WordArticleLink};
use crate::dict::WordSearchRequest;
use crate::folding;
use crate::io::file::IndexFile;

/// Where a located chain lives: a decoded leaf image plus the offset of the
/// chain's size word within it, and the leaf's forward link for walking on.
pub(crate) struct ChainLocation {
    pub(crate) leaf: Arc<Vec<u8>>,
    pub(crate) offset: usize,
    pub(crate) next_leaf: u32,
    pub(crate) exact_match: bool,
}

/// A reader over an on-disk btree index.
///
/// Clones are cheap and share the file handle, its mutex and the cached
/// root node; background searches run against such clones.
#[derive(Clone, Debug, Default)]
pub struct BtreeIndex {
    file: Option<Arc<Mutex<IndexFile>>>,
    node_size: u32,
    root_offset: u32,
    root_node: Arc<OnceLock<Arc<Vec<u8>>>>,
}

impl BtreeIndex {
    /// An unbound reader. Lookups fail with [`IndexError::IndexWasNotOpened`]
    /// until [`open_index`](Self::open_index) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the reader to a built tree inside `file` and drop any previously
    /// cached root node.
    pub fn open_index(&mut self, info: IndexInfo, file: Arc<Mutex<IndexFile>>) {
        self.node_size = info.fanout;
        self.root_offset = info.root_offset;
        self.file = Some(file);
        self.root_node = Arc::new(OnceLock::new());
    }

    /// Exact-match lookup: the chain registered under the folded form of
    /// `word`, filtered down to records whose full headword case-folds to
    /// the query, with prefixes merged in.
    pub async fn find_articles(&self, word: &str) -> Result<Vec<WordArticleLink>> {
        let folded = folding::apply(word);

        let mut result = match self.find_chain(&folded).await? {
            Some(location) if location.exact_match => {
                read_chain(&location.leaf, location.offset)?.0
            }
            _ => return Ok(Vec::new()),
        };

        antialias(word, &mut result);
        Ok(result)
    }

    /// Start an asynchronous prefix search: every headword whose folded form
    /// starts with the folded `word`, middle matches included.
    pub fn prefix_match(&self, word: &str, max_results: usize) -> WordSearchRequest {
        search::spawn(self.clone(), word.to_string(), 0, None, true, max_results)
    }

    /// Start an asynchronous stemmed search: like a prefix search, but the
    /// folded target is retried with up to `max_suffix_variation` trailing
    /// characters chopped off (never below `min_length` characters), and
    /// matches longer than the original target by more than the variation
    /// are dropped. Middle matches are excluded.
    pub fn stemmed_match(
        &self,
        word: &str,
        min_length: usize,
        max_suffix_variation: usize,
        max_results: usize,
    ) -> WordSearchRequest {
        search::spawn(
            self.clone(),
            word.to_string(),
            min_length,
            Some(max_suffix_variation),
            false,
            max_results,
        )
    }

    pub(crate) fn shared_file(&self) -> Result<Arc<Mutex<IndexFile>>, IndexError> {
        self.file.as_ref().cloned().ok_or(IndexError::IndexWasNotOpened)
    }

    /// Locate the chain whose folded key equals `target`, or the first chain
    /// whose key is lexicographically past it. `None` when the tree is empty
    /// or the target sorts after every key.
    pub(crate) async fn find_chain(&self, target: &str) -> Result<Option<ChainLocation>> {
        let file = self.shared_file()?;
        // The whole descent runs under the file mutex: the handle's seek
        // cursor is shared with every other reader.
        let mut file = file.lock().await;
        self.find_chain_with_lock(&mut file, target).await
    }

    async fn find_chain_with_lock(
        &self,
        file: &mut MutexGuard<'_, IndexFile>,
        target: &str,
    ) -> Result<Option<ChainLocation>> {
        let root = match self.root_node.get() {
            Some(root) => root.clone(),
            None => {
                // Load the root once, at the first request. Setters race
                // only in principle: everyone here holds the file mutex.
                let root = Arc::new(read_node(file, self.root_offset).await?);
                let _ = self.root_node.set(root.clone());
                root
            }
        };

        let mut current_offset = self.root_offset;
        let mut node = root;

        loop {
            let head_word = read_u32_at(&node, 0)?;

            if head_word == INTERNAL_NODE_MARK {
                let child = self.pick_child(&node, target)?;
                current_offset = child;
                node = Arc::new(read_node(file, child).await?);
            } else {
                return self
                    .search_leaf(file, node, current_offset, head_word as usize, target)
                    .await;
            }
        }
    }

    /// Binary-search an internal node's pivot region and return the offset
    /// of the child the target descends into.
    fn pick_child(&self, node: &[u8], target: &str) -> Result<u32> {
        let pivots_start = U32_SIZE * (self.node_size as usize + 2);
        let pivots = node
            .get(pivots_start..)
            .ok_or(IndexError::CorruptedChainData)?;
        if pivots.is_empty() {
            return Err(IndexError::CorruptedChainData.into());
        }

        // Shoot at the middle of the NUL-separated string region, scan back
        // to the start of the string we hit, and narrow from there.
        let mut window = 0;
        let mut window_size = pivots.len();

        let (closest, outcome) = loop {
            let test_point = window + window_size / 2;

            let mut closest = test_point;
            while closest > 0 && pivots[closest - 1] != 0 {
                closest -= 1;
            }

            let (pivot, after) = read_cstr_at(pivots, closest)?;

            match target.cmp(pivot) {
                Ordering::Equal => break (closest, Ordering::Equal),
                Ordering::Less => {
                    window_size = closest - window;
                    if window_size == 0 {
                        break (closest, Ordering::Less);
                    }
                }
                Ordering::Greater => {
                    window_size -= after - window;
                    window = after;
                    if window_size == 0 {
                        break (closest, Ordering::Greater);
                    }
                }
            }
        };

        // The pivot's index is the number of strings before it.
        let entry = pivots[..closest].iter().filter(|b| **b == 0).count();

        // Equal keys live in the right subtree, so both the equal and the
        // greater outcome descend to the pivot's right child.
        let child_index = match outcome {
            Ordering::Less => entry,
            _ => entry + 1,
        };

        read_u32_at(node, U32_SIZE * (1 + child_index))
    }

    /// Binary-search a leaf's chains for the target, re-deriving each folded
    /// key from the stored (original) head word.
    async fn search_leaf(
        &self,
        file: &mut MutexGuard<'_, IndexFile>,
        node: Arc<Vec<u8>>,
        current_offset: u32,
        leaf_entries: usize,
        target: &str,
    ) -> Result<Option<ChainLocation>> {
        // If this leaf is the root there is no next leaf, it just can't be.
        // The cursor check matters too: the root was precached, so the
        // file's position indicator is only meaningful for nodes read just
        // now.
        let next_leaf = if current_offset != self.root_offset {
            file.read_u32().await?
        } else {
            0
        };

        if leaf_entries == 0 {
            // Empty leaves exist only in entirely empty trees.
            if current_offset != self.root_offset {
                return Err(IndexError::CorruptedChainData.into());
            }
            return Ok(None);
        }

        // Collect the offset of every chain's size word.
        let mut chain_offsets = Vec::with_capacity(leaf_entries);
        let mut pos = U32_SIZE;
        for _ in 0..leaf_entries {
            chain_offsets.push(pos);
            let chain_size = read_u32_at(&node, pos)? as usize;
            pos = pos
                .checked_add(U32_SIZE + chain_size)
                .ok_or(IndexError::CorruptedChainData)?;
            if pos > node.len() {
                return Err(IndexError::CorruptedChainData.into());
            }
        }

        let mut window = 0;
        let mut window_size = leaf_entries;

        loop {
            let candidate = window + window_size / 2;
            let offset = chain_offsets[candidate];

            let (word, _) = read_cstr_at(&node, offset + U32_SIZE)?;
            let folded_word = folding::apply(word);

            match target.cmp(folded_word.as_str()) {
                Ordering::Equal => {
                    return Ok(Some(ChainLocation {
                        leaf: node,
                        offset,
                        next_leaf,
                        exact_match: true,
                    }));
                }
                Ordering::Less => {
                    window_size /= 2;
                    if window_size == 0 {
                        // The target lands before the last tested chain;
                        // that chain is the prefix candidate.
                        return Ok(Some(ChainLocation {
                            leaf: node,
                            offset,
                            next_leaf,
                            exact_match: false,
                        }));
                    }
                }
                Ordering::Greater => {
                    window_size -= window_size / 2 + 1;
                    if window_size == 0 {
                        // The target lands after the last tested chain: the
                        // candidate is the next one, possibly in the next
                        // leaf.
                        if candidate + 1 < chain_offsets.len() {
                            return Ok(Some(ChainLocation {
                                leaf: node,
                                offset: chain_offsets[candidate + 1],
                                next_leaf,
                                exact_match: false,
                            }));
                        }
                        if next_leaf != 0 {
                            let following = Arc::new(read_node(file, next_leaf).await?);
                            let following_link = file.read_u32().await?;
                            return Ok(Some(ChainLocation {
                                leaf: following,
                                offset: U32_SIZE,
                                next_leaf: following_link,
                                exact_match: false,
                            }));
                        }
                        // That was the last leaf.
                        return Ok(None);
                    }
                    window = candidate + 1;
                }
            }
        }
    }
}

/// Parse the chain whose size word sits at `offset` in `buf`. Returns the
/// decoded records and the offset just past the chain.
pub(crate) fn read_chain(buf: &[u8], offset: usize) -> Result<(Vec<WordArticleLink>, usize)> {
    let mut chain_size = read_u32_at(buf, offset)? as usize;
    let mut pos = offset + U32_SIZE;

    let mut result = Vec::new();

    while chain_size > 0 {
        let (word, after_word) = read_cstr_at(buf, pos)?;
        let (prefix, after_prefix) = read_cstr_at(buf, after_word)?;
        let article_offset = read_u32_at(buf, after_prefix)?;

        let record_size = after_prefix + U32_SIZE - pos;
        if chain_size < record_size {
            return Err(IndexError::CorruptedChainData.into());
        }

        result.push(WordArticleLink {
            word: word.to_string(),
            prefix: prefix.to_string(),
            article_offset,
        });

        chain_size -= record_size;
        pos = after_prefix + U32_SIZE;
    }

    Ok((result, pos))
}

/// Drop every record whose recomposed headword does not case-fold to the
/// query, then merge prefixes into words, since that's what callers expect
/// from an exact lookup.
pub(crate) fn antialias(query: &str, chain: &mut Vec<WordArticleLink>) {
    let case_folded = folding::apply_simple_case_only(query);

    chain.retain_mut(|link| {
        let recomposed = format!("{}{}", link.prefix, link.word);
        if folding::apply_simple_case_only(&recomposed) != case_folded {
            return false;
        }
        if !link.prefix.is_empty() {
            link.word = recomposed;
            link.prefix.clear();
        }
        true
    });
}
