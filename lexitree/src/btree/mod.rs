//! On-disk B-tree index implementation
//!

// Re-export
pub use self::builder::build_index;
pub use self::builder::IndexedWords;
pub use self::index::BtreeIndex;

pub mod builder;
pub mod index;
mod node;
mod search;
mod stream;

use thiserror::Error;

/// Failures the index reader can surface.
#[derive(Error, Debug)]
pub enum IndexError {
    /// A lookup was attempted before the reader was bound to a file.
    #[error("index was not opened")]
    IndexWasNotOpened,

    /// A node's payload would not inflate to its recorded size.
    #[error("failed to decompress a btree node")]
    FailedToDecompressNode,

    /// A leaf or chain was structurally inconsistent.
    #[error("corrupted chain data")]
    CorruptedChainData,

    /// A stored string was not valid UTF-8.
    #[error("can't decode stored string as utf8")]
    CantDecodeUtf8,
}

/// Where a built btree lives inside its file, and how wide its nodes are.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexInfo {
    /// Pivots per internal node; each internal node has `fanout + 1` children.
    pub fanout: u32,
    /// File offset of the root node.
    pub root_offset: u32,
}

/// One record of a chain: a headword position pointing at its article.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WordArticleLink {
    /// The indexed word, as originally written. For a middle match this is
    /// the headword's tail starting at an interior token.
    pub word: String,
    /// Text preceding `word` within the original headword; empty for
    /// whole-headword entries.
    pub prefix: String,
    /// Offset of the article in the article data file.
    pub article_offset: u32,
}

impl WordArticleLink {
    /// A whole-headword link.
    pub fn new(word: impl Into<String>, article_offset: u32) -> Self {
        Self {
            word: word.into(),
            prefix: String::new(),
            article_offset,
        }
    }

    /// A link carrying the text that precedes `word` in its headword.
    pub fn with_prefix(
        word: impl Into<String>,
        article_offset: u32,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            word: word.into(),
            prefix: prefix.into(),
            article_offset,
        }
    }
}
