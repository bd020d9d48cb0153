#![warn(missing_docs)]
//! Lexitree
//!
//! # What is this?
//!
//! A persistent, on-disk B-tree index for dictionary headword lookup.
//!
//! # Implementation Details
//!
//! Dictionaries are compiled once: headwords are folded (case and diacritics
//! removed), tokenized so that interior words of multi-token headwords are
//! reachable too, and collected into an [`btree::IndexedWords`] map. The map
//! is then laid out as a balanced B-tree of zlib-compressed nodes by
//! [`btree::build_index`]; leaves carry a forward link to the next leaf so
//! the whole key space can be walked in order.
//!
//! Lookups go through [`btree::BtreeIndex`], which shares a single file
//! handle (and its mutex) with the owning dictionary. Exact lookups descend
//! the tree and read one chain of records. Prefix and stemmed searches run as
//! cancellable background tasks that walk the linked leaves, chopping
//! trailing characters off the target for stemmed matching.
//!
//! The [`dict::Dictionary`] trait ties the different dictionary kinds
//! together; [`dict::BtreeDictionary`] is the B-tree backed kind and
//! [`translit::TransliterationDictionary`] a table-driven one.

pub mod btree;
pub mod dict;
pub mod folding;
pub mod io;
pub mod translit;

use bincode::config::AllowTrailing;
use bincode::config::FixintEncoding;
use bincode::config::WithOtherIntEncoding;
use bincode::config::WithOtherTrailing;
use bincode::{DefaultOptions, Options};
use std::sync::LazyLock;

static BINCODER: LazyLock<
    WithOtherIntEncoding<WithOtherTrailing<DefaultOptions, AllowTrailing>, FixintEncoding>,
> = LazyLock::new(|| {
    bincode::DefaultOptions::new()
        .allow_trailing_bytes()
        .with_fixint_encoding()
});
