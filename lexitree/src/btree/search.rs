//! Asynchronous word search
//!
//! Each prefix or stemmed search runs as one background task against a
//! clone of the reader. The worker locates the chain for the folded target,
//! walks the linked leaves forward while folded keys keep the target as a
//! prefix, then (for stemmed searches) chops a trailing character off the
//! target and retries. Cancellation is cooperative: the flag is checked at
//! worker entry, between chains and between chop iterations.

use std::sync::Arc;

use anyhow::Result;

use super::index::{read_chain, BtreeIndex};
use super::node::{read_node, U32_SIZE};
use super::IndexError;
use crate::dict::{SearchContext, WordMatch, WordSearchRequest};
use crate::folding;

pub(crate) fn spawn(
    index: BtreeIndex,
    word: String,
    min_length: usize,
    max_suffix_variation: Option<usize>,
    allow_middle_matches: bool,
    max_results: usize,
) -> WordSearchRequest {
    WordSearchRequest::start(move |ctx| {
        run(
            index,
            ctx,
            word,
            min_length,
            max_suffix_variation,
            allow_middle_matches,
            max_results,
        )
    })
}

async fn run(
    index: BtreeIndex,
    ctx: SearchContext,
    word: String,
    min_length: usize,
    max_suffix_variation: Option<usize>,
    allow_middle_matches: bool,
    max_results: usize,
) -> Result<()> {
    if ctx.is_cancelled() {
        return Ok(());
    }

    let mut folded = folding::apply(&word);
    let initial_folded_size = folded.chars().count() as i64;

    let mut chars_left_to_chop = match max_suffix_variation {
        Some(variation) => initial_folded_size
            .saturating_sub(min_length as i64)
            .clamp(0, variation as i64),
        None => 0,
    };

    loop {
        if let Some(location) = index.find_chain(&folded).await? {
            let mut leaf = location.leaf;
            let mut offset = location.offset;
            let mut next_leaf = location.next_leaf;

            loop {
                if ctx.is_cancelled() {
                    break;
                }

                let (chain, after) = read_chain(&leaf, offset)?;
                let head = chain.first().ok_or(IndexError::CorruptedChainData)?;
                let result_folded = folding::apply(&head.word);

                if !result_folded.starts_with(folded.as_str()) {
                    // Neither exact nor a prefix match, end this target.
                    break;
                }

                // If suffix variation is bounded, make sure the hit isn't
                // longer than requested.
                let within_variation = match max_suffix_variation {
                    Some(variation) => {
                        result_folded.chars().count() as i64 - initial_folded_size
                            <= variation as i64
                    }
                    None => true,
                };

                let gathered = ctx.with_matches(|matches| {
                    for link in &chain {
                        // Skip middle matches, if requested.
                        if within_variation
                            && (allow_middle_matches || folding::apply(&link.prefix).is_empty())
                        {
                            matches.push(WordMatch {
                                word: format!("{}{}", link.prefix, link.word),
                            });
                        }
                    }
                    matches.len()
                });

                if gathered >= max_results {
                    // This allows a few more than max_results when the last
                    // chain yields several records. That's fine, and maybe
                    // even desirable.
                    break;
                }

                offset = after;
                if offset >= leaf.len() {
                    // We're past the current leaf, fetch the next one.
                    if next_leaf == 0 {
                        break; // That was the last leaf
                    }
                    let file = index.shared_file()?;
                    let mut file = file.lock().await;
                    leaf = Arc::new(read_node(&mut file, next_leaf).await?);
                    next_leaf = file.read_u32().await?;
                    offset = U32_SIZE;
                }
            }
        }

        if chars_left_to_chop > 0 && !ctx.is_cancelled() {
            chars_left_to_chop -= 1;
            folded.pop();
        } else {
            break;
        }
    }

    Ok(())
}
