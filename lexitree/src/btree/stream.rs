use std::sync::Arc;

use anyhow::Result;
use futures::stream;
use futures::Stream;

use super::index::{read_chain, BtreeIndex};
use super::node::{read_node, U32_SIZE};
use super::WordArticleLink;

impl BtreeIndex {
    /// Return a stream of chains in folded-key order.
    ///
    /// The stream starts at the smallest key and follows the leaf forward
    /// links, so it visits every chain exactly once. Each item is one
    /// decoded chain; the file mutex is only held while fetching the next
    /// leaf, never between items.
    pub async fn chains(
        &self,
    ) -> Result<impl Stream<Item = Result<Vec<WordArticleLink>>> + '_> {
        // The empty string sorts before every key, so the prefix candidate
        // for it is the very first chain in the tree.
        let start = self.find_chain("").await?;
        let state = start.map(|location| (location.leaf, location.offset, location.next_leaf));

        Ok(Box::pin(stream::unfold(state, move |state| async move {
            let (leaf, offset, next_leaf) = state?;

            let (chain, after) = match read_chain(&leaf, offset) {
                Ok(decoded) => decoded,
                Err(e) => return Some((Err(e), None)),
            };

            // Step to the following chain, fetching the next leaf once this
            // one is exhausted.
            let next_state = if after >= leaf.len() {
                if next_leaf == 0 {
                    None
                } else {
                    let file = match self.shared_file() {
                        Ok(file) => file,
                        Err(e) => return Some((Err(e.into()), None)),
                    };
                    let mut file = file.lock().await;
                    let following = match read_node(&mut file, next_leaf).await {
                        Ok(bytes) => Arc::new(bytes),
                        Err(e) => return Some((Err(e), None)),
                    };
                    let following_link = match file.read_u32().await {
                        Ok(link) => link,
                        Err(e) => return Some((Err(e), None)),
                    };
                    Some((following, U32_SIZE, following_link))
                }
            } else {
                Some((leaf, after, next_leaf))
            };

            Some((Ok(chain), next_state))
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    use crate::btree::{build_index, IndexedWords};
    use crate::io::file::IndexFile;
    use tokio::sync::Mutex;

    #[test_log::test(tokio::test)]
    async fn it_streams_chains_in_key_order() {
        let mut words = IndexedWords::new();
        let input = [
            "pear", "apple", "quince", "banana", "fig", "cherry", "medlar", "damson", "lime",
        ];
        for (offset, word) in input.iter().enumerate() {
            words.add_single_word(word, offset as u32);
        }

        let mut file = IndexFile::create("streams_chains.idx")
            .await
            .expect("creates index file");
        let info = build_index(&words, &mut file).await.expect("builds index");

        let mut index = BtreeIndex::new();
        index.open_index(info, Arc::new(Mutex::new(file)));

        let mut streamer = index.chains().await.expect("opens stream");
        let mut seen = Vec::new();
        while let Some(chain) = streamer.next().await {
            let chain = chain.expect("decodes chain");
            assert_eq!(chain.len(), 1);
            seen.push(chain[0].word.clone());
        }

        let mut expected: Vec<String> = input.iter().map(|w| w.to_string()).collect();
        expected.sort();
        assert_eq!(seen, expected);

        std::fs::remove_file("streams_chains.idx").expect("cleanup");
    }

    #[test_log::test(tokio::test)]
    async fn it_streams_nothing_from_an_empty_index() {
        let words = IndexedWords::new();
        let mut file = IndexFile::create("streams_empty.idx")
            .await
            .expect("creates index file");
        let info = build_index(&words, &mut file).await.expect("builds index");

        let mut index = BtreeIndex::new();
        index.open_index(info, Arc::new(Mutex::new(file)));

        let mut streamer = index.chains().await.expect("opens stream");
        assert!(streamer.next().await.is_none());

        std::fs::remove_file("streams_empty.idx").expect("cleanup");
    }
}
