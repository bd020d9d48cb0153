use anyhow::Result;
use futures::StreamExt;

use lexitree::btree::{build_index, IndexedWords};
use lexitree::dict::BtreeDictionary;
use lexitree::io::file::IndexFile;

#[tokio::main]
async fn main() -> Result<()> {
    let mut words = IndexedWords::new();
    for (offset, word) in ["cherry", "apple", "damson", "banana"].iter().enumerate() {
        words.add_single_word(word, offset as u32);
    }

    let mut file = IndexFile::create("streaming.idx").await?;
    let info = build_index(&words, &mut file).await?;
    let dictionary = BtreeDictionary::new("streaming", info, file);

    // Chains stream out in key order, following the leaf links
    let mut chains = dictionary.index().chains().await?;
    while let Some(chain) = chains.next().await {
        for link in chain? {
            println!("{} -> {}", link.word, link.article_offset);
        }
    }

    std::fs::remove_file("streaming.idx")?;
    Ok(())
}
