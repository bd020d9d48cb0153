use anyhow::Result;

use lexitree::btree::{build_index, IndexedWords};
use lexitree::dict::{BtreeDictionary, Dictionary};
use lexitree::io::file::{FileHeader, IndexFile};

#[tokio::main]
async fn main() -> Result<()> {
    // Gather a couple of headwords
    let mut words = IndexedWords::new();
    words.add_word("guide word", 0);
    words.add_single_word("lexicon", 58);

    // Lay them out as a btree and remember where it starts
    let mut file = IndexFile::create("hello.idx").await?;
    let info = build_index(&words, &mut file).await?;
    FileHeader::new(info).write(&mut file).await?;

    let dictionary = BtreeDictionary::new("hello", info, file);

    // Exact lookup is case-insensitive
    let articles = dictionary.find_articles("Lexicon").await?;
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].article_offset, 58);

    // Prefix search reaches the interior token of "guide word"
    let mut request = dictionary.prefix_match("word", 10);
    let matches = request.matches().await?;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].word, "guide word");

    std::fs::remove_file("hello.idx")?;
    Ok(())
}
