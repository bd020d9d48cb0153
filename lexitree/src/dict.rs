//! Dictionary abstraction
//!
//! Every dictionary kind (the btree-backed one here, the transliteration
//! one in [`crate::translit`]) exposes the same small capability set
//! through the [`Dictionary`] trait: exact lookup plus asynchronous prefix
//! and stemmed searches. Searches hand back a [`WordSearchRequest`], which
//! owns the background worker and can be cancelled at any point.

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;

use crate::btree::{BtreeIndex, IndexInfo, WordArticleLink};
use crate::io::file::{FileHeader, IndexFile};

/// A single headword produced by a search request, prefix merged in.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct WordMatch {
    /// The full matched headword.
    pub word: String,
}

/// Shared state a search worker reports through.
pub(crate) struct SearchContext {
    cancelled: Arc<AtomicBool>,
    matches: Arc<Mutex<Vec<WordMatch>>>,
}

impl SearchContext {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Run `f` with the match list locked. Workers append one chain's worth
    /// of matches per call; the lock is never held across I/O.
    pub(crate) fn with_matches<R>(&self, f: impl FnOnce(&mut Vec<WordMatch>) -> R) -> R {
        let mut matches = self.matches.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut matches)
    }
}

/// A running (or already finished) asynchronous word search.
///
/// The worker task is owned by this handle. [`cancel`](Self::cancel) asks it
/// to stop at its next check point; [`matches`](Self::matches) waits for it
/// to finish and takes the results. Dropping a request that was never
/// awaited cancels the worker and blocks until it has exited, so a worker
/// never outlives its request.
pub struct WordSearchRequest {
    cancelled: Arc<AtomicBool>,
    matches: Arc<Mutex<Vec<WordMatch>>>,
    error: Arc<Mutex<Option<String>>>,
    handle: Option<JoinHandle<()>>,
}

impl WordSearchRequest {
    /// Spawn a worker built by `f` on the runtime's pool.
    pub(crate) fn start<F, Fut>(f: F) -> Self
    where
        F: FnOnce(SearchContext) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let matches = Arc::new(Mutex::new(Vec::new()));
        let error = Arc::new(Mutex::new(None));

        let worker = f(SearchContext {
            cancelled: cancelled.clone(),
            matches: matches.clone(),
        });
        let worker_error = error.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = worker.await {
                let mut slot = worker_error.lock().unwrap_or_else(|e| e.into_inner());
                *slot = Some(e.to_string());
            }
        });

        Self {
            cancelled,
            matches,
            error,
            handle: Some(handle),
        }
    }

    /// An already-finished request carrying precomputed matches.
    pub fn instant(matches: Vec<WordMatch>) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            matches: Arc::new(Mutex::new(matches)),
            error: Arc::new(Mutex::new(None)),
            handle: None,
        }
    }

    /// Ask the worker to stop at its next cancellation point. The request
    /// still finishes normally and keeps whatever it had gathered.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Wait for the worker to finish and take the accumulated matches.
    /// A failed request surfaces its error string instead.
    pub async fn matches(&mut self) -> Result<Vec<WordMatch>> {
        if let Some(handle) = self.handle.take() {
            handle.await?;
        }
        if let Some(error) = self
            .error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            return Err(anyhow!(error));
        }
        let mut matches = self.matches.lock().unwrap_or_else(|e| e.into_inner());
        Ok(std::mem::take(&mut *matches))
    }

    /// The error string of a failed request, if any.
    pub fn error_string(&self) -> Option<String> {
        self.error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Drop for WordSearchRequest {
    fn drop(&mut self) {
        // If the request was never awaited, cancel the worker and wait for
        // it to exit before the shared state goes away.
        if let Some(handle) = self.handle.take() {
            self.cancelled.store(true, Ordering::Release);
            std::thread::scope(|s| {
                let hdl = s.spawn(|| {
                    let runtime = tokio::runtime::Builder::new_multi_thread().build().unwrap();
                    if let Err(e) = runtime.block_on(handle) {
                        tracing::warn!("could not join search worker: {e}");
                    }
                });
                hdl.join().expect("thread finished");
            });
        }
    }
}

/// Capability set shared by every dictionary kind.
pub trait Dictionary: Send + Sync {
    /// Human-readable dictionary name.
    fn name(&self) -> &str;

    /// Exact-match lookup: every article registered under the headword.
    fn find_articles<'a>(&'a self, word: &'a str) -> BoxFuture<'a, Result<Vec<WordArticleLink>>>;

    /// Start an asynchronous prefix search.
    fn prefix_match(&self, word: &str, max_results: usize) -> WordSearchRequest;

    /// Start an asynchronous stemmed search.
    fn stemmed_match(
        &self,
        word: &str,
        min_length: usize,
        max_suffix_variation: usize,
        max_results: usize,
    ) -> WordSearchRequest;
}

/// A dictionary backed by an on-disk btree index.
///
/// The dictionary owns the index file and its mutex; the reader and any
/// in-flight searches share them and die with the dictionary.
pub struct BtreeDictionary {
    name: String,
    index: BtreeIndex,
}

impl BtreeDictionary {
    /// Bind a dictionary to a btree inside an already opened file.
    pub fn new(name: impl Into<String>, info: IndexInfo, file: IndexFile) -> Self {
        let mut index = BtreeIndex::new();
        index.open_index(info, Arc::new(tokio::sync::Mutex::new(file)));
        Self {
            name: name.into(),
            index,
        }
    }

    /// Open an index file produced by [`crate::btree::build_index`], reading
    /// the btree location from its header.
    pub async fn open(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let mut file = IndexFile::open(path).await?;
        let header = FileHeader::read(&mut file).await?;
        Ok(Self::new(name, header.index_info(), file))
    }

    /// The underlying reader.
    pub fn index(&self) -> &BtreeIndex {
        &self.index
    }
}

impl Dictionary for BtreeDictionary {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_articles<'a>(&'a self, word: &'a str) -> BoxFuture<'a, Result<Vec<WordArticleLink>>> {
        self.index.find_articles(word).boxed()
    }

    fn prefix_match(&self, word: &str, max_results: usize) -> WordSearchRequest {
        self.index.prefix_match(word, max_results)
    }

    fn stemmed_match(
        &self,
        word: &str,
        min_length: usize,
        max_suffix_variation: usize,
        max_results: usize,
    ) -> WordSearchRequest {
        self.index
            .stemmed_match(word, min_length, max_suffix_variation, max_results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::btree::{build_index, IndexedWords};

    async fn build_dictionary(path: &str) -> BtreeDictionary {
        let mut words = IndexedWords::new();
        words.add_single_word("alpha", 1);
        words.add_single_word("beta", 2);
        words.add_single_word("gamma", 3);

        let mut file = IndexFile::create(path).await.expect("creates index file");
        let info = build_index(&words, &mut file).await.expect("builds index");
        BtreeDictionary::new("test dictionary", info, file)
    }

    #[tokio::test]
    async fn it_dispatches_through_the_trait_object() {
        let dictionary = build_dictionary("dict_trait_object.idx").await;
        let dictionary: Box<dyn Dictionary> = Box::new(dictionary);

        assert_eq!(dictionary.name(), "test dictionary");

        let articles = dictionary
            .find_articles("Beta")
            .await
            .expect("finds articles");
        assert_eq!(articles, vec![WordArticleLink::new("beta", 2)]);

        let mut request = dictionary.prefix_match("a", 10);
        let matches = request.matches().await.expect("prefix search finishes");
        assert_eq!(matches, vec![WordMatch { word: "alpha".to_string() }]);

        std::fs::remove_file("dict_trait_object.idx").expect("cleanup");
    }

    #[tokio::test]
    async fn it_serves_instant_requests() {
        let mut request = WordSearchRequest::instant(vec![WordMatch {
            word: "ready".to_string(),
        }]);
        let matches = request.matches().await.expect("instant request finishes");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].word, "ready");
        assert!(request.error_string().is_none());
    }
}
