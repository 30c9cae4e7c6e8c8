//! Driving the content fetcher over a whole tree with bounded concurrency.

use super::content_fetcher::ContentFetcher;
use super::throttler::Throttler;
use super::{FetchResult, TreeEntry};
use core::future::Future;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt, stream};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const LOG_TARGET: &str = "     fetch";

/// Runs file fetches through a fixed number of dispatch slots.
///
/// A failing file becomes a failed [`FetchResult`]; it never cancels or delays the others.
#[derive(Debug, Clone)]
pub struct FetchOrchestrator {
    fetcher: Arc<ContentFetcher>,
    concurrency: usize,
}

impl FetchOrchestrator {
    pub fn new(fetcher: Arc<ContentFetcher>, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Fetch every file entry and return the results in tree order.
    ///
    /// As soon as one fetch finishes the next un-started entry begins, so exactly
    /// `concurrency` fetches are outstanding until the input runs out. If `cancel` fires,
    /// dispatch stops, in-flight fetches are dropped, and the results gathered so far are
    /// returned.
    pub async fn run(&self, entries: Vec<TreeEntry>, cancel: &CancellationToken) -> Vec<FetchResult> {
        let throttler = Throttler::new(self.concurrency);

        let mut results: Vec<FetchResult> = stream::iter(indexed_files(entries))
            .map(|(index, entry)| self.fetch_one(index, entry, cancel, &throttler))
            .buffer_unordered(self.concurrency)
            .take_until(cancel.cancelled())
            .collect()
            .await;

        if cancel.is_cancelled() {
            log::info!(target: LOG_TARGET, "Fetch run cancelled after {} result(s)", results.len());
        }

        results.sort_by_key(|result| result.index);
        results
    }

    /// Fetch every file entry, yielding results in tree order as they become available.
    ///
    /// Fetches run as a worker pool: when one finishes the next un-started entry begins,
    /// even if the finished result has to wait behind a slower earlier entry before it can
    /// be yielded. At most `concurrency` fetches are in flight, and at most twice that many
    /// results are running or waiting for their turn.
    ///
    /// The stream only advances when polled, so a consumer that stops pulling also stops
    /// new fetches from being dispatched.
    pub fn stream<'a>(&'a self, entries: Vec<TreeEntry>, cancel: &'a CancellationToken) -> impl Stream<Item = FetchResult> + Send + 'a {
        let throttler = Throttler::new(self.concurrency);

        let fetches = indexed_files(entries).map(move |(index, entry)| {
            let throttler = Arc::clone(&throttler);
            async move { self.fetch_one(index, entry, cancel, &throttler).await }
        });

        in_tree_order(fetches, self.concurrency).take_until(cancel.cancelled())
    }

    async fn fetch_one(&self, index: usize, entry: TreeEntry, cancel: &CancellationToken, throttler: &Arc<Throttler>) -> FetchResult {
        let _permit = throttler.acquire().await;
        let result = self.fetcher.fetch_gated(&entry, cancel, Some(throttler)).await;

        if let Err(e) = &result {
            log::warn!(target: LOG_TARGET, "Could not fetch '{}': {e}", entry.path);
        }

        FetchResult::from_result(index, entry, result)
    }
}

/// File entries paired with their position in tree order.
fn indexed_files(entries: Vec<TreeEntry>) -> impl Iterator<Item = (usize, TreeEntry)> {
    entries.into_iter().filter(TreeEntry::is_file).enumerate()
}

/// Fetches in flight plus finished results parked until every earlier entry is out.
struct Reorder<I: Iterator> {
    pending: I,
    running: FuturesUnordered<I::Item>,
    parked: BTreeMap<usize, FetchResult>,
    next: usize,
    concurrency: usize,
}

impl<I> Reorder<I>
where
    I: Iterator,
    I::Item: Future<Output = FetchResult>,
{
    fn window(&self) -> usize {
        self.concurrency * 2
    }

    fn dispatch(&mut self) {
        while self.running.len() < self.concurrency && self.running.len() + self.parked.len() < self.window() {
            match self.pending.next() {
                Some(fetch) => self.running.push(fetch),
                None => break,
            }
        }
    }
}

/// Run `fetches` unordered, yielding their results by index.
///
/// The fetches must produce the indices `0, 1, 2, ...` in the order they are handed out.
fn in_tree_order<I>(fetches: I, concurrency: usize) -> impl Stream<Item = FetchResult>
where
    I: Iterator,
    I::Item: Future<Output = FetchResult>,
{
    let state = Reorder {
        pending: fetches,
        running: FuturesUnordered::new(),
        parked: BTreeMap::new(),
        next: 0,
        concurrency,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            state.dispatch();

            if let Some(result) = state.parked.remove(&state.next) {
                state.next += 1;
                return Some((result, state));
            }

            // The entry at `next` was handed out before every parked one, so it is
            // still running; nothing running means nothing is left.
            let result = state.running.next().await?;
            let _ = state.parked.insert(result.index, result);
        }
    })
}
