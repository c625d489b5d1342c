use crate::covers::CoverCache;
use crate::covers::fetch::fetch_cover;
use crate::error::{Error, Result};
use crate::library::Library;
use async_stream::stream;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use shelf_catalog::{Item, ItemId};
use shelf_storage::BackendHandle;
use tokio_util::sync::CancellationToken;

/// Progress events emitted by [`warm_up`].
///
/// 1. [`Started`](Self::Started), exactly once, with the number of covers to fetch.
/// 2. [`Fetched`](Self::Fetched) or [`Skipped`](Self::Skipped), once per cover.
/// 3. [`Cancelled`](Self::Cancelled), only if the pass was cancelled.
/// 4. [`Complete`](Self::Complete), exactly once, always last.
#[derive(Debug)]
pub enum WarmUpEvent {
    Started { candidates: u64 },
    Fetched(ItemId),
    /// The cover could not be fetched or stored; the pass carries on.
    Skipped { item: ItemId, error: Error },
    Cancelled,
    Complete(Summary),
}

/// End-of-pass tally.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    /// Covers fetched and stored by this pass.
    pub fetched: u64,
    /// Covers whose fetch or store failed.
    pub skipped: u64,
    /// Covers that were already cached when the pass started.
    pub cached: u64,
    pub cancelled: bool,
}

/// Fetch every missing cover of `items` into `covers`, at most `concurrency`
/// at a time.
///
/// Every write goes to `library`'s namespace; the pass cannot touch any
/// other library. Per-item failures are reported as events and never end
/// the stream. Cancelling `cancel` drops the fetches still in flight.
pub fn warm_up<'a>(
    backend: &'a BackendHandle,
    covers: &'a CoverCache,
    library: &'a Library,
    items: &'a [Item],
    concurrency: usize,
    cancel: &'a CancellationToken,
) -> impl Stream<Item = WarmUpEvent> + 'a {
    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        let mut summary = Summary::default();
        let mut candidates = Vec::new();
        for item in items.iter().filter(|item| item.has_cover) {
            match covers.contains(&library.id, item.id).await {
                true => summary.cached += 1,
                false => candidates.push(item),
            }
        }
        yield WarmUpEvent::Started { candidates: candidates.len() as u64 };

        let mut pending = candidates.into_iter().map(|item| warm_one(backend, covers, library, item));
        let mut processing = FuturesUnordered::new();
        processing.extend(pending.by_ref().take(concurrency.max(1)));
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                next = processing.next() => Some(next),
            };
            match next {
                None => {
                    summary.cancelled = true;
                    yield WarmUpEvent::Cancelled;
                    break;
                },
                Some(None) => break,
                Some(Some((item, Ok(())))) => {
                    summary.fetched += 1;
                    yield WarmUpEvent::Fetched(item);
                },
                Some(Some((item, Err(error)))) => {
                    tracing::warn!(library = %library.id, item, error = ?error, "Skipping cover");
                    summary.skipped += 1;
                    yield WarmUpEvent::Skipped { item, error };
                },
            }
            // Keep the pipeline full, oldest first.
            if let Some(next) = pending.next() {
                processing.push(next);
            }
        }

        yield WarmUpEvent::Complete(summary);
    })
}

async fn warm_one(backend: &BackendHandle, covers: &CoverCache, library: &Library, item: &Item) -> (ItemId, Result<()>) {
    let result = async {
        let bytes = fetch_cover(backend, library, item).await?;
        covers.put(&library.id, item.id, &bytes).await
    };
    (item.id, result.await)
}
