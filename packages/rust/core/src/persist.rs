//! Moving the entry index in and out of [`Storage`].

use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use docpipe_shared::{Entry, Result};
use docpipe_storage::Storage;

use crate::index::{EntryIndex, IndexEvent};

/// Replace the stored index with the current contents of `index`.
#[instrument(skip_all, fields(entries = index.len()))]
pub async fn snapshot(index: &EntryIndex, storage: &Storage) -> Result<usize> {
    let entries: Vec<Entry> = index.entries().iter().map(|e| (**e).clone()).collect();
    let written = storage.replace_all(&entries).await?;
    info!(written, "index snapshot saved");
    Ok(written)
}

/// Rebuild an index from storage, then check it.
#[instrument(skip_all)]
pub async fn restore(storage: &Storage) -> Result<EntryIndex> {
    let index = EntryIndex::new();
    for entry in storage.list_entries().await? {
        index.add(entry)?;
    }
    index.verify()?;
    info!(entries = index.len(), "index restored");
    Ok(index)
}

/// Persist index changes as they happen until `cancel` fires.
///
/// Subscribes when called, so every change made after this returns is
/// mirrored even if the future has not been polled yet. Events still queued
/// at cancellation are drained before the future completes. If the receiver
/// falls behind, a full [`snapshot`] replaces the missed events. Resolves to
/// the number of events applied.
pub fn mirror_events(
    index: Arc<EntryIndex>,
    storage: Arc<Storage>,
    cancel: CancellationToken,
) -> impl Future<Output = Result<u64>> + Send {
    let mut rx = index.subscribe();

    async move {
        let mut applied = 0u64;

        loop {
            tokio::select! {
                biased;
                event = rx.recv() => match event {
                    Ok(event) => {
                        apply_event(&storage, event).await?;
                        applied += 1;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "event mirror lagged, saving full snapshot");
                        snapshot(&index, &storage).await?;
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = cancel.cancelled() => {
                    loop {
                        match rx.try_recv() {
                            Ok(event) => {
                                apply_event(&storage, event).await?;
                                applied += 1;
                            }
                            Err(TryRecvError::Lagged(missed)) => {
                                warn!(missed, "event mirror lagged, saving full snapshot");
                                snapshot(&index, &storage).await?;
                            }
                            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                        }
                    }
                    break;
                }
            }
        }

        debug!(applied, "event mirror stopped");
        Ok(applied)
    }
    .instrument(info_span!("mirror_events"))
}

async fn apply_event(storage: &Storage, event: IndexEvent) -> Result<()> {
    match event {
        IndexEvent::Added(entry) | IndexEvent::Updated(entry) => storage.upsert_entry(&entry).await,
        IndexEvent::Removed(entry) => storage.delete_entry(entry.id).await.map(|_| ()),
    }
}
