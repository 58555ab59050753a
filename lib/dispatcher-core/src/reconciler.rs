//! Reconciliation loop keeping the dispatcher list in sync with set membership

use crate::{DispatcherError, MembershipSource, Notifier, Result, SetRegistry, SourceError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Capacity of the shared watch event channel
pub const EVENT_BUFFER: usize = 10;

type WatchEvent = std::result::Result<(), SourceError>;

/// Why a single maintain pass ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// A watch connection closed; the watchers must be re-established.
    StreamClosed,
    /// The cancellation token fired.
    Cancelled,
}

/// Reconciler fans in change events from every set and exports and notifies
/// on each one.
///
/// Export and notify only ever run on the consuming task, so writes to the
/// dispatcher list are serialized.
pub struct Reconciler {
    registry: Arc<SetRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl Reconciler {
    pub fn new(registry: Arc<SetRegistry>, notifier: Arc<dyn Notifier>) -> Self {
        Self { registry, notifier }
    }

    /// Maintain the sets until cancelled or a watch, export or notify fails.
    ///
    /// Closed watch streams are re-established.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        while !cancel.is_cancelled() {
            match self.maintain(cancel).await? {
                LoopExit::StreamClosed => {
                    info!("Re-establishing dispatcher set watches");
                }
                LoopExit::Cancelled => break,
            }
        }
        Ok(())
    }

    /// One pass: spawn a watcher per set and consume their events.
    pub async fn maintain(&self, cancel: &CancellationToken) -> Result<LoopExit> {
        if self.registry.is_empty() {
            cancel.cancelled().await;
            return Ok(LoopExit::Cancelled);
        }

        let watchers = cancel.child_token();
        let _stop_watchers = watchers.clone().drop_guard();

        let (events_tx, mut events_rx) = mpsc::channel(EVENT_BUFFER);
        for source in self.registry.sources() {
            tokio::spawn(watch_source(
                source.clone(),
                events_tx.clone(),
                watchers.clone(),
            ));
        }
        drop(events_tx);

        loop {
            let Some(batch) = next_batch(&mut events_rx, cancel).await? else {
                return Ok(LoopExit::Cancelled);
            };
            match self.apply_batch(batch).await? {
                Some(LoopExit::StreamClosed) => {
                    watchers.cancel();
                    self.drain(events_rx).await?;
                    return Ok(LoopExit::StreamClosed);
                }
                Some(exit) => return Ok(exit),
                None => {}
            }
        }
    }

    /// Export the dispatcher list and tell the proxy to reload it.
    ///
    /// A notify failure does not re-export; the list on disk is already
    /// current.
    pub async fn sync(&self) -> Result<()> {
        self.registry.export_all().await?;
        self.notifier.notify().await?;
        debug!("Exported dispatcher list and notified proxy");
        Ok(())
    }

    /// Export once for every change in `batch`, whatever its position.
    async fn apply_batch(&self, batch: Vec<WatchEvent>) -> Result<Option<LoopExit>> {
        let mut changes = 0;
        let mut closed = false;

        for event in batch {
            match event {
                Ok(()) => changes += 1,
                Err(SourceError::StreamClosed) => closed = true,
                Err(e) => return Err(DispatcherError::Watch(e)),
            }
        }

        if changes > 0 {
            debug!("Applying {} dispatcher set changes", changes);
            self.sync().await?;
        }

        if closed {
            info!("Dispatcher set watch connection terminated");
            return Ok(Some(LoopExit::StreamClosed));
        }
        Ok(None)
    }

    /// Apply events still in flight from stopping watchers.
    ///
    /// The watchers must already be cancelled; returns once all have exited.
    async fn drain(&self, mut events: mpsc::Receiver<WatchEvent>) -> Result<()> {
        let mut pending = Vec::new();
        while let Some(event) = events.recv().await {
            pending.push(event);
        }
        if !pending.is_empty() {
            debug!("Applying {} events from stopped watchers", pending.len());
            self.apply_batch(pending).await?;
        }
        Ok(())
    }
}

/// Wait for the next event, then take everything already queued behind it.
///
/// Returns `None` once cancelled.
async fn next_batch(
    events: &mut mpsc::Receiver<WatchEvent>,
    cancel: &CancellationToken,
) -> Result<Option<Vec<WatchEvent>>> {
    let first = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(None),
        event = events.recv() => event.ok_or(DispatcherError::WatchersStopped)?,
    };
    if cancel.is_cancelled() {
        return Ok(None);
    }

    let mut batch = vec![first];
    while let Ok(event) = events.try_recv() {
        batch.push(event);
    }
    Ok(Some(batch))
}

async fn watch_source(
    source: Arc<dyn MembershipSource>,
    events: mpsc::Sender<WatchEvent>,
    cancel: CancellationToken,
) {
    loop {
        // A finished watch has already changed the snapshot, so its event is
        // always sent.
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            event = source.watch() => event,
        };
        if events.send(event).await.is_err() {
            return;
        }
    }
}
