//! Download orchestration: strategy chain, progress, and sequential batches.
//!
//! Each item goes through an ordered chain of [`TransferStrategy`]s until one
//! succeeds. The default chain tries a direct URL first (handed straight to the
//! [`FileSink`], no progress visible) and falls back to a buffered transfer
//! through the messaging client with byte-level progress.
//!
//! Batches run strictly one item at a time with a pause between items; a
//! failing item is recorded and the batch moves on.
//!
//! Progress is published on a [`watch`] channel; subscribe with
//! [`DownloadOrchestrator::subscribe`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};

use crate::catalog::{MediaId, MediaItem};
use crate::config::Config;
use crate::errors::{Error, StrategyError};
use crate::library::MediaLibrary;
use crate::remote::{MessagingClient, SharedClient};
use crate::sink::{DirectorySink, FileSink};

// ─── Progress ─────────────────────────────────────────────────────────────────

/// `round(received / total * 100)`, clamped to `0..=100`; `0` when the total
/// is unknown.
pub fn percent(received: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (u128::from(received) * 100 + u128::from(total) / 2) / u128::from(total);
    pct.min(100) as u8
}

/// Snapshot of the orchestrator, as seen by the UI.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownloadProgress {
    /// A single download or a batch is running.
    pub downloading: bool,
    /// Item currently being transferred.
    pub current:     Option<MediaId>,
    /// Progress of the current item. Only buffered transfers move it.
    pub percent:     u8,
    /// Items attempted so far in the running batch.
    pub completed:   usize,
    /// Items in the running batch.
    pub requested:   usize,
}

impl DownloadProgress {
    /// Overall batch progress, `completed / requested` as a percentage.
    pub fn batch_percent(&self) -> u8 {
        percent(self.completed as u64, self.requested as u64)
    }
}

/// Handed to strategies so they can report byte progress of one item.
pub struct ProgressHandle<'a> {
    tx: &'a watch::Sender<DownloadProgress>,
}

impl ProgressHandle<'_> {
    /// Progress never moves backwards within one item.
    pub fn report(&self, received: u64, total: u64) {
        let pct = percent(received, total);
        self.tx.send_if_modified(|p| {
            if pct > p.percent {
                p.percent = pct;
                true
            } else {
                false
            }
        });
    }
}

/// Resets the per-item (or whole-run) fields however the transfer ends.
struct ActivityGuard<'a> {
    tx:    &'a watch::Sender<DownloadProgress>,
    batch: bool,
}

impl<'a> ActivityGuard<'a> {
    fn start(tx: &'a watch::Sender<DownloadProgress>, requested: usize, batch: bool) -> Self {
        tx.send_modify(|p| {
            p.downloading = true;
            p.current     = None;
            p.percent     = 0;
            p.completed   = 0;
            p.requested   = requested;
        });
        Self { tx, batch }
    }
}

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        let batch = self.batch;
        self.tx.send_modify(|p| {
            p.downloading = false;
            p.current     = None;
            p.percent     = 0;
            if !batch {
                p.completed = 0;
                p.requested = 0;
            }
        });
    }
}

// ─── Strategies ───────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    DirectUrl,
    Buffered,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectUrl => f.write_str("direct-url"),
            Self::Buffered  => f.write_str("buffered"),
        }
    }
}

/// Everything a strategy may touch while transferring one item.
pub struct TransferContext<'a> {
    pub client:   &'a dyn MessagingClient,
    pub sink:     &'a dyn FileSink,
    pub item:     &'a MediaItem,
    pub progress: ProgressHandle<'a>,
}

/// One way of getting an item onto disk.
#[async_trait]
pub trait TransferStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn attempt(&self, ctx: &TransferContext<'_>) -> Result<PathBuf, StrategyError>;
}

/// Ask the remote side for a direct URL and let the sink fetch it.
pub struct DirectUrl;

#[async_trait]
impl TransferStrategy for DirectUrl {
    fn kind(&self) -> StrategyKind { StrategyKind::DirectUrl }

    async fn attempt(&self, ctx: &TransferContext<'_>) -> Result<PathBuf, StrategyError> {
        let url = ctx.client.resolve_direct_url(&ctx.item.handle).await?;
        let url = match url {
            Some(u) if !u.trim().is_empty() => u,
            _ => return Err(StrategyError::Unavailable("no direct URL".into())),
        };
        ctx.sink
            .save_url(&url, &ctx.item.filename)
            .await
            .map_err(StrategyError::Save)
    }
}

/// Pull every byte through the messaging client, then save the buffer.
pub struct Buffered;

#[async_trait]
impl TransferStrategy for Buffered {
    fn kind(&self) -> StrategyKind { StrategyKind::Buffered }

    async fn attempt(&self, ctx: &TransferContext<'_>) -> Result<PathBuf, StrategyError> {
        let mut on_progress = |received: u64, total: u64| ctx.progress.report(received, total);
        let bytes = ctx.client.stream_download(&ctx.item.handle, &mut on_progress).await?;
        ctx.sink
            .save_bytes(&ctx.item.filename, bytes)
            .await
            .map_err(StrategyError::Save)
    }
}

/// Direct URL first, buffered transfer as fallback.
pub fn default_strategies() -> Vec<Box<dyn TransferStrategy>> {
    vec![Box::new(DirectUrl), Box::new(Buffered)]
}

// ─── Outcomes ─────────────────────────────────────────────────────────────────

/// A successfully saved item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Downloaded {
    pub id:       MediaId,
    pub filename: String,
    pub strategy: StrategyKind,
    pub path:     PathBuf,
}

/// Result of one item of a batch.
#[derive(Debug)]
pub struct ItemOutcome {
    pub id:     MediaId,
    pub result: Result<Downloaded, Error>,
}

/// Per-item results of a batch, in the order the items were attempted.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
    pub fn requested(&self) -> usize { self.outcomes.len() }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.requested() - self.succeeded()
    }

    pub fn outcome(&self, id: MediaId) -> Option<&ItemOutcome> {
        self.outcomes.iter().find(|o| o.id == id)
    }
}

// ─── DownloadOrchestrator ─────────────────────────────────────────────────────

/// Runs downloads one at a time and reports progress.
pub struct DownloadOrchestrator {
    client:     SharedClient,
    sink:       Arc<dyn FileSink>,
    strategies: Vec<Box<dyn TransferStrategy>>,
    delay:      Duration,
    progress:   watch::Sender<DownloadProgress>,
    transfer:   Mutex<()>,
}

impl DownloadOrchestrator {
    /// Orchestrator with the default strategy chain and `delay` between the
    /// items of a batch.
    pub fn new(client: SharedClient, sink: Arc<dyn FileSink>, delay: Duration) -> Self {
        let (progress, _) = watch::channel(DownloadProgress::default());
        Self {
            client,
            sink,
            strategies: default_strategies(),
            delay,
            progress,
            transfer: Mutex::new(()),
        }
    }

    /// Orchestrator saving into `config.download_dir` with the configured pause.
    pub fn from_config(client: SharedClient, config: &Config) -> Self {
        let sink = Arc::new(DirectorySink::new(&config.download_dir));
        Self::new(client, sink, config.inter_item_delay())
    }

    /// Replace the strategy chain. Strategies are tried in the given order.
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn TransferStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn subscribe(&self) -> watch::Receiver<DownloadProgress> {
        self.progress.subscribe()
    }

    pub fn progress(&self) -> DownloadProgress {
        self.progress.borrow().clone()
    }

    pub fn is_downloading(&self) -> bool {
        self.progress.borrow().downloading
    }

    /// Download a single item. Waits for any running transfer to finish first.
    pub async fn download_one(&self, item: &MediaItem) -> Result<Downloaded, Error> {
        let _transfer = self.transfer.lock().await;
        let _activity = ActivityGuard::start(&self.progress, 1, false);
        self.run_chain(item).await
    }

    /// Download every selected item of `library`, one after another, then
    /// clear the selection.
    ///
    /// Items are taken in catalog order. Failed items are recorded in the
    /// report and do not stop the batch.
    pub async fn download_batch(&self, library: &MediaLibrary) -> Result<BatchReport, Error> {
        let items = library.selected_items();
        if items.is_empty() {
            return Err(Error::NothingSelected);
        }

        let _transfer = self.transfer.lock().await;
        let _activity = ActivityGuard::start(&self.progress, items.len(), true);
        tracing::info!("[mediadl] Downloading {} files …", items.len());

        let mut report = BatchReport::default();
        for (i, item) in items.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let result = self.run_chain(item).await;
            report.outcomes.push(ItemOutcome { id: item.id, result });
            self.progress.send_modify(|p| p.completed = i + 1);
        }

        library.clear_selection();
        tracing::info!(
            "[mediadl] Batch done: {} downloaded, {} failed",
            report.succeeded(),
            report.failed()
        );
        Ok(report)
    }

    async fn run_chain(&self, item: &MediaItem) -> Result<Downloaded, Error> {
        self.progress.send_modify(|p| {
            p.current = Some(item.id);
            p.percent = 0;
        });

        let ctx = TransferContext {
            client:   self.client.as_ref(),
            sink:     self.sink.as_ref(),
            item,
            progress: ProgressHandle { tx: &self.progress },
        };

        let mut attempts = Vec::new();
        for strategy in &self.strategies {
            let kind = strategy.kind();
            tracing::debug!("[mediadl] {} via {kind} …", item.filename);
            match strategy.attempt(&ctx).await {
                Ok(path) => {
                    if kind == StrategyKind::Buffered {
                        self.progress.send_modify(|p| p.percent = 100);
                    }
                    tracing::info!("[mediadl] {} downloaded ({kind})", item.filename);
                    return Ok(Downloaded {
                        id:       item.id,
                        filename: item.filename.clone(),
                        strategy: kind,
                        path,
                    });
                }
                Err(e) => {
                    tracing::warn!("[mediadl] {} via {kind} failed: {e}", item.filename);
                    attempts.push((kind, e));
                }
            }
        }

        let err = Error::Download { filename: item.filename.clone(), attempts };
        tracing::warn!("[mediadl] {err}");
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_and_clamps() {
        assert_eq!(percent(250, 1000), 25);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(5, 1000), 1);
        assert_eq!(percent(1000, 1000), 100);
        assert_eq!(percent(1500, 1000), 100);
        assert_eq!(percent(10, 0), 0);
        assert_eq!(percent(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn progress_handle_is_monotonic() {
        let (tx, rx) = watch::channel(DownloadProgress::default());
        let handle = ProgressHandle { tx: &tx };
        handle.report(500, 1000);
        handle.report(250, 1000);
        assert_eq!(rx.borrow().percent, 50);
        handle.report(900, 1000);
        assert_eq!(rx.borrow().percent, 90);
    }

    #[test]
    fn guard_resets_on_drop() {
        let (tx, rx) = watch::channel(DownloadProgress::default());
        {
            let _g = ActivityGuard::start(&tx, 1, false);
            tx.send_modify(|p| {
                p.current = Some(7);
                p.percent = 40;
            });
            assert!(rx.borrow().downloading);
        }
        assert_eq!(*rx.borrow(), DownloadProgress::default());
    }

    #[test]
    fn batch_percent_counts_items() {
        let p = DownloadProgress { completed: 1, requested: 4, ..Default::default() };
        assert_eq!(p.batch_percent(), 25);
    }
}
