//! Change-triggered rebuilds
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌───────────────────┐   ┌──────────────┐
//! │ FsNotifier │──▶│ settle() │──▶│ Pipeline::build() │──▶│ WatchSession │
//! │  (notify)  │   │ debounce │   │   (full, fresh)   │   │   .next()    │
//! └────────────┘   └──────────┘   └───────────────────┘   └──────────────┘
//! ```
//!
//! State machine: `Idle → Watching → Building → Watching → …`. The first
//! failed rebuild is delivered once and ends the session, as does
//! [`WatchSession::close`].

use anyhow::{Context, Result};
use pipefold_core::{BuildOutput, CancelFlag, Error, Pipeline};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::notifier::{ChangeEvent, FsNotifier};

/// Quiet period before a burst of changes triggers one rebuild
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

const EVENT_BUFFER: usize = 256;

/// Where a watch session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Created, not yet listening
    Idle,
    /// Waiting for changes
    Watching,
    /// Rebuilding after a change
    Building,
    /// Finished; no more results will arrive
    Stopped,
}

/// One successful rebuild
#[derive(Debug, Clone)]
pub struct Rebuild {
    /// The (last) change that triggered it
    pub event: ChangeEvent,
    /// The fresh build result
    pub output: BuildOutput,
}

/// Watch mode settings
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// See [`DEFAULT_DEBOUNCE`]
    pub debounce: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Rebuilds a pipeline whenever a change event arrives
#[derive(Debug, Clone)]
pub struct Rebuilder {
    pipeline: Arc<Pipeline>,
    options: WatchOptions,
}

impl Rebuilder {
    /// Create a rebuilder
    pub fn new(pipeline: Arc<Pipeline>, options: WatchOptions) -> Self {
        Self { pipeline, options }
    }

    /// Start rebuilding on every event received from `events`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self, events: mpsc::Receiver<ChangeEvent>) -> WatchSession {
        let (results_tx, results) = mpsc::channel(1);
        let (state_tx, state) = watch::channel(WatchState::Idle);
        let (shutdown_tx, shutdown) = oneshot::channel();
        let cancel = CancelFlag::new();

        let task = tokio::spawn(self.run(events, results_tx, state_tx, cancel.clone(), shutdown));

        WatchSession {
            results,
            state,
            cancel,
            shutdown: Some(shutdown_tx),
            task: Some(task),
            _notifier: None,
        }
    }

    async fn run(
        self,
        mut events: mpsc::Receiver<ChangeEvent>,
        results: mpsc::Sender<pipefold_core::Result<Rebuild>>,
        state: watch::Sender<WatchState>,
        cancel: CancelFlag,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        state.send_replace(WatchState::Watching);
        tracing::info!("Watching for changes");

        loop {
            let first = tokio::select! {
                _ = &mut shutdown => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            let event = settle(first, &mut events, self.options.debounce).await;

            state.send_replace(WatchState::Building);
            tracing::info!("{} {}, rebuilding", event.path.display(), event.kind);

            let (result, fatal) = match self.pipeline.build_with(&cancel).await {
                Ok(output) => (Ok(Rebuild { event, output }), false),
                Err(Error::Cancelled) => break,
                Err(err) => {
                    tracing::error!("Rebuild failed, stopping watch: {err}");
                    (Err(err), true)
                }
            };

            // An unread result must not keep close() waiting.
            let delivered = tokio::select! {
                _ = &mut shutdown => false,
                sent = results.send(result) => sent.is_ok(),
            };
            if !delivered || fatal {
                break;
            }
            state.send_replace(WatchState::Watching);
        }

        state.send_replace(WatchState::Stopped);
        tracing::debug!("Watch session stopped");
    }
}

/// Wait out a burst of events and return the last one.
async fn settle(
    mut latest: ChangeEvent,
    events: &mut mpsc::Receiver<ChangeEvent>,
    window: Duration,
) -> ChangeEvent {
    while let Ok(Some(event)) = tokio::time::timeout(window, events.recv()).await {
        latest = event;
    }
    latest
}

/// A running watch
///
/// Dropping the session stops it without waiting.
#[derive(Debug)]
pub struct WatchSession {
    results: mpsc::Receiver<pipefold_core::Result<Rebuild>>,
    state: watch::Receiver<WatchState>,
    cancel: CancelFlag,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    _notifier: Option<FsNotifier>,
}

impl WatchSession {
    /// Next rebuild result; `None` once the session has stopped.
    ///
    /// An `Err` is always the last item.
    pub async fn next(&mut self) -> Option<pipefold_core::Result<Rebuild>> {
        self.results.recv().await
    }

    /// Current lifecycle state
    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change
    pub fn state_changes(&self) -> watch::Receiver<WatchState> {
        self.state.clone()
    }

    /// Stop watching. A rebuild in progress is cancelled at its next step.
    pub async fn close(mut self) -> Result<()> {
        self.stop();
        if let Some(task) = self.task.take() {
            task.await.context("Watch task failed")?;
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self._notifier = None;
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Watch the pipeline's input patterns and rebuild on every change.
///
/// No build runs until the first change.
pub fn watch(pipeline: Arc<Pipeline>, options: WatchOptions) -> Result<WatchSession> {
    let (events_tx, events) = mpsc::channel(EVENT_BUFFER);
    let notifier = FsNotifier::start(&pipeline.input_patterns(), events_tx)?;

    let mut session = Rebuilder::new(pipeline, options).spawn(events);
    session._notifier = Some(notifier);
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::ChangeKind;
    use pipefold_core::{Config, DataTypeConfig};
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn fixture() -> (TempDir, Arc<Pipeline>) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let config = Config::new()
            .with_dirs(dir.path(), dir.path().join("out"))
            .data_type("posts", DataTypeConfig::new("*.txt"));
        (dir, Arc::new(Pipeline::new(config)))
    }

    fn options(debounce_ms: u64) -> WatchOptions {
        WatchOptions {
            debounce: Duration::from_millis(debounce_ms),
        }
    }

    fn change(dir: &TempDir, name: &str) -> ChangeEvent {
        ChangeEvent::new(ChangeKind::Modified, dir.path().join(name))
    }

    #[tokio::test]
    async fn test_rebuilds_on_change() {
        let (dir, pipeline) = fixture();
        let (tx, rx) = mpsc::channel(8);
        let mut session = Rebuilder::new(pipeline, options(10)).spawn(rx);

        tx.send(change(&dir, "a.txt")).await.unwrap();
        let rebuild = timeout(WAIT, session.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(rebuild.event, change(&dir, "a.txt"));
        assert_eq!(rebuild.output.file_count(), 1);

        fs::write(dir.path().join("b.txt"), "b").unwrap();
        tx.send(change(&dir, "b.txt")).await.unwrap();
        let rebuild = timeout(WAIT, session.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(rebuild.output.file_count(), 2);

        let mut states = session.state_changes();
        timeout(WAIT, states.wait_for(|state| *state == WatchState::Watching))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.state(), WatchState::Watching);

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_burst_triggers_one_rebuild() {
        let (dir, pipeline) = fixture();
        let (tx, rx) = mpsc::channel(8);
        let mut session = Rebuilder::new(pipeline, options(50)).spawn(rx);

        for name in ["a.txt", "b.txt", "c.txt"] {
            tx.send(change(&dir, name)).await.unwrap();
        }

        let rebuild = timeout(WAIT, session.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(rebuild.event, change(&dir, "c.txt"));
        assert!(timeout(Duration::from_millis(200), session.next()).await.is_err());

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_rebuild_ends_session() {
        let (dir, pipeline) = fixture();
        let (tx, rx) = mpsc::channel(8);
        let mut session = Rebuilder::new(pipeline, options(10)).spawn(rx);
        let mut states = session.state_changes();

        fs::remove_file(dir.path().join("a.txt")).unwrap();
        tx.send(ChangeEvent::new(ChangeKind::Removed, dir.path().join("a.txt")))
            .await
            .unwrap();

        let err = timeout(WAIT, session.next()).await.unwrap().unwrap().unwrap_err();
        assert!(matches!(err, Error::NoMatch { .. }));
        assert!(timeout(WAIT, session.next()).await.unwrap().is_none());

        timeout(WAIT, states.wait_for(|state| *state == WatchState::Stopped))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_with_unread_results() {
        let (dir, pipeline) = fixture();
        let (tx, rx) = mpsc::channel(8);
        let session = Rebuilder::new(pipeline, options(5)).spawn(rx);
        let mut states = session.state_changes();

        tx.send(change(&dir, "a.txt")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(change(&dir, "a.txt")).await.unwrap();
        timeout(WAIT, states.wait_for(|state| *state == WatchState::Building))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        timeout(WAIT, session.close()).await.unwrap().unwrap();
        assert_eq!(*states.borrow(), WatchState::Stopped);
    }

    #[tokio::test]
    async fn test_close_stops_session() {
        let (_dir, pipeline) = fixture();
        let (_tx, rx) = mpsc::channel(8);
        let session = Rebuilder::new(pipeline, options(10)).spawn(rx);
        let states = session.state_changes();

        session.close().await.unwrap();
        assert_eq!(*states.borrow(), WatchState::Stopped);
    }
}
