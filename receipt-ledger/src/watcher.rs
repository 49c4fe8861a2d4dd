//! Folder watcher: filesystem events in, one processor run per new image.
//!
//! Event delivery (a `notify` watcher feeding an mpsc channel) is decoupled
//! from scheduling. The dispatcher is a two-state machine:
//!
//! - `Idle`: nothing in flight, waiting for events
//! - `Processing`: at least one file is settling or being processed
//!
//! Distinct files run concurrently up to `workers`; a file already in flight
//! ignores further events. Failures are logged per file and never stop the
//! loop. Shutdown stops intake and waits for in-flight files.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use receipt_core::{ReceiptError, ReceiptRecord};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

use crate::processor::Processor;

const MAX_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Pause after a create event before the first readiness check
    pub settle_delay: Duration,
    pub readiness_attempts: u32,
    /// Gap between the two size samples of one readiness check
    pub readiness_interval: Duration,
    pub workers: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1500),
            readiness_attempts: 5,
            readiness_interval: Duration::from_millis(500),
            workers: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Processing { in_flight: usize },
}

impl WatchState {
    fn for_in_flight(n: usize) -> Self {
        if n == 0 {
            WatchState::Idle
        } else {
            WatchState::Processing { in_flight: n }
        }
    }
}

/// Counts for one watcher run, returned on shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchReport {
    pub processed: usize,
    pub failed: usize,
    /// Events for files that are not candidate images
    pub ignored: usize,
}

pub struct FolderWatcher {
    dir: PathBuf,
    processor: Arc<Processor>,
    config: WatchConfig,
    state: watch::Sender<WatchState>,
}

impl FolderWatcher {
    /// Fails if `dir` is missing or not a directory.
    pub fn new(dir: impl Into<PathBuf>, processor: Arc<Processor>, config: WatchConfig) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            bail!("watch directory not found: {}", dir.display());
        }
        let (state, _) = watch::channel(WatchState::Idle);
        Ok(Self {
            dir,
            processor,
            config,
            state,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<WatchState> {
        self.state.subscribe()
    }

    /// Watch the directory until `shutdown` completes.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<WatchReport> {
        let (tx, rx) = mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for path in event_paths(&event) {
                    if tx.blocking_send(path).is_err() {
                        // dispatcher has stopped
                        return;
                    }
                }
            }
            Err(e) => warn!("watch error: {e}"),
        })
        .context("create filesystem watcher")?;

        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("watch {}", self.dir.display()))?;
        info!(dir = %self.dir.display(), "watching for new receipts");

        let report = self.dispatch(rx, shutdown).await;
        drop(watcher);
        Ok(report)
    }

    /// Drive the state machine from a stream of candidate paths.
    ///
    /// Returns when `shutdown` completes or the event stream closes, after all
    /// in-flight files have finished.
    pub async fn dispatch(
        &self,
        mut events: mpsc::Receiver<PathBuf>,
        shutdown: impl Future<Output = ()>,
    ) -> WatchReport {
        let workers = self.config.workers.clamp(1, MAX_WORKERS);
        let permits = Arc::new(Semaphore::new(workers));
        let mut jobs: JoinSet<Result<ReceiptRecord, ReceiptError>> = JoinSet::new();
        // task id -> path, so a panicked job still frees its path
        let mut job_paths: HashMap<task::Id, PathBuf> = HashMap::new();
        let mut in_flight: HashSet<PathBuf> = HashSet::new();
        let mut report = WatchReport::default();
        let mut accepting = true;

        tokio::pin!(shutdown);
        self.set_state(WatchState::Idle);

        loop {
            tokio::select! {
                _ = &mut shutdown, if accepting => {
                    info!(in_flight = in_flight.len(), "shutdown requested; no new receipts accepted");
                    accepting = false;
                }
                event = events.recv(), if accepting => match event {
                    Some(path) => {
                        if !self.is_candidate(&path) {
                            debug!(path = %path.display(), "ignoring non-image event");
                            report.ignored += 1;
                            continue;
                        }
                        if !in_flight.insert(path.clone()) {
                            debug!(path = %path.display(), "already in flight; event dropped");
                            continue;
                        }

                        info!(path = %path.display(), "new receipt detected");
                        let processor = self.processor.clone();
                        let config = self.config.clone();
                        let permits = permits.clone();
                        let job_path = path.clone();
                        let handle = jobs.spawn(async move {
                            let _permit = permits.acquire_owned().await;
                            wait_until_ready(&job_path, &config).await?;
                            processor.process(&job_path).await
                        });
                        job_paths.insert(handle.id(), path);
                        self.set_state(WatchState::for_in_flight(in_flight.len()));
                    }
                    None => {
                        debug!("event source closed");
                        accepting = false;
                    }
                },
                Some(joined) = jobs.join_next_with_id(), if !jobs.is_empty() => {
                    let id = match &joined {
                        Ok((id, _)) => *id,
                        Err(e) => e.id(),
                    };
                    let path = job_paths.remove(&id).unwrap_or_default();
                    in_flight.remove(&path);

                    match joined {
                        Ok((_, Ok(record))) => {
                            report.processed += 1;
                            info!(
                                path = %path.display(),
                                source_file = %record.source_file,
                                "receipt appended"
                            );
                        }
                        Ok((_, Err(e))) => {
                            report.failed += 1;
                            error!(path = %path.display(), kind = e.kind(), error = %e, "receipt failed");
                        }
                        Err(e) => {
                            report.failed += 1;
                            error!(path = %path.display(), error = %e, "receipt task aborted");
                        }
                    }
                    self.set_state(WatchState::for_in_flight(in_flight.len()));
                }
                else => break,
            }

            if !accepting && jobs.is_empty() {
                break;
            }
        }

        self.set_state(WatchState::Idle);
        info!(
            processed = report.processed,
            failed = report.failed,
            ignored = report.ignored,
            "watcher stopped"
        );
        report
    }

    fn is_candidate(&self, path: &Path) -> bool {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_none_or(|n| n.starts_with('.'));
        !hidden && self.processor.accepts(path)
    }

    fn set_state(&self, next: WatchState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(?prev, ?next, "watcher state");
        }
    }
}

/// Paths of files that appeared in the watched directory: creations and
/// renames into it. The old name of a rename is never a candidate.
pub fn event_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::To => event.paths.clone(),
            // source first, destination last
            RenameMode::Both => event.paths.last().cloned().into_iter().collect(),
            RenameMode::From => Vec::new(),
            // backends that cannot tell the two ends apart
            RenameMode::Any | RenameMode::Other => {
                event.paths.iter().filter(|p| p.exists()).cloned().collect()
            }
        },
        _ => Vec::new(),
    }
}

/// Wait out the settle delay, then poll until the file stops growing and
/// can be opened. Gives up after `readiness_attempts` checks.
pub async fn wait_until_ready(path: &Path, config: &WatchConfig) -> Result<(), ReceiptError> {
    tokio::time::sleep(config.settle_delay).await;

    let attempts = config.readiness_attempts.max(1);
    for attempt in 1..=attempts {
        match size_is_stable(path, config.readiness_interval).await {
            Ok(true) => return Ok(()),
            Ok(false) => debug!(path = %path.display(), attempt, "file still changing"),
            Err(e) => debug!(path = %path.display(), attempt, error = %e, "file not readable yet"),
        }
    }

    Err(ReceiptError::invalid_input(
        path,
        format!("file did not settle after {attempts} readiness checks"),
    ))
}

async fn size_is_stable(path: &Path, interval: Duration) -> std::io::Result<bool> {
    let before = tokio::fs::metadata(path).await?.len();
    tokio::time::sleep(interval).await;
    let after = tokio::fs::metadata(path).await?.len();
    if before != after || after == 0 {
        return Ok(false);
    }
    tokio::fs::File::open(path).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange};

    fn fast() -> WatchConfig {
        WatchConfig {
            settle_delay: Duration::from_millis(5),
            readiness_attempts: 3,
            readiness_interval: Duration::from_millis(5),
            workers: 1,
        }
    }

    #[test]
    fn test_event_paths_keep_creates_and_rename_targets() {
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path("/in/a.jpg".into());
        assert_eq!(event_paths(&create), vec![PathBuf::from("/in/a.jpg")]);

        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/in/.sync-tmp".into())
            .add_path("/in/b.png".into());
        assert_eq!(event_paths(&rename), vec![PathBuf::from("/in/b.png")]);

        let moved_in = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path("/in/c.jpg".into());
        assert_eq!(event_paths(&moved_in), vec![PathBuf::from("/in/c.jpg")]);

        let moved_out = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path("/in/old.jpg".into());
        assert!(event_paths(&moved_out).is_empty());

        let write = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path("/in/a.jpg".into());
        assert!(event_paths(&write).is_empty());
    }

    #[test]
    fn test_ambiguous_rename_keeps_only_existing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("here.jpg");
        std::fs::write(&present, b"x").unwrap();
        let gone = dir.path().join("gone.jpg");

        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Any)))
            .add_path(gone)
            .add_path(present.clone());
        assert_eq!(event_paths(&event), vec![present]);
    }

    #[tokio::test]
    async fn test_ready_file_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.jpg");
        std::fs::write(&path, b"\xFF\xD8\xFFdata").unwrap();
        wait_until_ready(&path, &fast()).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_file_never_settles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.jpg");
        std::fs::write(&path, b"").unwrap();
        let err = wait_until_ready(&path, &fast()).await.unwrap_err();
        assert!(matches!(err, ReceiptError::InvalidInput { .. }));
        assert!(err.to_string().contains("did not settle after 3"));
    }

    #[tokio::test]
    async fn test_missing_file_gives_up() {
        let err = wait_until_ready(Path::new("/nonexistent/r.jpg"), &fast())
            .await
            .unwrap_err();
        assert!(matches!(err, ReceiptError::InvalidInput { .. }));
    }

    #[test]
    fn test_state_for_in_flight() {
        assert_eq!(WatchState::for_in_flight(0), WatchState::Idle);
        assert_eq!(WatchState::for_in_flight(2), WatchState::Processing { in_flight: 2 });
    }
}
