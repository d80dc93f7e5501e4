use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::watch;

use super::TransferStatus;
use crate::{Error, Result};

/// Snapshot of a transfer's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub parts_total: usize,
    pub parts_done: usize,
    pub bytes_done: u64,
    pub total_bytes: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Run,
    Pause,
    Stop,
}

pub(crate) type ProgressCallback = Box<dyn Fn(&Progress) + Send + Sync>;

#[derive(Default)]
struct Timing {
    started: Option<(Instant, SystemTime)>,
    finished: Option<Instant>,
}

/// State shared between a transfer handle and its background task: status,
/// the cooperative run/pause/stop token and progress counters.
pub(crate) struct Control {
    status: watch::Sender<TransferStatus>,
    signal: watch::Sender<Signal>,
    parts_total: AtomicUsize,
    parts_done: AtomicUsize,
    bytes_done: AtomicU64,
    total_bytes: AtomicU64,
    timing: Mutex<Timing>,
    on_progress: Mutex<Option<ProgressCallback>>,
}

impl Control {
    pub(crate) fn new() -> Self {
        Self {
            status: watch::Sender::new(TransferStatus::Preparing),
            signal: watch::Sender::new(Signal::Run),
            parts_total: AtomicUsize::new(0),
            parts_done: AtomicUsize::new(0),
            bytes_done: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            timing: Mutex::new(Timing::default()),
            on_progress: Mutex::new(None),
        }
    }

    pub(crate) fn status(&self) -> TransferStatus {
        *self.status.borrow()
    }

    pub(crate) fn subscribe_status(&self) -> watch::Receiver<TransferStatus> {
        self.status.subscribe()
    }

    /// Move to `to` if the current status is one of `from`.
    pub(crate) fn transition(
        &self,
        operation: &'static str,
        from: &[TransferStatus],
        to: TransferStatus,
    ) -> Result<()> {
        let mut observed = to;
        let moved = self.status.send_if_modified(|current| {
            observed = *current;
            if from.contains(current) {
                *current = to;
                true
            } else {
                false
            }
        });
        if moved {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                status: observed,
            })
        }
    }

    /// Record a terminal status; only non-terminal states can be left.
    pub(crate) fn finish(&self, status: TransferStatus) {
        self.status.send_if_modified(|current| {
            if current.is_terminal() {
                false
            } else {
                *current = status;
                true
            }
        });
        self.timing().finished = Some(Instant::now());
    }

    pub(crate) fn signal(&self, signal: Signal) {
        self.signal.send_replace(signal);
    }

    pub(crate) fn stop_requested(&self) -> bool {
        *self.signal.borrow() == Signal::Stop
    }

    /// Resolves once a stop was requested.
    pub(crate) async fn stopped(&self) {
        let mut signal = self.signal.subscribe();
        // the sender lives as long as `self`
        let _ = signal.wait_for(|current| *current == Signal::Stop).await;
    }

    /// Block while paused; fail with [`Error::TransferStopped`] once a stop
    /// was requested.
    pub(crate) async fn checkpoint(&self) -> Result<()> {
        let mut signal = self.signal.subscribe();
        loop {
            let current = *signal.borrow_and_update();
            match current {
                Signal::Run => return Ok(()),
                Signal::Stop => return Err(Error::TransferStopped),
                Signal::Pause => {
                    if signal.changed().await.is_err() {
                        return Err(Error::TransferStopped);
                    }
                }
            }
        }
    }

    pub(crate) fn mark_started(&self) {
        self.timing().started = Some((Instant::now(), SystemTime::now()));
    }

    /// Reset counters for a partitioned transfer.
    pub(crate) fn begin(&self, parts_total: usize, total_bytes: u64) {
        self.parts_total.store(parts_total, Ordering::SeqCst);
        self.total_bytes.store(total_bytes, Ordering::SeqCst);
        self.parts_done.store(0, Ordering::SeqCst);
        self.bytes_done.store(0, Ordering::SeqCst);
    }

    /// Credit one finished part and notify the progress callback.
    pub(crate) fn part_done(&self, bytes: u64) {
        let total = self.total_bytes.load(Ordering::SeqCst);
        let _ = self
            .bytes_done
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |done| {
                Some(done.saturating_add(bytes).min(total))
            });
        self.parts_done.fetch_add(1, Ordering::SeqCst);
        let progress = self.progress();
        tracing::debug!(
            "part {}/{} done, {}/{} bytes",
            progress.parts_done,
            progress.parts_total,
            progress.bytes_done,
            progress.total_bytes
        );
        if let Some(callback) = self
            .on_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            callback(&progress);
        }
    }

    pub(crate) fn set_progress_callback(&self, callback: ProgressCallback) {
        *self
            .on_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    pub(crate) fn progress(&self) -> Progress {
        Progress {
            parts_total: self.parts_total.load(Ordering::SeqCst),
            parts_done: self.parts_done.load(Ordering::SeqCst),
            bytes_done: self.bytes_done.load(Ordering::SeqCst),
            total_bytes: self.total_bytes.load(Ordering::SeqCst),
            elapsed: self.duration().unwrap_or_default(),
        }
    }

    pub(crate) fn start_time(&self) -> Option<SystemTime> {
        self.timing().started.map(|(_, wall)| wall)
    }

    pub(crate) fn duration(&self) -> Option<Duration> {
        let timing = self.timing();
        let (started, _) = timing.started?;
        let end = timing.finished.unwrap_or_else(Instant::now);
        Some(end.saturating_duration_since(started))
    }

    fn timing(&self) -> MutexGuard<'_, Timing> {
        self.timing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
