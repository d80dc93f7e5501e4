use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

use super::control::{Control, Signal};
use super::{Progress, TransferStatus};
use crate::{Error, Result};

type CompleteCallback<T> = Box<dyn Fn(&T) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&Error) + Send + Sync>;

/// Controller of one background transfer.
///
/// Created in [`TransferStatus::Preparing`]; [`start`](Self::start) spawns
/// the transfer task. [`wait`](Self::wait) yields the outcome exactly once.
pub struct TransferHandle<T> {
    control: Arc<Control>,
    job: Option<BoxFuture<'static, Result<T>>>,
    task: Option<JoinHandle<Result<T>>>,
    outcome: Option<Result<T>>,
    on_complete: Option<CompleteCallback<T>>,
    on_error: Option<ErrorCallback>,
}

impl<T: Send + 'static> TransferHandle<T> {
    pub(crate) fn new(control: Arc<Control>, job: BoxFuture<'static, Result<T>>) -> Self {
        Self {
            control,
            job: Some(job),
            task: None,
            outcome: None,
            on_complete: None,
            on_error: None,
        }
    }

    /// Called after every finished part with a progress snapshot.
    pub fn on_progress(&mut self, callback: impl Fn(&Progress) + Send + Sync + 'static) -> &mut Self {
        self.control.set_progress_callback(Box::new(callback));
        self
    }

    pub fn on_complete(&mut self, callback: impl Fn(&T) + Send + Sync + 'static) -> &mut Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Notified when the transfer fails; [`wait`](Self::wait) still returns
    /// the error.
    pub fn on_error(&mut self, callback: impl Fn(&Error) + Send + Sync + 'static) -> &mut Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn status(&self) -> TransferStatus {
        self.control.status()
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<TransferStatus> {
        self.control.subscribe_status()
    }

    pub fn progress(&self) -> Progress {
        self.control.progress()
    }

    pub fn start_time(&self) -> Option<SystemTime> {
        self.control.start_time()
    }

    /// Time since start, frozen once the transfer reaches a terminal state.
    pub fn duration(&self) -> Option<Duration> {
        self.control.duration()
    }

    pub fn start(&mut self) -> Result<()> {
        self.control.transition(
            "start",
            &[TransferStatus::Preparing],
            TransferStatus::Running,
        )?;
        let job = self.job.take().ok_or(Error::InvalidState {
            operation: "start",
            status: TransferStatus::Running,
        })?;
        self.control.mark_started();

        let control = self.control.clone();
        let on_complete = self.on_complete.take();
        let on_error = self.on_error.take();
        self.task = Some(tokio::spawn(async move {
            let result = job.await;
            match &result {
                Ok(value) => {
                    control.finish(TransferStatus::Completed);
                    tracing::info!("transfer completed");
                    if let Some(callback) = &on_complete {
                        callback(value);
                    }
                }
                Err(Error::TransferStopped) => {
                    control.finish(TransferStatus::Stopped);
                    tracing::info!("transfer stopped");
                }
                Err(e) => {
                    control.finish(TransferStatus::Failed);
                    tracing::warn!("transfer failed: {}", e);
                    if let Some(callback) = &on_error {
                        callback(e);
                    }
                }
            }
            result
        }));
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        self.control.transition(
            "pause",
            &[TransferStatus::Running],
            TransferStatus::Paused,
        )?;
        self.control.signal(Signal::Pause);
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.control.transition(
            "resume",
            &[TransferStatus::Paused],
            TransferStatus::Running,
        )?;
        self.control.signal(Signal::Run);
        Ok(())
    }

    /// Request a cooperative stop and wait for the transfer to wind down.
    pub async fn stop(&mut self) -> Result<()> {
        let status = self.control.status();
        if !matches!(status, TransferStatus::Running | TransferStatus::Paused) {
            return Err(Error::InvalidState {
                operation: "stop",
                status,
            });
        }
        self.control.signal(Signal::Stop);
        self.join().await;
        Ok(())
    }

    /// Wait for the transfer to finish and take its outcome.
    pub async fn wait(&mut self) -> Result<T> {
        self.join().await;
        self.outcome.take().unwrap_or_else(|| {
            Err(Error::InvalidState {
                operation: "wait",
                status: self.control.status(),
            })
        })
    }

    async fn join(&mut self) {
        // the handle stays in place until it resolves so a cancelled wait
        // can be resumed
        let Some(task) = self.task.as_mut() else {
            return;
        };
        let joined = task.await;
        self.task = None;
        let outcome = match joined {
            Ok(result) => result,
            Err(e) => {
                self.control.finish(TransferStatus::Aborted);
                Err(Error::Internal(format!("transfer task lost: {}", e)))
            }
        };
        self.outcome = Some(outcome);
    }
}

impl<T> Drop for TransferHandle<T> {
    fn drop(&mut self) {
        if self.task.is_some() && !self.control.status().is_terminal() {
            tracing::debug!("transfer handle dropped while running, stopping");
            self.control.signal(Signal::Stop);
        }
    }
}

impl<T> std::fmt::Debug for TransferHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferHandle")
            .field("status", &self.control.status())
            .field("progress", &self.control.progress())
            .finish()
    }
}
