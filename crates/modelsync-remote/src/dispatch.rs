use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::oneshot;

use crate::error::SyncError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Single dedicated thread that runs completions and cache writes in the
/// order they were posted.
///
/// The thread exits once every handle is dropped and the queue is drained.
/// A panicking job is logged and skipped; later jobs still run.
#[derive(Debug)]
pub struct MainContext {
    sender: mpsc::Sender<Job>,
    thread_id: ThreadId,
    _handle: JoinHandle<()>,
}

impl MainContext {
    /// # Errors
    /// [`SyncError::Configuration`] when the thread cannot be spawned.
    pub fn new() -> Result<Self, SyncError> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name("modelsync-main".to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                        tracing::error!("Main context job panicked: {}", panic_message(payload.as_ref()));
                    }
                }
            })
            .map_err(|err| SyncError::Configuration(format!("failed to start main context: {err}")))?;

        Ok(Self { sender, thread_id: handle.thread().id(), _handle: handle })
    }

    /// Queue `job` without waiting for it.
    ///
    /// # Errors
    /// [`SyncError::MainContextClosed`] when the thread has stopped.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> Result<(), SyncError> {
        self.sender.send(Box::new(job)).map_err(|_| SyncError::MainContextClosed)
    }

    /// Run `job` on the main context and wait for its result.
    ///
    /// # Errors
    /// The job's own error, or [`SyncError::MainContextClosed`] when the
    /// thread stopped or the job panicked before replying.
    pub async fn run<F, T>(&self, job: F) -> Result<T, SyncError>
    where
        F: FnOnce() -> Result<T, SyncError> + Send + 'static,
        T: Send + 'static,
    {
        let (response_tx, response_rx) = oneshot::channel();
        self.post(move || {
            let _ = response_tx.send(job());
        })?;
        response_rx.await.map_err(|_| SyncError::MainContextClosed)?
    }

    /// Whether the calling thread is the main context.
    #[must_use]
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
