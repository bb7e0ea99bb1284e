//! Cancellable one-shot timers and the signals used to interrupt waiting threads.

use std::{
    io,
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender};

/// A one way flag that wakes up anyone waiting on it.
///
/// Nothing is ever sent on the channel, triggering drops the only sender
/// so every receiver (in every clone) sees a disconnect at once.
#[derive(Debug, Clone)]
pub struct Signal {
    sender: Arc<Mutex<Option<Sender<()>>>>,
    receiver: Receiver<()>,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = bounded(0);
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            receiver,
        }
    }

    /// idempotent
    pub fn trigger(&self) {
        crate::lock(&self.sender).take();
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        crate::lock(&self.sender).is_none()
    }

    /// Blocks for up to `timeout`, returns true if the signal was triggered meanwhile.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.receiver.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }
}

/// Sleeps for `timeout` unless one of the signals fires first, in which case it returns true.
#[must_use]
pub fn sleep(timeout: Duration, cancel: &Signal, shutdown: &Signal) -> bool {
    select! {
        recv(cancel.receiver) -> _ => true,
        recv(shutdown.receiver) -> _ => true,
        default(timeout) => cancel.is_triggered() || shutdown.is_triggered(),
    }
}

/// Runs a task on its own thread once a delay has passed.
///
/// The task gets the timer's cancel signal so that it can keep honoring
/// [`Timer::cancel`] after it has started.
#[derive(Debug)]
pub struct Timer {
    cancel: Signal,
    handle: JoinHandle<()>,
}

impl Timer {
    /// # Errors
    /// if the thread couldn't be spawned
    pub fn spawn<F>(name: String, delay: Duration, shutdown: Signal, task: F) -> io::Result<Self>
    where
        F: FnOnce(&Signal) + Send + 'static,
    {
        let cancel = Signal::new();
        let token = cancel.clone();
        let handle = thread::Builder::new().name(name).spawn(move || {
            if !sleep(delay, &token, &shutdown) {
                task(&token);
            }
        })?;
        Ok(Self { cancel, handle })
    }

    pub fn cancel(&self) {
        self.cancel.trigger();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
