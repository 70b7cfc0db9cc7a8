use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::error;

/// A background task that runs a closure every `period`, with prompt
/// cancellation.
///
/// Each task owns a dedicated OS thread, so iterations of one task are
/// strictly serialized (and always run on the same thread), while separate
/// tasks run in parallel with each other.  A panic inside the closure is
/// caught and logged; the task keeps ticking.
///
/// The inter-iteration wait doubles as the cancellation point: [`stop`]
/// wakes the sleeper immediately, so a pending iteration is skipped rather
/// than waited out.
///
/// [`stop`]: PeriodicTask::stop
pub struct PeriodicTask {
    name: String,
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawns a periodic task named `name` running `body` every `period`.
    ///
    /// The first iteration runs after one full period, not immediately.
    ///
    /// # Errors
    ///
    /// Fails if the backing OS thread could not be spawned.
    pub fn spawn<F>(name: impl Into<String>, period: Duration, mut body: F) -> io::Result<PeriodicTask>
    where
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        let (stop_tx, stop_rx) = bounded(1);

        let task_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || loop {
            match stop_rx.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => {
                    let result = panic::catch_unwind(AssertUnwindSafe(&mut body));
                    if let Err(payload) = result {
                        error!(
                            task = %task_name,
                            panic = panic_message(payload.as_ref()),
                            "periodic task iteration panicked; the task will keep running"
                        );
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        })?;

        Ok(PeriodicTask { name, stop_tx, handle })
    }

    /// Name this task was spawned with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the task and waits for it to wind down.
    ///
    /// If an iteration is mid-flight it runs to completion; a pending
    /// iteration still in its wait is skipped.  Returns the join result of
    /// the underlying thread so callers can inspect how it ended.
    pub fn stop(self) -> thread::Result<()> {
        let _ = self.stop_tx.send(());
        self.handle.join()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
