use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Stop flag shared by the sync thread, the agent wait and the CLI loop.
///
/// The flag lives under the same mutex the condvar waits on, so a trigger
/// between the check and the wait cannot be missed.
#[derive(Default)]
pub struct ShutdownSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every waiter.
    pub fn trigger(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.wake.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep up to `duration`. Returns `true` if the signal fired.
    pub fn wait(&self, duration: Duration) -> bool {
        let stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let (stopped, _) = self
            .wake
            .wait_timeout_while(stopped, duration, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *stopped
    }

    /// Poll `ready` every `poll` until it holds, `timeout` passes or the
    /// signal fires. Returns the last value of `ready`.
    pub fn wait_until(&self, timeout: Duration, poll: Duration, mut ready: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if ready() {
                return true;
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() || self.wait(poll.min(left)) {
                return ready();
            }
        }
    }
}
