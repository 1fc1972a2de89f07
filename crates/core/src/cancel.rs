use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// One-way cooperative stop flag shared by the threads of one session or
/// proxy connection.
///
/// Once [`stop`](Self::stop) is called the flag never resets. Threads blocked
/// in [`wait_timeout`](Self::wait_timeout) wake immediately; threads blocked
/// in socket calls notice on their next loop iteration.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

#[derive(Debug, Default)]
struct StopInner {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every waiter.
    pub fn stop(&self) {
        let mut stopped = self.inner.stopped.lock();
        if !*stopped {
            *stopped = true;
            self.inner.cond.notify_all();
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.stopped.lock()
    }

    /// Sleep for `timeout` or until stopped, whichever comes first.
    ///
    /// Returns `true` if the flag is raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.inner.stopped.lock();
        while !*stopped {
            if self.inner.cond.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}
