//! Cooperative cancellation shared between the supervisor and whoever asks
//! it to stop.
//!
//! The flag is a lock-free `AtomicBool` that only ever goes false → true.
//! Waiters park on a condition variable so a backoff pause ends as soon as
//! cancellation is requested. Backends may register hooks (e.g. to terminate
//! a capture subprocess) that run once, on the cancelling thread. Hooks run
//! under the registry lock, so once `unregister` returns no hook for that id
//! is running or will run. A hook must not call back into its token.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

type Hook = Box<dyn Fn() + Send + Sync>;

struct Inner {
    cancelled: AtomicBool,
    wait_lock: Mutex<()>,
    wakeup: Condvar,
    hooks: Mutex<Vec<(u64, Hook)>>,
    next_hook_id: AtomicU64,
}

/// Cloneable handle to one cancellation flag.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                wait_lock: Mutex::new(()),
                wakeup: Condvar::new(),
                hooks: Mutex::new(Vec::new()),
                next_hook_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Request cancellation. Idempotent; hooks run on the first call only.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut hooks = self.inner.hooks.lock();
            for (_, hook) in hooks.drain(..) {
                hook();
            }
        }

        let _guard = self.inner.wait_lock.lock();
        self.inner.wakeup.notify_all();
    }

    /// Sleep for up to `timeout`, returning early if cancelled.
    ///
    /// Returns `true` if cancellation was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.wait_lock.lock();
        loop {
            if self.is_cancelled() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            self.inner.wakeup.wait_until(&mut guard, deadline);
        }
    }

    /// Register `hook` to run when cancellation is requested.
    ///
    /// If the token is already cancelled the hook runs immediately. The
    /// returned id can be passed to [`unregister`](Self::unregister).
    pub fn register<F>(&self, hook: F) -> u64
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.next_hook_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut hooks = self.inner.hooks.lock();
            if !self.is_cancelled() {
                hooks.push((id, Box::new(hook)));
                return id;
            }
        }
        hook();
        id
    }

    /// Remove a hook. Blocks while cancellation hooks are running.
    pub fn unregister(&self, id: u64) {
        self.inner
            .hooks
            .lock()
            .retain(|(hook_id, _)| *hook_id != id);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
