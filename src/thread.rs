//! Threading support: a shared shutdown signal, a non-blocking reentrancy
//! guard and named thread spawning.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// A cancellation signal shared by every thread of the pipeline.
///
/// Cloning a `Shutdown` yields another handle on the same signal. Once
/// triggered it stays triggered.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    /// Create a new, untriggered, `Shutdown`.
    pub fn new() -> Shutdown {
        Shutdown::default()
    }

    /// Trigger the signal, waking every waiter.
    pub fn trigger(&self) {
        let &(ref lock, ref cvar) = &*self.inner;
        let mut triggered = match lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *triggered = true;
        cvar.notify_all();
    }

    /// True once `trigger` has been called on any handle.
    pub fn is_triggered(&self) -> bool {
        let &(ref lock, _) = &*self.inner;
        match lock.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Block until `deadline` passes or the signal triggers, whichever comes
    /// first. Returns true if the signal triggered.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let &(ref lock, ref cvar) = &*self.inner;
        let mut triggered = match lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            if *triggered {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            triggered = match cvar.wait_timeout(triggered, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Block for `timeout` or until the signal triggers. Returns true if the
    /// signal triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now() + timeout)
    }
}

/// A non-blocking guard against a job overlapping with itself.
///
/// `try_enter` succeeds for exactly one caller at a time. The returned
/// `Entered` token releases the guard when dropped, including on unwind.
#[derive(Clone, Debug, Default)]
pub struct Reentrancy {
    busy: Arc<AtomicBool>,
}

/// Proof of holding a `Reentrancy` guard.
#[derive(Debug)]
pub struct Entered {
    busy: Arc<AtomicBool>,
}

impl Reentrancy {
    /// Create a new, idle, guard.
    pub fn new() -> Reentrancy {
        Reentrancy::default()
    }

    /// Take the guard if it is idle. Never blocks.
    pub fn try_enter(&self) -> Option<Entered> {
        if self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(Entered {
                busy: Arc::clone(&self.busy),
            })
        } else {
            None
        }
    }

    /// True while some holder has the guard.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for Entered {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Spawn a named thread executing the provided closure.
pub fn spawn<F, T>(name: &str, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new().name(name.to_string()).spawn(f)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shutdown_wakes_waiters() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.clone();
        let handle =
            thread::spawn(move || waiter.wait_timeout(Duration::from_secs(60)));
        thread::sleep(Duration::from_millis(20));
        shutdown.trigger();
        assert!(handle.join().unwrap());
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn shutdown_wait_times_out() {
        let shutdown = Shutdown::new();
        let start = Instant::now();
        assert!(!shutdown.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(!shutdown.is_triggered());
    }

    #[test]
    fn triggered_shutdown_returns_immediately() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        assert!(shutdown.wait_timeout(Duration::from_secs(60)));
    }

    #[test]
    fn reentrancy_admits_one_holder() {
        let guard = Reentrancy::new();
        let entered = guard.try_enter();
        assert!(entered.is_some());
        assert!(guard.is_busy());
        assert!(guard.try_enter().is_none());
        assert!(guard.clone().try_enter().is_none());
        drop(entered);
        assert!(!guard.is_busy());
        assert!(guard.try_enter().is_some());
    }

    #[test]
    fn reentrancy_released_on_panic() {
        let guard = Reentrancy::new();
        let inner = guard.clone();
        let res = thread::spawn(move || {
            let _entered = inner.try_enter();
            panic!("boom");
        }).join();
        assert!(res.is_err());
        assert!(!guard.is_busy());
    }
}
