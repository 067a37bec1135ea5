// Read/write access arbiter
//
// Multi-reader / single-writer lock over the whole cache. The thread holding write access
// may take read access (and write access again) without blocking, so listeners notified
// from inside a pass can use the ordinary lookup surface.

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::CacheError;

#[derive(Default)]
pub struct AccessArbiter {
    lock: RwLock<()>,
    writer: Mutex<Option<(ThreadId, usize)>>,
    readers: Mutex<HashMap<ThreadId, usize>>,
}

/// Read access. Dropping it releases the lock.
pub struct ReadAccess<'a> {
    arbiter: &'a AccessArbiter,
    guard: Option<RwLockReadGuard<'a, ()>>,
}

/// Exclusive access. Dropping the outermost guard releases the lock.
pub struct WriteAccess<'a> {
    arbiter: &'a AccessArbiter,
    _guard: Option<RwLockWriteGuard<'a, ()>>,
}

impl AccessArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared access. Free when the current thread already holds write access.
    pub fn read(&self) -> ReadAccess<'_> {
        if self.holds_write() {
            return ReadAccess { arbiter: self, guard: None };
        }

        // Recursive so a thread re-entering read access never waits behind a queued writer.
        let guard = self.lock.read_recursive();
        *self.readers.lock().entry(thread::current().id()).or_insert(0) += 1;
        ReadAccess { arbiter: self, guard: Some(guard) }
    }

    /// Exclusive access.
    ///
    /// Fails when the current thread only holds read access: upgrading would deadlock.
    pub fn write(&self) -> Result<WriteAccess<'_>, CacheError> {
        let me = thread::current().id();
        {
            let mut writer = self.writer.lock();
            if let Some((owner, depth)) = writer.as_mut()
                && *owner == me
            {
                *depth += 1;
                return Ok(WriteAccess { arbiter: self, _guard: None });
            }
        }

        if self.holds_read() {
            return Err(CacheError::AccessViolation(
                "write access requested while holding read access".to_string(),
            ));
        }

        let guard = self.lock.write();
        *self.writer.lock() = Some((me, 1));
        Ok(WriteAccess { arbiter: self, _guard: Some(guard) })
    }

    pub fn holds_write(&self) -> bool {
        let me = thread::current().id();
        matches!(*self.writer.lock(), Some((owner, _)) if owner == me)
    }

    pub fn holds_read(&self) -> bool {
        self.readers.lock().contains_key(&thread::current().id())
    }

    /// Current thread may read cache state.
    pub fn is_read_allowed(&self) -> bool {
        self.holds_write() || self.holds_read()
    }
}

impl Drop for ReadAccess<'_> {
    fn drop(&mut self) {
        if self.guard.is_none() {
            return;
        }
        let me = thread::current().id();
        let mut readers = self.arbiter.readers.lock();
        if let Some(depth) = readers.get_mut(&me) {
            *depth -= 1;
            if *depth == 0 {
                readers.remove(&me);
            }
        }
    }
}

impl Drop for WriteAccess<'_> {
    fn drop(&mut self) {
        let mut writer = self.arbiter.writer.lock();
        if let Some((_, depth)) = writer.as_mut() {
            *depth -= 1;
            if *depth == 0 {
                *writer = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_read_under_write() {
        let arbiter = AccessArbiter::new();
        let _write = arbiter.write().unwrap();

        let _read = arbiter.read();
        assert!(arbiter.holds_write());
        assert!(!arbiter.holds_read());
        assert!(arbiter.is_read_allowed());
    }

    #[test]
    fn test_nested_write() {
        let arbiter = AccessArbiter::new();
        let outer = arbiter.write().unwrap();
        {
            let _inner = arbiter.write().unwrap();
        }
        assert!(arbiter.holds_write());
        drop(outer);
        assert!(!arbiter.holds_write());
    }

    #[test]
    fn test_upgrade_rejected() {
        let arbiter = AccessArbiter::new();
        let _read = arbiter.read();
        let _nested = arbiter.read();

        assert!(matches!(arbiter.write(), Err(CacheError::AccessViolation(_))));
        drop(_nested);
        assert!(arbiter.holds_read());
    }

    #[test]
    fn test_writer_excludes_readers() {
        let arbiter = Arc::new(AccessArbiter::new());
        let write = arbiter.write().unwrap();
        let entered = Arc::new(AtomicBool::new(false));

        let reader = {
            let arbiter = arbiter.clone();
            let entered = entered.clone();
            thread::spawn(move || {
                let _read = arbiter.read();
                entered.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!entered.load(Ordering::SeqCst));
        drop(write);
        reader.join().unwrap();
        assert!(entered.load(Ordering::SeqCst));
    }

    #[test]
    fn test_release_clears_tracking() {
        let arbiter = AccessArbiter::new();
        {
            let _read = arbiter.read();
            assert!(arbiter.is_read_allowed());
        }
        assert!(!arbiter.is_read_allowed());
        assert!(arbiter.write().is_ok());
    }
}
