//! Poison-tolerant lock access.
//!
//! State guarded here is either a cache or a connection slot, both of which
//! stay usable after a panic elsewhere, so poisoning is logged and ignored.

use std::sync::{LockResult, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn recover<G>(result: LockResult<G>, target: &'static str, op: &'static str, kind: &str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            op,
            target_module = target,
            lock_kind = kind,
            result = "poisoned_recovered",
            "Recovered from poisoned lock"
        );
        poisoned.into_inner()
    })
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), target, op, "rwlock.read")
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), target, op, "rwlock.write")
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    recover(lock.lock(), target, op, "mutex.lock")
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn mutex_recovers_after_panic() {
        let lock = Mutex::new(1);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.lock().expect("lock should be acquired");
            panic!("poison the mutex");
        }));

        *mutex_lock(&lock, "cache::lock", "test") += 1;
        assert_eq!(*mutex_lock(&lock, "cache::lock", "test"), 2);
    }

    #[test]
    fn rwlock_recovers_after_panic() {
        let lock = RwLock::new(Some("value"));

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.write().expect("lock should be acquired");
            panic!("poison the rwlock");
        }));

        *rw_write(&lock, "cache::lock", "test") = None;
        assert!(rw_read(&lock, "cache::lock", "test").is_none());
    }
}
