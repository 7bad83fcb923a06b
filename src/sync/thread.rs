//! 基于宿主机线程的睡眠锁

use std::sync::{Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use super::RawSleepLock;

/// 线程睡眠锁
///
/// 用 `Mutex` 记录持有者的 `ThreadId`，等待者在 `Condvar` 上挂起。
#[derive(Debug, Default)]
pub struct ThreadSleepLock {
    owner: Mutex<Option<ThreadId>>,
    wakeup: Condvar,
}

// SAFETY: `owner` 在 `Mutex` 下记录唯一的持有者，`lock` 在其为 `Some` 时一直等待；
// `holding` 比较的是当前线程的 `ThreadId`。
unsafe impl RawSleepLock for ThreadSleepLock {
    fn lock(&self) {
        let me = thread::current().id();
        let mut owner = self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        while owner.is_some() {
            owner = self
                .wakeup
                .wait(owner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *owner = Some(me);
    }

    fn unlock(&self) {
        let mut owner = self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        debug_assert_eq!(*owner, Some(thread::current().id()));
        *owner = None;
        drop(owner);
        self.wakeup.notify_one();
    }

    fn holding(&self) -> bool {
        let owner = self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        *owner == Some(thread::current().id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_waiter_blocks_until_unlock() {
        let lock = ThreadSleepLock::default();
        let released = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel();

        lock.lock();
        thread::scope(|s| {
            s.spawn(|| {
                tx.send(()).unwrap();
                lock.lock();
                assert!(released.load(Ordering::SeqCst));
                assert!(lock.holding());
                lock.unlock();
            });
            rx.recv().unwrap();
            thread::sleep(Duration::from_millis(20));
            released.store(true, Ordering::SeqCst);
            lock.unlock();
        });
        assert!(!lock.holding());
    }
}
