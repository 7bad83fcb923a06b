//! 睡眠锁接口
//!
//! 对应内核的 `acquiresleep/releasesleep/holdingsleep` API

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

/// 睡眠锁原语 trait
///
/// 缓冲槽的独占锁通过此 trait 由调度器提供：获取失败时挂起当前线程，
/// 释放时唤醒等待者。它允许在持锁期间进行设备 I/O。
///
/// # 设计说明
///
/// 实现方需要能回答"当前线程是否持有此锁"，
/// 缓存在 `commit`/`release` 中用它检查调用方约定：
/// - `ThreadSleepLock` - 宿主机线程（`std` 特性）
/// - 内核中可基于进程控制块和等待队列自行实现
///
/// # Safety
///
/// [`SleepLock`] 依据此 trait 在线程间共享数据，实现方必须保证：
///
/// - 互斥：`lock` 返回后，直到同一线程调用 `unlock` 之前，
///   其他线程的 `lock` 不会返回
/// - `holding` 准确：当且仅当当前线程持有此锁时返回 `true`
/// - `unlock` 只会在持有者线程上被调用（由 [`SleepLockGuard`] 保证）
///
/// 不提供互斥的实现无法通过安全代码写出：
///
/// ```rust,compile_fail
/// use bcache_core::RawSleepLock;
///
/// #[derive(Default)]
/// struct NoopLock;
///
/// impl RawSleepLock for NoopLock {
///     fn lock(&self) {}
///     fn unlock(&self) {}
///     fn holding(&self) -> bool {
///         true
///     }
/// }
/// ```
///
/// # 示例
///
/// ```rust,ignore
/// let cache: BufferCache<ThreadSleepLock> = BufferCache::new(device);
/// ```
pub unsafe trait RawSleepLock: Default + Send + Sync {
    /// 获取锁，必要时挂起当前线程
    fn lock(&self);

    /// 释放锁
    ///
    /// 只能由持有者调用
    fn unlock(&self);

    /// 当前线程是否持有此锁
    fn holding(&self) -> bool;
}

/// 睡眠锁保护的数据
pub struct SleepLock<R, T: ?Sized> {
    raw: R,
    data: UnsafeCell<T>,
}

// SAFETY: `data` 只能经由 `SleepLockGuard` 访问，而守卫的存在意味着 `raw` 已被当前线程持有；
// `RawSleepLock` 是 unsafe trait，实现方保证互斥。
unsafe impl<R: RawSleepLock, T: ?Sized + Send> Sync for SleepLock<R, T> {}
unsafe impl<R: RawSleepLock, T: ?Sized + Send> Send for SleepLock<R, T> {}

impl<R: RawSleepLock, T> SleepLock<R, T> {
    /// 创建睡眠锁
    pub fn new(data: T) -> Self {
        Self {
            raw: R::default(),
            data: UnsafeCell::new(data),
        }
    }
}

impl<R: RawSleepLock, T: ?Sized> SleepLock<R, T> {
    /// 获取锁，返回守卫
    pub fn lock(&self) -> SleepLockGuard<'_, R, T> {
        self.raw.lock();
        SleepLockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// 当前线程是否持有此锁
    pub fn holding(&self) -> bool {
        self.raw.holding()
    }
}

/// 睡眠锁守卫
///
/// 不实现 `Send`：锁必须由获取它的线程释放。
pub struct SleepLockGuard<'a, R: RawSleepLock, T: ?Sized> {
    lock: &'a SleepLock<R, T>,
    _not_send: PhantomData<*const ()>,
}

impl<R: RawSleepLock, T: ?Sized> SleepLockGuard<'_, R, T> {
    /// 当前线程是否仍持有底层锁
    pub fn holding(&self) -> bool {
        self.lock.raw.holding()
    }
}

impl<R: RawSleepLock, T: ?Sized> Deref for SleepLockGuard<'_, R, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: 守卫存在期间锁被持有，不会有其他访问者。
        unsafe { &*self.lock.data.get() }
    }
}

impl<R: RawSleepLock, T: ?Sized> DerefMut for SleepLockGuard<'_, R, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: 同上，且 `&mut self` 保证守卫内唯一。
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<R: RawSleepLock, T: ?Sized> Drop for SleepLockGuard<'_, R, T> {
    fn drop(&mut self) {
        self.lock.raw.unlock();
    }
}
