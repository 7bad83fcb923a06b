//! 单调计数器
//!
//! 为缓冲槽提供最近使用戳。只需要全序，不需要墙上时间语义。

use core::sync::atomic::{AtomicU64, Ordering};

/// 单调时钟
pub trait Clock: Send + Sync {
    /// 当前计数值，不小于之前返回的任何值
    fn now(&self) -> u64;
}

/// 自增计数器
///
/// 每次调用 `now` 都返回严格递增的值，因此不同的重新分配不会得到相同的戳。
#[derive(Debug, Default)]
pub struct TickCounter {
    ticks: AtomicU64,
}

impl TickCounter {
    /// 创建计数器
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
        }
    }
}

impl Clock for TickCounter {
    fn now(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictly_increasing() {
        let clock = TickCounter::new();
        let a = clock.now();
        let b = clock.now();
        let c = clock.now();
        assert!(a > 0);
        assert!(a < b && b < c);
    }
}
