//! 同步原语
//!
//! 块缓存使用两层锁：
//! - 分片元数据锁：`spin::Mutex`，临界区只做链表和字段操作，不做 I/O
//! - 缓冲槽独占锁：[`SleepLock`]，可以跨设备 I/O 持有

mod clock;
mod lock;
#[cfg(feature = "std")]
mod thread;

pub use clock::{Clock, TickCounter};
pub use lock::{RawSleepLock, SleepLock, SleepLockGuard};
#[cfg(feature = "std")]
pub use thread::ThreadSleepLock;
