//! bcache_core: 分片内核缓冲缓存
//!
//! 这是一个 xv6 风格的块缓冲缓存，旨在提供：
//! - **固定大小**的缓冲池，初始化后不扩容、不释放
//! - **按块号分片**的元数据锁，降低多核下的锁竞争
//! - **结构化的锁顺序**：持有分片锁时无法等待缓冲槽的独占锁
//! - **可选的 C API 兼容层**
//!
//! # 示例
//!
//! ```rust,ignore
//! use bcache_core::{BufferCache, RamDisk, ThreadSleepLock, Result};
//!
//! fn main() -> Result<()> {
//!     let disk = Arc::new(RamDisk::new(1000));
//!     let cache: BufferCache<ThreadSleepLock> = BufferCache::new(disk);
//!
//!     // 读取块
//!     let mut buf = cache.fetch(1, 10)?;
//!     buf.data_mut()[0] = 1;
//!
//!     // 写穿并释放
//!     buf.commit()?;
//!     buf.release()?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`block`] - 块设备抽象和内存块设备
//! - [`consts`] - 常量定义
//! - [`types`] - 基本类型定义
//! - [`sync`] - 睡眠锁和戳来源
//! - [`cache`] - 缓冲缓存
//! - `c_api` - C API 兼容层（可选）

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 块设备抽象
pub mod block;

/// 常量定义
pub mod consts;

/// 基本类型定义
pub mod types;

/// 睡眠锁和戳来源
pub mod sync;

/// 缓冲缓存
pub mod cache;

// ===== C API 兼容层（可选）=====

/// C API 兼容层
///
/// 提供与 xv6 `bio.c` 兼容的函数接口。
#[cfg(feature = "c-api")]
pub mod c_api;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 块设备
pub use block::{BlockDevice, Fault, RamDisk};

// 基本类型
pub use types::{BlockData, BlockKey, BlockNo, DeviceId, SlotId};

// 同步原语
pub use sync::{Clock, RawSleepLock, SleepLock, SleepLockGuard, TickCounter};
#[cfg(feature = "std")]
pub use sync::ThreadSleepLock;

// Cache
pub use cache::{BufGuard, BufferCache, CacheStats, PinnedBuf, ShardSnapshot, SlotHandle, SlotSnapshot};

// C API（当启用时）
#[cfg(feature = "c-api")]
pub use c_api::bio::{binit, bread, brelse, bpin, bunpin, bwrite, Buf, PinnedBlock};
