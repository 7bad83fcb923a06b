//! 缓冲缓存模块
//!
//! 固定大小的内核缓冲缓存，对应 xv6 的 `bio.c`。
//!
//! # 主要组件
//!
//! - [`BufferCache`] - 缓冲池和分片元数据，提供 `fetch/commit/release/pin/unpin`
//! - [`BufGuard`] - 持有独占锁的缓冲槽
//! - [`PinnedBuf`] - 被钉住、不持锁的缓冲槽
//! - [`CacheStats`] - 缓存统计信息
//!
//! # 锁的两个层级
//!
//! 1. 分片元数据锁（自旋锁）：只保护身份、引用计数、戳和分片成员关系，
//!    临界区内不做 I/O，也不等待独占锁
//! 2. 缓冲槽独占锁（睡眠锁）：保护块数据，可以跨设备 I/O 持有
//!
//! 释放时先放开独占锁，再取分片锁减少引用计数。
//!
//! # 与 xv6 的对应关系
//!
//! | xv6                    | bcache_core                      |
//! |------------------------|----------------------------------|
//! | `struct buf`           | `Slot` + `SlotMeta`              |
//! | `bcache.buckets[i]`    | `Shard`                          |
//! | `bget()`               | `BufferCache::acquire()`         |
//! | `bread()`              | [`BufferCache::fetch()`]         |
//! | `bwrite()`             | [`BufferCache::commit()`]        |
//! | `brelse()`             | [`BufferCache::release()`]       |
//! | `bpin()` / `bunpin()`  | [`BufferCache::pin()`] / [`BufferCache::unpin()`] |
//! | `panic("bget: no buffers")` | `ErrorKind::NoBuffers`      |
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use bcache_core::{BufferCache, RamDisk, ThreadSleepLock};
//!
//! let cache: BufferCache<ThreadSleepLock> = BufferCache::new(Arc::new(RamDisk::new(1000)));
//!
//! let mut buf = cache.fetch(1, 33)?;
//! let count = buf.read_u32(0)?;
//! buf.write_u32(0, count + 1)?;
//! buf.commit()?;
//!
//! // 释放后仍要保证块留在缓存里
//! let pinned = buf.pin()?;
//! buf.release()?;
//! // ...
//! pinned.unpin()?;
//!
//! let stats = cache.stats();
//! println!("hit rate: {:.2}", stats.hit_rate());
//! ```

mod acquire;
mod block_cache;
mod handle;
mod shard;
mod slot;
mod stats;

pub use block_cache::BufferCache;
pub use handle::{BufGuard, PinnedBuf, SlotHandle};
pub use shard::route;
pub use stats::{CacheStats, ShardSnapshot, SlotSnapshot};
