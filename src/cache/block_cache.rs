//! 分片缓冲缓存
//!
//! 对应 xv6 的 `bcache` 及 `bread/bwrite/brelse/bpin/bunpin`
//!
//! # 结构
//!
//! ```text
//! BufferCache
//!   slots:  [Slot; POOL_SIZE]        数据部分，按下标固定，带独占睡眠锁
//!   shards: [Shard; SHARD_COUNT]     每个分片：自旋锁 + SlotMeta 列表
//!   evict_lock                       串行化跨分片驱逐
//! ```
//!
//! 槽的身份、引用计数和戳存放在所属分片的列表里；块数据只能在持有独占锁时访问。
//! 所有缓冲槽在初始化时都挂在分片 0 上，之后按需迁移。

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::handle::sealed::Sealed;
use super::handle::{BufGuard, PinnedBuf, SlotHandle};
use super::shard::{route, Lookup, Shard};
use super::slot::{Slot, SlotMeta};
use super::stats::{CacheStats, Counters, ShardSnapshot, SlotSnapshot};
use crate::block::BlockDevice;
use crate::consts::{POOL_SIZE, SHARD_COUNT};
use crate::error::{Error, ErrorKind, Result};
use crate::sync::{Clock, RawSleepLock, TickCounter};
use crate::types::{BlockKey, BlockNo, DeviceId, SlotId};

/// 分片缓冲缓存
///
/// 固定 `POOL_SIZE` 个缓冲槽，按块号分片以降低元数据锁的竞争。
/// 所有操作都是写穿的：`commit` 立即同步写盘，缓存中没有脏块。
///
/// # 示例
///
/// ```rust,ignore
/// let disk = Arc::new(RamDisk::new(1024));
/// let cache: BufferCache<ThreadSleepLock> = BufferCache::new(disk);
///
/// let mut buf = cache.fetch(1, 10)?;
/// buf.data_mut()[0] = 0xff;
/// buf.commit()?;
/// buf.release()?;
/// ```
pub struct BufferCache<R: RawSleepLock> {
    /// 块设备
    device: Arc<dyn BlockDevice>,
    /// 戳来源
    pub(super) clock: Arc<dyn Clock>,
    /// 缓冲池
    pub(super) slots: Box<[Slot<R>]>,
    /// 元数据分片
    pub(super) shards: Box<[Shard]>,
    /// 跨分片驱逐锁；槽只在持有它时迁移
    pub(super) evict_lock: spin::Mutex<()>,
    /// 统计计数器
    pub(super) counters: Counters,
}

impl<R: RawSleepLock> BufferCache<R> {
    /// 创建缓存，戳由内部计数器产生
    pub fn new(device: Arc<dyn BlockDevice>) -> Self {
        Self::with_clock(device, Arc::new(TickCounter::new()))
    }

    /// 创建缓存，使用指定的戳来源
    ///
    /// `clock` 必须单调递增，例如内核的时钟滴答计数。
    pub fn with_clock(device: Arc<dyn BlockDevice>, clock: Arc<dyn Clock>) -> Self {
        let slots: Box<[Slot<R>]> = (0..POOL_SIZE).map(|_| Slot::new()).collect();
        let shards: Box<[Shard]> = (0..SHARD_COUNT).map(|_| Shard::new()).collect();
        {
            let mut first = shards[0].lock();
            for id in 0..POOL_SIZE {
                first.attach(SlotMeta::unassigned(id));
            }
        }
        log::info!(
            "[BCACHE] init: {} buffers of {} bytes, {} shards",
            POOL_SIZE,
            crate::consts::BLOCK_SIZE,
            SHARD_COUNT
        );
        Self {
            device,
            clock,
            slots,
            shards,
            evict_lock: spin::Mutex::new(()),
            counters: Counters::default(),
        }
    }

    /// 获取块，返回持有独占锁的缓冲槽
    ///
    /// 对应 xv6 的 `bread`
    ///
    /// 槽中数据无效时同步读盘。读盘失败时归还引用并返回错误，
    /// 槽保持无效，下次获取会重新读取。
    ///
    /// # 错误
    ///
    /// - `NoBuffers`：所有缓冲槽都被引用（致命）
    /// - `Io`：设备读取失败
    pub fn fetch(&self, dev: DeviceId, blockno: BlockNo) -> Result<BufGuard<'_, R>> {
        let key = BlockKey::new(dev, blockno);
        let claim = self.acquire(key)?;
        // 只统计成功的获取，使命中加未命中等于总访问次数
        Counters::bump(&self.counters.total_accesses);
        let mut buf = self.lock_claim(claim);
        let slot = &self.slots[buf.slot()];
        if !slot.is_valid() {
            if let Err(err) = self.device.read_block(key, buf.data_mut()) {
                log::warn!("[BCACHE] bread {} failed: {}", key, err);
                buf.release()?;
                return Err(err);
            }
            slot.mark_valid();
            Counters::bump(&self.counters.device_reads);
            log::trace!("[BCACHE] bread {} loaded into slot {}", key, buf.slot());
        }
        Ok(buf)
    }

    /// 把缓冲槽同步写回磁盘
    ///
    /// 对应 xv6 的 `bwrite`。不释放独占锁，也不改变引用计数。
    ///
    /// # 错误
    ///
    /// - `NotHolder`：当前线程没有持有独占锁（致命）
    /// - `InvalidInput`：句柄属于另一个缓存
    /// - `Io`：设备写入失败
    pub fn commit(&self, buf: &BufGuard<'_, R>) -> Result<()> {
        self.check_owner(buf)?;
        if !buf.holding() {
            log::error!("[BCACHE] bwrite {}: caller does not hold the buffer", buf.key());
            return Err(Error::new(
                ErrorKind::NotHolder,
                "bwrite: buffer not locked by caller",
            ));
        }
        self.device.write_block(buf.key(), buf.data()).map_err(|err| {
            log::warn!("[BCACHE] bwrite {} failed: {}", buf.key(), err);
            err
        })?;
        Counters::bump(&self.counters.device_writes);
        log::trace!("[BCACHE] bwrite {} from slot {}", buf.key(), buf.slot());
        Ok(())
    }

    /// 释放独占锁并归还引用
    ///
    /// 对应 xv6 的 `brelse`。属于另一个缓存的句柄仍会被它自己的缓存释放，
    /// 但本调用返回 `InvalidInput`。
    pub fn release(&self, buf: BufGuard<'_, R>) -> Result<()> {
        self.check_owner(&buf)?;
        buf.release()
    }

    /// 为句柄指向的槽增加一个引用，不需要持有独占锁
    ///
    /// 对应 xv6 的 `bpin`
    pub fn pin<'a, H: SlotHandle>(&'a self, handle: &H) -> Result<PinnedBuf<'a, R>> {
        self.check_owner(handle)?;
        let (slot, key) = (handle.slot(), handle.key());
        self.with_meta(slot, key, SlotMeta::get)?;
        log::trace!("[BCACHE] bpin {} slot {}", key, slot);
        Ok(PinnedBuf::new(self, slot, key))
    }

    /// 归还 `pin` 登记的引用
    ///
    /// 对应 xv6 的 `bunpin`
    pub fn unpin(&self, pinned: PinnedBuf<'_, R>) -> Result<()> {
        self.check_owner(&pinned)?;
        pinned.unpin()
    }

    /// 在分片锁下减少引用计数
    pub(crate) fn put_ref(&self, slot: SlotId, key: BlockKey) -> Result<()> {
        self.with_meta(slot, key, |meta| {
            if meta.is_free() {
                return Err(Error::new(
                    ErrorKind::InvalidState,
                    "reference count underflow",
                ));
            }
            meta.put();
            Ok(())
        })?
    }

    pub(crate) fn slot_valid(&self, slot: SlotId) -> bool {
        self.slots[slot].is_valid()
    }

    /// 在 `key` 所在分片的锁下访问槽的元数据
    ///
    /// 被引用的槽不会迁移，所以一定在 `key` 的主分片上。
    fn with_meta<T>(
        &self,
        slot: SlotId,
        key: BlockKey,
        f: impl FnOnce(&mut SlotMeta) -> T,
    ) -> Result<T> {
        let mut list = self.shards[route(key.blockno)].lock();
        let Some(pos) = list.position(slot) else {
            log::error!("[BCACHE] slot {} for {} is not in its home shard", slot, key);
            return Err(Error::new(
                ErrorKind::InvalidState,
                "slot is not in its home shard",
            ));
        };
        let meta = list.entry_mut(pos);
        if meta.key != Some(key) {
            log::error!("[BCACHE] slot {} no longer caches {}", slot, key);
            return Err(Error::new(
                ErrorKind::InvalidState,
                "slot was reassigned while referenced",
            ));
        }
        Ok(f(meta))
    }

    fn check_owner(&self, handle: &impl Sealed) -> Result<()> {
        if core::ptr::eq(handle.owner(), (self as *const Self).cast()) {
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer belongs to another cache",
            ))
        }
    }

    /// 获取统计信息
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// 各分片的成员
    ///
    /// 持有驱逐锁逐个遍历分片，遍历期间没有槽迁移，
    /// 所以结果中每个槽恰好出现一次。
    pub fn snapshot(&self) -> Vec<ShardSnapshot> {
        let _evicting = self.evict_lock.lock();
        self.shards
            .iter()
            .enumerate()
            .map(|(shard, s)| ShardSnapshot {
                shard,
                slots: s.lock().iter().map(SlotSnapshot::from).collect(),
            })
            .collect()
    }

    /// 块当前的引用计数；块不在缓存中时返回 `None`
    pub fn ref_count(&self, dev: DeviceId, blockno: BlockNo) -> Option<u32> {
        let key = BlockKey::new(dev, blockno);
        let list = self.shards[route(blockno)].lock();
        match list.lookup(key) {
            Lookup::Hit(pos) => Some(list.entry(pos).refcnt),
            _ => None,
        }
    }

    /// 缓冲槽数量
    pub fn pool_size(&self) -> usize {
        self.slots.len()
    }

    /// 分片数量
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// 块设备
    pub fn device(&self) -> &Arc<dyn BlockDevice> {
        &self.device
    }
}

impl<R: RawSleepLock> core::fmt::Debug for BufferCache<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufferCache")
            .field("pool_size", &self.pool_size())
            .field("shard_count", &self.shard_count())
            .field("stats", &self.stats())
            .finish()
    }
}
