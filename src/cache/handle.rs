//! 缓冲槽句柄 - RAII 风格的块访问
//!
//! - [`BufGuard`]：`fetch` 的返回值，持有独占锁和一个引用
//! - [`PinnedBuf`]：`pin` 的返回值，只持有一个引用，不持有独占锁
//!
//! 两者丢弃时都会自动归还引用；显式调用 `release`/`unpin` 可以拿到错误。

use byteorder::{ByteOrder, LittleEndian};

use super::block_cache::BufferCache;
use crate::consts::BLOCK_SIZE;
use crate::error::{Error, ErrorKind, Result};
use crate::sync::{RawSleepLock, SleepLockGuard};
use crate::types::{BlockData, BlockKey, BlockNo, DeviceId, SlotId};

pub(super) mod sealed {
    pub trait Sealed {
        /// 句柄所属缓存的地址
        fn owner(&self) -> *const u8;
    }
}

/// 指向某个缓冲槽的句柄，可用于 `pin`
pub trait SlotHandle: sealed::Sealed {
    /// 池数组下标
    fn slot(&self) -> SlotId;

    /// 缓存的块
    fn key(&self) -> BlockKey;
}

/// 持有独占锁的缓冲槽
///
/// 对应内核 `bread` 返回的已上锁 `buf`
///
/// - 持有期间只有当前线程能读写块数据，也可以跨设备 I/O 持有
/// - 修改后调用 [`commit`](Self::commit) 同步写回磁盘
/// - 用完调用 [`release`](Self::release) 或直接丢弃；之后不能再访问该槽
///
/// 不实现 `Send`：独占锁必须由获取它的线程释放。
///
/// # 示例
///
/// ```rust,ignore
/// let mut buf = cache.fetch(1, 10)?;
/// buf.write_u32(0, 0xdead_beef)?;
/// buf.commit()?;
/// buf.release()?;
/// ```
pub struct BufGuard<'a, R: RawSleepLock> {
    cache: &'a BufferCache<R>,
    slot: SlotId,
    key: BlockKey,
    /// 释放后为 `None`
    data: Option<SleepLockGuard<'a, R, BlockData>>,
}

impl<'a, R: RawSleepLock> BufGuard<'a, R> {
    pub(crate) fn new(
        cache: &'a BufferCache<R>,
        slot: SlotId,
        key: BlockKey,
        data: SleepLockGuard<'a, R, BlockData>,
    ) -> Self {
        Self {
            cache,
            slot,
            key,
            data: Some(data),
        }
    }

    /// 缓存的块
    pub fn key(&self) -> BlockKey {
        self.key
    }

    /// 池数组下标
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// 设备号
    pub fn dev(&self) -> DeviceId {
        self.key.dev
    }

    /// 块号
    pub fn blockno(&self) -> BlockNo {
        self.key.blockno
    }

    /// 数据是否与磁盘内容一致
    pub fn is_valid(&self) -> bool {
        self.cache.slot_valid(self.slot)
    }

    /// 当前线程是否持有该槽的独占锁
    pub fn holding(&self) -> bool {
        self.data.as_ref().is_some_and(|g| g.holding())
    }

    /// 块数据
    pub fn data(&self) -> &BlockData {
        match self.data {
            Some(ref guard) => guard,
            None => unreachable!("buffer used after release"),
        }
    }

    /// 块数据（可写）
    pub fn data_mut(&mut self) -> &mut BlockData {
        match self.data {
            Some(ref mut guard) => guard,
            None => unreachable!("buffer used after release"),
        }
    }

    /// 用闭包读取块数据
    pub fn with_data<T>(&self, f: impl FnOnce(&BlockData) -> T) -> T {
        f(self.data())
    }

    /// 用闭包修改块数据
    pub fn with_data_mut<T>(&mut self, f: impl FnOnce(&mut BlockData) -> T) -> T {
        f(self.data_mut())
    }

    /// 按小端序读取 `offset` 处的 u32
    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        let range = field_range(offset, 4)?;
        Ok(LittleEndian::read_u32(&self.data()[range]))
    }

    /// 按小端序在 `offset` 处写入 u32
    pub fn write_u32(&mut self, offset: usize, value: u32) -> Result<()> {
        let range = field_range(offset, 4)?;
        LittleEndian::write_u32(&mut self.data_mut()[range], value);
        Ok(())
    }

    /// 把块数据同步写回磁盘，不释放独占锁
    pub fn commit(&self) -> Result<()> {
        self.cache.commit(self)
    }

    /// 登记一个不持锁的引用，防止该槽被驱逐
    pub fn pin(&self) -> Result<PinnedBuf<'a, R>> {
        self.cache.pin(self)
    }

    /// 释放独占锁并归还引用
    pub fn release(mut self) -> Result<()> {
        self.release_slot()
    }

    /// 先放开独占锁，再在分片锁下减少引用计数
    fn release_slot(&mut self) -> Result<()> {
        let Some(data) = self.data.take() else {
            return Ok(());
        };
        if !data.holding() {
            // 不能替别人解锁，也不能归还别人的引用
            core::mem::forget(data);
            log::error!("[BCACHE] brelse {}: caller does not hold the buffer", self.key);
            return Err(Error::new(
                ErrorKind::NotHolder,
                "brelse: buffer not locked by caller",
            ));
        }
        drop(data);
        self.cache.put_ref(self.slot, self.key)
    }
}

impl<R: RawSleepLock> sealed::Sealed for BufGuard<'_, R> {
    fn owner(&self) -> *const u8 {
        (self.cache as *const BufferCache<R>).cast()
    }
}

impl<R: RawSleepLock> SlotHandle for BufGuard<'_, R> {
    fn slot(&self) -> SlotId {
        self.slot
    }

    fn key(&self) -> BlockKey {
        self.key
    }
}

impl<R: RawSleepLock> Drop for BufGuard<'_, R> {
    fn drop(&mut self) {
        if let Err(err) = self.release_slot() {
            panic!("brelse {}: {}", self.key, err);
        }
    }
}

impl<R: RawSleepLock> core::fmt::Debug for BufGuard<'_, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufGuard")
            .field("slot", &self.slot)
            .field("key", &self.key)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// 被钉住的缓冲槽
///
/// 对应内核的 `bpin/bunpin`：只占用引用计数，不持有独占锁，
/// 用于在释放缓冲槽后、再次获取之前保证它不被驱逐。
#[must_use = "dropping a PinnedBuf unpins it immediately"]
pub struct PinnedBuf<'a, R: RawSleepLock> {
    cache: &'a BufferCache<R>,
    slot: SlotId,
    key: BlockKey,
    pinned: bool,
}

impl<'a, R: RawSleepLock> PinnedBuf<'a, R> {
    pub(crate) fn new(cache: &'a BufferCache<R>, slot: SlotId, key: BlockKey) -> Self {
        Self {
            cache,
            slot,
            key,
            pinned: true,
        }
    }

    /// 被钉住的块
    pub fn key(&self) -> BlockKey {
        self.key
    }

    /// 池数组下标
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// 再登记一个引用
    pub fn pin(&self) -> Result<PinnedBuf<'a, R>> {
        self.cache.pin(self)
    }

    /// 重新获取该块；槽被钉住，一定命中
    pub fn fetch(&self) -> Result<BufGuard<'a, R>> {
        self.cache.fetch(self.key.dev, self.key.blockno)
    }

    /// 归还引用
    pub fn unpin(mut self) -> Result<()> {
        self.unpin_slot()
    }

    fn unpin_slot(&mut self) -> Result<()> {
        if !core::mem::replace(&mut self.pinned, false) {
            return Ok(());
        }
        self.cache.put_ref(self.slot, self.key)
    }
}

impl<R: RawSleepLock> sealed::Sealed for PinnedBuf<'_, R> {
    fn owner(&self) -> *const u8 {
        (self.cache as *const BufferCache<R>).cast()
    }
}

impl<R: RawSleepLock> SlotHandle for PinnedBuf<'_, R> {
    fn slot(&self) -> SlotId {
        self.slot
    }

    fn key(&self) -> BlockKey {
        self.key
    }
}

impl<R: RawSleepLock> Drop for PinnedBuf<'_, R> {
    fn drop(&mut self) {
        if let Err(err) = self.unpin_slot() {
            panic!("bunpin {}: {}", self.key, err);
        }
    }
}

impl<R: RawSleepLock> core::fmt::Debug for PinnedBuf<'_, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PinnedBuf")
            .field("slot", &self.slot)
            .field("key", &self.key)
            .finish()
    }
}

/// 检查块内字段范围
fn field_range(offset: usize, len: usize) -> Result<core::ops::Range<usize>> {
    match offset.checked_add(len) {
        Some(end) if end <= BLOCK_SIZE => Ok(offset..end),
        _ => Err(Error::new(
            ErrorKind::InvalidInput,
            "field lies outside the block",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_range() {
        assert_eq!(field_range(0, 4).unwrap(), 0..4);
        assert_eq!(field_range(BLOCK_SIZE - 4, 4).unwrap(), BLOCK_SIZE - 4..BLOCK_SIZE);
        assert_eq!(
            field_range(BLOCK_SIZE - 3, 4).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert!(field_range(usize::MAX, 4).is_err());
    }
}
