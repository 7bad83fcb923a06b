//! 缓冲槽
//!
//! 缓冲池中的每个槽由两部分组成：
//!
//! - [`Slot`]：固定在池数组中的数据部分，包括块数据（受独占睡眠锁保护）和 `valid` 标志
//! - [`SlotMeta`]：身份、引用计数和最近使用戳，作为记录存放在所属分片的列表里，
//!   只能在该分片的元数据锁下读写；槽在分片之间迁移时，记录随之移动
//!
//! `valid` 在重新分配时于分片锁下清零，在装载完成时于独占锁下置位，
//! 所以用原子量保存，两把锁各自提供所需的先后关系。

use core::sync::atomic::{AtomicBool, Ordering};

use crate::consts::BLOCK_SIZE;
use crate::sync::{RawSleepLock, SleepLock};
use crate::types::{BlockData, BlockKey, SlotId};

/// 缓冲槽的数据部分
pub(crate) struct Slot<R> {
    /// 数据是否与磁盘内容一致
    valid: AtomicBool,
    /// 块数据，持有独占锁才能访问
    pub(crate) data: SleepLock<R, BlockData>,
}

impl<R: RawSleepLock> Slot<R> {
    pub(crate) fn new() -> Self {
        Self {
            valid: AtomicBool::new(false),
            data: SleepLock::new([0u8; BLOCK_SIZE]),
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub(crate) fn mark_valid(&self) {
        self.valid.store(true, Ordering::Release);
    }

    /// 槽被分配给新块时调用，调用方持有该槽所在分片的锁
    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

/// 缓冲槽的元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotMeta {
    /// 池数组下标
    pub id: SlotId,
    /// 缓存的块；从未分配过的槽为 `None`
    pub key: Option<BlockKey>,
    /// 引用计数，> 0 时不能被驱逐
    pub refcnt: u32,
    /// 最近使用戳（越小越旧）
    pub stamp: u64,
}

impl SlotMeta {
    pub(crate) const fn unassigned(id: SlotId) -> Self {
        Self {
            id,
            key: None,
            refcnt: 0,
            stamp: 0,
        }
    }

    /// 是否可以被重新分配
    pub(crate) fn is_free(&self) -> bool {
        self.refcnt == 0
    }

    /// 增加引用计数
    pub(crate) fn get(&mut self) {
        self.refcnt += 1;
    }

    /// 减少引用计数
    pub(crate) fn put(&mut self) {
        debug_assert!(self.refcnt > 0, "slot {} refcnt underflow", self.id);
        self.refcnt = self.refcnt.saturating_sub(1);
    }

    /// 把槽分配给新块，调用者成为唯一的持有者
    pub(crate) fn reassign(&mut self, key: BlockKey, stamp: u64) {
        self.key = Some(key);
        self.refcnt = 1;
        self.stamp = stamp;
    }
}
