//! 缓存统计信息

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::slot::SlotMeta;
use crate::types::{BlockKey, SlotId};

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// 总访问次数
    pub total_accesses: u64,
    /// 缓存命中次数
    pub hits: u64,
    /// 缓存未命中次数（本分片复用 + 跨分片驱逐）
    pub misses: u64,
    /// 在本分片内直接复用空闲槽的次数
    pub local_reuses: u64,
    /// 跨分片驱逐次数
    pub evictions: u64,
    /// 跨分片扫描的遍数
    pub eviction_scans: u64,
    /// 物理读取次数
    pub device_reads: u64,
    /// 物理写入次数
    pub device_writes: u64,
    /// 驱逐过程中同时持有的外部分片锁数量的最大值
    pub max_foreign_locks_held: usize,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_accesses as f64
        }
    }
}

/// 无锁计数器，供并发路径累加
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub total_accesses: AtomicU64,
    pub hits: AtomicU64,
    pub local_reuses: AtomicU64,
    pub evictions: AtomicU64,
    pub eviction_scans: AtomicU64,
    pub device_reads: AtomicU64,
    pub device_writes: AtomicU64,
    pub foreign_held: AtomicUsize,
    pub max_foreign_held: AtomicUsize,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn enter_foreign(&self) {
        let now = self.foreign_held.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_foreign_held.fetch_max(now, Ordering::AcqRel);
    }

    pub(crate) fn leave_foreign(&self) {
        self.foreign_held.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        let local_reuses = self.local_reuses.load(Ordering::Relaxed);
        let evictions = self.evictions.load(Ordering::Relaxed);
        CacheStats {
            total_accesses: self.total_accesses.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: local_reuses + evictions,
            local_reuses,
            evictions,
            eviction_scans: self.eviction_scans.load(Ordering::Relaxed),
            device_reads: self.device_reads.load(Ordering::Relaxed),
            device_writes: self.device_writes.load(Ordering::Relaxed),
            max_foreign_locks_held: self.max_foreign_held.load(Ordering::Acquire),
        }
    }
}

/// 某一时刻单个槽的元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSnapshot {
    /// 池数组下标
    pub slot: SlotId,
    /// 缓存的块
    pub key: Option<BlockKey>,
    /// 引用计数
    pub refcnt: u32,
    /// 最近使用戳
    pub stamp: u64,
}

impl From<&SlotMeta> for SlotSnapshot {
    fn from(meta: &SlotMeta) -> Self {
        Self {
            slot: meta.id,
            key: meta.key,
            refcnt: meta.refcnt,
            stamp: meta.stamp,
        }
    }
}

/// 某一时刻单个分片的成员
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSnapshot {
    /// 分片编号
    pub shard: usize,
    /// 成员，按列表顺序
    pub slots: Vec<SlotSnapshot>,
}
