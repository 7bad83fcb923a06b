//! 缓冲槽获取算法
//!
//! 给定 (设备, 块号)，返回一个已缓存该块或刚分配给该块的缓冲槽，
//! 并在返回前为调用者取得该槽的独占锁。
//!
//! # 流程
//!
//! 1. 锁住块号所在的主分片，扫描成员列表
//!    - 命中：引用计数加一、刷新戳
//!    - 未命中但本分片有空闲槽：就地重新分配扫描中遇到的最后一个空闲槽
//! 2. 本分片没有空闲槽时做跨分片驱逐：
//!    - 放开主分片锁，取驱逐锁，再重新锁住主分片并重复第 1 步的检查
//!    - 逐个扫描其他分片，每次只持有一把外部分片锁，记录戳最小的空闲槽
//!    - 重新锁住胜出的分片，确认候选仍空闲且戳未变，摘下并挂到主分片
//! 3. 连续两遍扫描都找不到空闲槽时返回 `NoBuffers`
//!
//! # 锁顺序
//!
//! 驱逐锁 → 主分片 → 一把外部分片。其他路径同一时刻只持有一把分片锁，
//! 且持有期间不等待任何锁，因此不会形成环路等待。
//!
//! 睡眠锁只能通过 [`Claim`] 获取，而 `Claim` 只能由消耗主分片守卫得到，
//! 保证不会在持有元数据锁时阻塞在独占锁上。

use spin::MutexGuard;

use super::block_cache::BufferCache;
use super::handle::BufGuard;
use super::shard::{route, Lookup, ShardList};
use super::slot::SlotMeta;
use super::stats::Counters;
use crate::consts::{POOL_SIZE, SHARD_COUNT};
use crate::error::{Error, ErrorKind, Result};
use crate::sync::RawSleepLock;
use crate::types::{BlockKey, SlotId};

/// 已登记引用、尚未上独占锁的缓冲槽
#[must_use]
pub(crate) struct Claim {
    slot: SlotId,
    key: BlockKey,
}

/// 主分片锁
struct HomeGuard<'a> {
    list: MutexGuard<'a, ShardList>,
}

impl HomeGuard<'_> {
    /// 放开主分片锁，交出槽的使用权
    fn hand_off(self, slot: SlotId, key: BlockKey) -> Claim {
        drop(self.list);
        Claim { slot, key }
    }
}

/// 驱逐扫描中持有的外部分片锁
struct ForeignGuard<'a> {
    list: MutexGuard<'a, ShardList>,
    counters: &'a Counters,
}

impl Drop for ForeignGuard<'_> {
    fn drop(&mut self) {
        self.counters.leave_foreign();
    }
}

/// 驱逐候选
#[derive(Debug, Clone, Copy)]
struct Victim {
    shard: usize,
    slot: SlotId,
    stamp: u64,
}

impl<R: RawSleepLock> BufferCache<R> {
    /// 查找或分配 `key` 的缓冲槽，引用计数恰好加一
    pub(crate) fn acquire(&self, key: BlockKey) -> Result<Claim> {
        let home_shard = route(key.blockno);

        let home = self.lock_home(home_shard);
        let home = match self.claim_in_home(home, key) {
            Ok(claim) => return Ok(claim),
            Err(home) => home,
        };
        drop(home);

        let _evicting = self.evict_lock.lock();
        // 放锁期间可能有线程装入了同一块或释放了槽位
        let home = self.lock_home(home_shard);
        let mut home = match self.claim_in_home(home, key) {
            Ok(claim) => return Ok(claim),
            Err(home) => home,
        };

        loop {
            // 扫描期间释放的槽可能落在已扫描过的分片里，宣告耗尽前再扫一遍
            let Some(victim) = self.find_victim(home_shard).or_else(|| {
                log::debug!("[BCACHE] bget {}: no free buffer seen, scanning again", key);
                self.find_victim(home_shard)
            }) else {
                log::error!(
                    "[BCACHE] bget {}: all {} buffers are referenced",
                    key,
                    POOL_SIZE
                );
                return Err(Error::new(ErrorKind::NoBuffers, "bget: no buffers"));
            };

            let Some(mut meta) = self.detach_victim(victim) else {
                log::trace!(
                    "[BCACHE] bget {}: victim slot {} in shard {} was taken, rescanning",
                    key,
                    victim.slot,
                    victim.shard
                );
                continue;
            };

            let previous = meta.key;
            meta.reassign(key, self.clock.now());
            self.slots[meta.id].invalidate();
            home.list.attach(meta);
            Counters::bump(&self.counters.evictions);
            log::debug!(
                "[BCACHE] bget {} EVICT slot {} from shard {} (was {:?})",
                key,
                meta.id,
                victim.shard,
                previous
            );
            return Ok(home.hand_off(meta.id, key));
        }
    }

    /// 获取独占锁，这是进入缓冲槽数据的唯一入口
    pub(crate) fn lock_claim(&self, claim: Claim) -> BufGuard<'_, R> {
        let data = self.slots[claim.slot].data.lock();
        BufGuard::new(self, claim.slot, claim.key, data)
    }

    fn lock_home(&self, shard: usize) -> HomeGuard<'_> {
        HomeGuard {
            list: self.shards[shard].lock(),
        }
    }

    fn lock_foreign(&self, shard: usize) -> ForeignGuard<'_> {
        let list = self.shards[shard].lock();
        self.counters.enter_foreign();
        ForeignGuard {
            list,
            counters: &self.counters,
        }
    }

    /// 在主分片内命中或就地复用；都不行时把守卫还给调用者
    fn claim_in_home<'a>(
        &'a self,
        mut home: HomeGuard<'a>,
        key: BlockKey,
    ) -> core::result::Result<Claim, HomeGuard<'a>> {
        match home.list.lookup(key) {
            Lookup::Hit(pos) => {
                let stamp = self.clock.now();
                let meta = home.list.entry_mut(pos);
                meta.get();
                meta.stamp = stamp;
                let slot = meta.id;
                Counters::bump(&self.counters.hits);
                log::trace!("[BCACHE] bget {} HIT slot {}", key, slot);
                Ok(home.hand_off(slot, key))
            }
            Lookup::Free(pos) => {
                let stamp = self.clock.now();
                let meta = home.list.entry_mut(pos);
                let previous = meta.key;
                meta.reassign(key, stamp);
                let slot = meta.id;
                self.slots[slot].invalidate();
                Counters::bump(&self.counters.local_reuses);
                log::debug!(
                    "[BCACHE] bget {} MISS, reusing slot {} in shard {} (was {:?})",
                    key,
                    slot,
                    route(key.blockno),
                    previous
                );
                Ok(home.hand_off(slot, key))
            }
            Lookup::Full => Err(home),
        }
    }

    /// 扫描主分片以外的所有分片，找出戳最小的空闲槽
    fn find_victim(&self, home_shard: usize) -> Option<Victim> {
        Counters::bump(&self.counters.eviction_scans);
        let mut best: Option<Victim> = None;
        for shard in (0..SHARD_COUNT).filter(|&s| s != home_shard) {
            let foreign = self.lock_foreign(shard);
            if let Some(meta) = foreign.list.oldest_free() {
                if best.map_or(true, |b| meta.stamp < b.stamp) {
                    best = Some(Victim {
                        shard,
                        slot: meta.id,
                        stamp: meta.stamp,
                    });
                }
            }
        }
        best
    }

    /// 重新锁住候选所在分片并摘下它；候选已被占用或刷新过时返回 `None`
    fn detach_victim(&self, victim: Victim) -> Option<SlotMeta> {
        let mut foreign = self.lock_foreign(victim.shard);
        let pos = foreign.list.position(victim.slot)?;
        let meta = foreign.list.entry(pos);
        if !meta.is_free() || meta.stamp != victim.stamp {
            return None;
        }
        Some(foreign.list.detach(pos))
    }
}
