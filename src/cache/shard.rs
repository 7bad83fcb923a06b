//! 元数据锁分片
//!
//! 每个分片持有一把自旋锁和一个成员列表。列表中的顺序与最近使用无关，
//! 新迁入的槽追加在尾部，最近使用只由 `stamp` 表示。

use alloc::vec::Vec;
use spin::{Mutex, MutexGuard};

use super::slot::SlotMeta;
use crate::consts::{POOL_SIZE, SHARD_COUNT};
use crate::types::{BlockKey, BlockNo, SlotId};

/// 块号到分片的映射，与设备号无关
pub fn route(blockno: BlockNo) -> usize {
    blockno as usize % SHARD_COUNT
}

/// 在本分片内查找的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    /// 命中：列表位置
    Hit(usize),
    /// 未命中，但有空闲槽：扫描中遇到的最后一个空闲槽的位置
    Free(usize),
    /// 未命中且没有空闲槽
    Full,
}

/// 分片的成员列表
#[derive(Debug)]
pub(crate) struct ShardList {
    entries: Vec<SlotMeta>,
}

impl ShardList {
    fn new() -> Self {
        // 预留整个池的容量，迁入时不会在锁内重新分配
        Self {
            entries: Vec::with_capacity(POOL_SIZE),
        }
    }

    /// 扫描查找 `key`，同时记住遇到的最后一个空闲槽
    pub(crate) fn lookup(&self, key: BlockKey) -> Lookup {
        let mut free = None;
        for (pos, meta) in self.entries.iter().enumerate() {
            if meta.key == Some(key) {
                return Lookup::Hit(pos);
            }
            if meta.is_free() {
                free = Some(pos);
            }
        }
        free.map_or(Lookup::Full, Lookup::Free)
    }

    /// 本分片中戳最小的空闲槽；戳相同时取先遇到的
    pub(crate) fn oldest_free(&self) -> Option<&SlotMeta> {
        let mut best: Option<&SlotMeta> = None;
        for meta in self.entries.iter().filter(|m| m.is_free()) {
            if best.map_or(true, |b| meta.stamp < b.stamp) {
                best = Some(meta);
            }
        }
        best
    }

    pub(crate) fn position(&self, id: SlotId) -> Option<usize> {
        self.entries.iter().position(|m| m.id == id)
    }

    pub(crate) fn entry(&self, pos: usize) -> &SlotMeta {
        &self.entries[pos]
    }

    pub(crate) fn entry_mut(&mut self, pos: usize) -> &mut SlotMeta {
        &mut self.entries[pos]
    }

    /// 从列表中摘下一个槽
    pub(crate) fn detach(&mut self, pos: usize) -> SlotMeta {
        self.entries.remove(pos)
    }

    /// 把槽挂到列表尾部
    pub(crate) fn attach(&mut self, meta: SlotMeta) {
        self.entries.push(meta);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &SlotMeta> {
        self.entries.iter()
    }
}

/// 元数据锁分片
pub(crate) struct Shard {
    list: Mutex<ShardList>,
}

impl Shard {
    pub(crate) fn new() -> Self {
        Self {
            list: Mutex::new(ShardList::new()),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ShardList> {
        self.list.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: SlotId, key: Option<BlockKey>, refcnt: u32, stamp: u64) -> SlotMeta {
        SlotMeta {
            id,
            key,
            refcnt,
            stamp,
        }
    }

    #[test]
    fn test_route_ignores_device() {
        assert_eq!(route(0), 0);
        assert_eq!(route(SHARD_COUNT as BlockNo), 0);
        assert_eq!(route(SHARD_COUNT as BlockNo + 3), 3);
        for blockno in 0..100 {
            assert!(route(blockno) < SHARD_COUNT);
        }
    }

    #[test]
    fn test_lookup_hit_before_free() {
        let mut list = ShardList::new();
        list.attach(meta(0, None, 0, 0));
        list.attach(meta(1, Some(BlockKey::new(1, 13)), 0, 4));
        assert_eq!(list.lookup(BlockKey::new(1, 13)), Lookup::Hit(1));
        // 同块号、不同设备不算命中
        assert_eq!(list.lookup(BlockKey::new(2, 13)), Lookup::Free(1));
    }

    #[test]
    fn test_lookup_takes_last_free() {
        let mut list = ShardList::new();
        list.attach(meta(0, None, 0, 0));
        list.attach(meta(1, Some(BlockKey::new(1, 0)), 2, 9));
        list.attach(meta(2, Some(BlockKey::new(1, 13)), 0, 7));
        list.attach(meta(3, Some(BlockKey::new(1, 26)), 1, 8));
        // 最后遇到的空闲槽是位置 2，即便位置 0 更旧
        assert_eq!(list.lookup(BlockKey::new(1, 39)), Lookup::Free(2));
    }

    #[test]
    fn test_lookup_full() {
        let mut list = ShardList::new();
        list.attach(meta(0, Some(BlockKey::new(1, 0)), 1, 1));
        assert_eq!(list.lookup(BlockKey::new(1, 13)), Lookup::Full);
        assert_eq!(ShardList::new().lookup(BlockKey::new(1, 13)), Lookup::Full);
    }

    #[test]
    fn test_oldest_free() {
        let mut list = ShardList::new();
        list.attach(meta(0, Some(BlockKey::new(1, 1)), 0, 5));
        list.attach(meta(1, Some(BlockKey::new(1, 14)), 3, 1));
        list.attach(meta(2, Some(BlockKey::new(1, 27)), 0, 2));
        list.attach(meta(3, Some(BlockKey::new(1, 40)), 0, 2));
        assert_eq!(list.oldest_free().map(|m| m.id), Some(2));

        list.entry_mut(0).refcnt = 1;
        list.entry_mut(2).refcnt = 1;
        list.entry_mut(3).refcnt = 1;
        assert!(list.oldest_free().is_none());
    }

    #[test]
    fn test_detach_attach_preserves_members() {
        let mut a = ShardList::new();
        let mut b = ShardList::new();
        for id in 0..4 {
            a.attach(SlotMeta::unassigned(id));
        }
        let pos = a.position(2).unwrap();
        let moved = a.detach(pos);
        b.attach(moved);

        assert_eq!(a.len() + b.len(), 4);
        assert_eq!(a.position(2), None);
        assert_eq!(b.position(2), Some(0));
        assert_eq!(a.iter().map(|m| m.id).collect::<Vec<_>>(), [0, 1, 3]);
        assert_eq!(b.entry(0).id, 2);
    }
}
