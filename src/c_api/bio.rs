//! C API 兼容层 - 缓冲缓存操作
//!
//! 提供 xv6 `bio.c` 风格的函数名，作用于一个全局缓存。
//! 所有函数都是 [`BufferCache`] 方法的简单包装。

use alloc::sync::Arc;

use crate::block::BlockDevice;
use crate::cache::{BufGuard, BufferCache, PinnedBuf};
use crate::error::{Error, ErrorKind, Result};
use crate::sync::ThreadSleepLock;
use crate::types::{BlockNo, DeviceId};

/// 全局缓存中的缓冲槽
pub type Buf = BufGuard<'static, ThreadSleepLock>;

/// 全局缓存中被钉住的缓冲槽
pub type PinnedBlock = PinnedBuf<'static, ThreadSleepLock>;

static BCACHE: spin::Once<BufferCache<ThreadSleepLock>> = spin::Once::new();

fn bcache() -> Result<&'static BufferCache<ThreadSleepLock>> {
    BCACHE
        .get()
        .ok_or(Error::new(ErrorKind::InvalidState, "bcache: binit not called"))
}

/// C API: binit
///
/// 初始化全局缓存，只能调用一次。
pub fn binit(device: Arc<dyn BlockDevice>) -> Result<()> {
    let mut created = false;
    BCACHE.call_once(|| {
        created = true;
        BufferCache::new(device)
    });
    if created {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::InvalidState, "binit: already initialized"))
    }
}

/// C API: bread
///
/// 内部调用 `BufferCache::fetch`。
pub fn bread(dev: DeviceId, blockno: BlockNo) -> Result<Buf> {
    bcache()?.fetch(dev, blockno)
}

/// C API: bwrite
///
/// 内部调用 `BufferCache::commit`。
pub fn bwrite(buf: &Buf) -> Result<()> {
    bcache()?.commit(buf)
}

/// C API: brelse
///
/// 内部调用 `BufferCache::release`。
pub fn brelse(buf: Buf) -> Result<()> {
    bcache()?.release(buf)
}

/// C API: bpin
///
/// 内部调用 `BufferCache::pin`。
pub fn bpin(buf: &Buf) -> Result<PinnedBlock> {
    bcache()?.pin(buf)
}

/// C API: bunpin
///
/// 内部调用 `BufferCache::unpin`。
pub fn bunpin(pinned: PinnedBlock) -> Result<()> {
    bcache()?.unpin(pinned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::RamDisk;
    use crate::types::BlockKey;

    // 全局缓存只能初始化一次，所有检查放在同一个测试里
    #[test]
    fn test_global_cache_flow() {
        assert_eq!(bread(1, 3).unwrap_err().kind(), ErrorKind::InvalidState);

        let disk = Arc::new(RamDisk::new(64));
        binit(disk.clone()).unwrap();
        assert_eq!(
            binit(disk.clone()).unwrap_err().kind(),
            ErrorKind::InvalidState
        );

        let mut buf = bread(1, 3).unwrap();
        buf.write_u32(8, 77).unwrap();
        bwrite(&buf).unwrap();
        let pinned = bpin(&buf).unwrap();
        brelse(buf).unwrap();

        let buf = pinned.fetch().unwrap();
        assert_eq!(buf.read_u32(8).unwrap(), 77);
        brelse(buf).unwrap();
        bunpin(pinned).unwrap();

        assert_eq!(&disk.peek(BlockKey::new(1, 3))[8..12], &77u32.to_le_bytes());
        assert_eq!(disk.read_count(), 1);
    }
}
