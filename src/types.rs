//! 块缓存基础类型

use core::fmt;

use crate::consts::BLOCK_SIZE;

/// 设备号
pub type DeviceId = u32;

/// 设备内的块号
pub type BlockNo = u32;

/// 缓冲槽编号：固定缓冲池数组中的下标
pub type SlotId = usize;

/// 一个块的数据
pub type BlockData = [u8; BLOCK_SIZE];

/// 块标识：(设备号, 块号)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockKey {
    /// 设备号
    pub dev: DeviceId,
    /// 块号
    pub blockno: BlockNo,
}

impl BlockKey {
    /// 创建块标识
    pub const fn new(dev: DeviceId, blockno: BlockNo) -> Self {
        Self { dev, blockno }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev={} block={}", self.dev, self.blockno)
    }
}
