//! 块设备接口

use crate::error::Result;
use crate::types::{BlockData, BlockKey};

/// 块设备驱动接口
///
/// 块缓存通过此 trait 同步读写整块数据。实现可以在内部挂起调用线程
/// 等待设备完成，缓存只在持有缓冲槽独占锁时调用它，从不在持有分片锁时调用。
///
/// 重试策略（如果需要）属于驱动或其上层，缓存本身不重试。
///
/// # 示例
///
/// ```rust,ignore
/// use bcache_core::{BlockDevice, BlockData, BlockKey, Result};
///
/// struct VirtioDisk {
///     // ...
/// }
///
/// impl BlockDevice for VirtioDisk {
///     fn read_block(&self, key: BlockKey, buf: &mut BlockData) -> Result<()> {
///         // 提交读请求并等待中断
///         Ok(())
///     }
///
///     fn write_block(&self, key: BlockKey, buf: &BlockData) -> Result<()> {
///         // 提交写请求并等待中断
///         Ok(())
///     }
/// }
/// ```
pub trait BlockDevice: Send + Sync {
    /// 把块 `key` 的内容读入 `buf`
    fn read_block(&self, key: BlockKey, buf: &mut BlockData) -> Result<()>;

    /// 把 `buf` 写入块 `key`
    fn write_block(&self, key: BlockKey, buf: &BlockData) -> Result<()>;
}
