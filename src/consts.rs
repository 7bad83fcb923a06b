//! 块缓存常量定义
//!
//! 缓冲池大小、分片数与块大小都在编译期固定，运行期不可调整。

/// 块大小（字节）
pub const BLOCK_SIZE: usize = 1024;

/// 单次文件系统操作最多写入的块数
pub const MAX_OP_BLOCKS: usize = 10;

/// 缓冲池中的槽位数
pub const POOL_SIZE: usize = MAX_OP_BLOCKS * 3;

/// 元数据锁分片数（取素数，使连续块号均匀分布）
pub const SHARD_COUNT: usize = 13;

const _: () = assert!(SHARD_COUNT > 1 && POOL_SIZE >= SHARD_COUNT);
