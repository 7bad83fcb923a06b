//! 内存块设备
//!
//! 以 `BTreeMap` 保存已写入的块，未写入的块读出全零。
//! 记录物理读写次数，并支持按块注入读写故障，供测试和宿主机上的工具使用。

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use bitflags::bitflags;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use super::BlockDevice;
use crate::consts::BLOCK_SIZE;
use crate::error::{Error, ErrorKind, Result};
use crate::types::{BlockData, BlockKey, BlockNo};

bitflags! {
    /// 注入的故障类型
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Fault: u8 {
        /// 读取失败
        const READ  = 0x01;
        /// 写入失败
        const WRITE = 0x02;
    }
}

#[derive(Default)]
struct Storage {
    blocks: BTreeMap<BlockKey, Box<BlockData>>,
    reads: BTreeMap<BlockKey, u64>,
    faults: BTreeMap<BlockKey, Fault>,
}

/// 内存块设备
///
/// 每个设备号都有 `blocks_per_device` 个块，越界访问返回 `Io` 错误。
pub struct RamDisk {
    blocks_per_device: BlockNo,
    storage: Mutex<Storage>,
    /// 物理读取次数
    read_count: AtomicU64,
    /// 物理写入次数
    write_count: AtomicU64,
}

impl RamDisk {
    /// 创建内存块设备
    pub fn new(blocks_per_device: BlockNo) -> Self {
        Self {
            blocks_per_device,
            storage: Mutex::new(Storage::default()),
            read_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
        }
    }

    /// 每个设备的块数
    pub fn blocks_per_device(&self) -> BlockNo {
        self.blocks_per_device
    }

    /// 物理读取总次数
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::Acquire)
    }

    /// 物理写入总次数
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Acquire)
    }

    /// 块 `key` 被物理读取的次数
    pub fn reads_of(&self, key: BlockKey) -> u64 {
        self.storage.lock().reads.get(&key).copied().unwrap_or(0)
    }

    /// 为块 `key` 注入故障，覆盖之前的设置
    pub fn inject_fault(&self, key: BlockKey, fault: Fault) {
        let mut storage = self.storage.lock();
        if fault.is_empty() {
            storage.faults.remove(&key);
        } else {
            storage.faults.insert(key, fault);
        }
    }

    /// 清除所有注入的故障
    pub fn clear_faults(&self) {
        self.storage.lock().faults.clear();
    }

    /// 绕过缓存直接查看设备上的块内容
    pub fn peek(&self, key: BlockKey) -> BlockData {
        self.storage
            .lock()
            .blocks
            .get(&key)
            .map(|data| **data)
            .unwrap_or([0u8; BLOCK_SIZE])
    }

    fn check_range(&self, key: BlockKey) -> Result<()> {
        if key.blockno >= self.blocks_per_device {
            log::warn!("[RAMDISK] {} out of range ({} blocks)", key, self.blocks_per_device);
            return Err(Error::new(ErrorKind::Io, "block number out of range"));
        }
        Ok(())
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, key: BlockKey, buf: &mut BlockData) -> Result<()> {
        self.check_range(key)?;
        let mut storage = self.storage.lock();
        if storage.faults.get(&key).is_some_and(|f| f.contains(Fault::READ)) {
            return Err(Error::new(ErrorKind::Io, "injected read fault"));
        }
        match storage.blocks.get(&key) {
            Some(data) => buf.copy_from_slice(&data[..]),
            None => buf.fill(0),
        }
        *storage.reads.entry(key).or_insert(0) += 1;
        self.read_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn write_block(&self, key: BlockKey, buf: &BlockData) -> Result<()> {
        self.check_range(key)?;
        let mut storage = self.storage.lock();
        if storage.faults.get(&key).is_some_and(|f| f.contains(Fault::WRITE)) {
            return Err(Error::new(ErrorKind::Io, "injected write fault"));
        }
        storage.blocks.insert(key, Box::new(*buf));
        self.write_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

impl core::fmt::Debug for RamDisk {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RamDisk")
            .field("blocks_per_device", &self.blocks_per_device)
            .field("read_count", &self.read_count())
            .field("write_count", &self.write_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwritten_block_reads_zero() {
        let disk = RamDisk::new(16);
        let mut buf = [0xAAu8; BLOCK_SIZE];
        disk.read_block(BlockKey::new(1, 3), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(disk.read_count(), 1);
        assert_eq!(disk.reads_of(BlockKey::new(1, 3)), 1);
    }

    #[test]
    fn test_write_then_read() {
        let disk = RamDisk::new(16);
        let key = BlockKey::new(1, 5);
        let mut data = [0u8; BLOCK_SIZE];
        data[0] = 0x42;
        data[BLOCK_SIZE - 1] = 0x24;
        disk.write_block(key, &data).unwrap();

        let mut buf = [0u8; BLOCK_SIZE];
        disk.read_block(key, &mut buf).unwrap();
        assert_eq!(buf[0], 0x42);
        assert_eq!(buf[BLOCK_SIZE - 1], 0x24);
        assert_eq!(disk.write_count(), 1);
        assert_eq!(disk.peek(key), data);
    }

    #[test]
    fn test_devices_are_independent() {
        let disk = RamDisk::new(16);
        let mut data = [0u8; BLOCK_SIZE];
        data[7] = 7;
        disk.write_block(BlockKey::new(1, 2), &data).unwrap();
        assert_eq!(disk.peek(BlockKey::new(2, 2))[7], 0);
    }

    #[test]
    fn test_out_of_range() {
        let disk = RamDisk::new(4);
        assert_eq!(disk.blocks_per_device(), 4);
        let mut buf = [0u8; BLOCK_SIZE];
        let err = disk.read_block(BlockKey::new(1, 4), &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(disk.read_count(), 0);
    }

    #[test]
    fn test_fault_injection() {
        let disk = RamDisk::new(16);
        let key = BlockKey::new(1, 1);
        let mut buf = [0u8; BLOCK_SIZE];

        disk.inject_fault(key, Fault::READ);
        assert_eq!(disk.read_block(key, &mut buf).unwrap_err().kind(), ErrorKind::Io);
        disk.write_block(key, &buf).unwrap();

        disk.inject_fault(key, Fault::READ | Fault::WRITE);
        assert!(disk.write_block(key, &buf).is_err());

        disk.clear_faults();
        disk.read_block(key, &mut buf).unwrap();
        disk.write_block(key, &buf).unwrap();
        assert_eq!(disk.read_count(), 1);
        assert_eq!(disk.write_count(), 2);
    }
}
