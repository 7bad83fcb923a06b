//! 块设备抽象
//!
//! block/device.rs 定义缓存所依赖的同步块读写接口
//! block/ram.rs 提供内存块设备，带读写计数和故障注入

mod device;
mod ram;

pub use device::BlockDevice;
pub use ram::{Fault, RamDisk};
